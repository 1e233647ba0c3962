//! Central receive pipeline.
//!
//! Notification payloads are appended to the session's accumulator; every
//! complete frame is then handed to the dispatcher with the central's
//! fallback rules (structured + typed-pair, raw when nothing took it).

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

use crate::protocol::{Dispatcher, FrameBuffer};

/// Reassembles notifications into frames and dispatches them.
#[derive(Debug)]
pub struct ReceivePipeline {
    buffer: Mutex<FrameBuffer>,
    dispatcher: Arc<Dispatcher>,
}

impl ReceivePipeline {
    /// Create a pipeline that delivers to `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            buffer: Mutex::new(FrameBuffer::new()),
            dispatcher,
        }
    }

    /// Consume one notification payload.
    ///
    /// Returns the number of frames that reached a handler.
    pub fn feed(&self, data: &[u8]) -> usize {
        let frames = {
            let mut buffer = self.buffer.lock();
            buffer.extend(data);
            buffer.drain_frames()
        };

        trace!("Fed {} bytes, {} complete frames", data.len(), frames.len());

        frames
            .iter()
            .filter(|frame| self.dispatcher.dispatch_with_fallback(frame).is_delivered())
            .count()
    }

    /// Drop any partial frame.
    pub fn reset(&self) {
        self.buffer.lock().clear();
    }

    /// Bytes of the partial frame currently held.
    pub fn pending_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// The dispatcher frames are delivered to.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

//! Chunked notification sender.
//!
//! A frame is cut into pieces of at most `chunk_size` bytes and each piece
//! goes out as one notification. The stack's notification queue is shallow,
//! so the transmitter pauses after every piece.

use std::time::Duration;
use tracing::{trace, warn};

use crate::config::PeripheralConfig;
use crate::peripheral::stack::PeripheralStack;
use crate::peripheral::state::PeripheralState;

/// Splits frames into notifications and paces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedTransmitter {
    chunk_size: usize,
    inter_chunk_delay: Duration,
}

impl ChunkedTransmitter {
    /// Create a transmitter. A zero chunk size is treated as one byte.
    pub fn new(chunk_size: usize, inter_chunk_delay: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            inter_chunk_delay,
        }
    }

    /// Create a transmitter from the peripheral configuration.
    pub fn from_config(config: &PeripheralConfig) -> Self {
        Self::new(config.chunk_size, config.inter_chunk_delay)
    }

    /// Maximum bytes per notification.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of notifications a frame of `len` bytes takes.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }

    /// The pieces a frame is sent as, in order.
    pub fn chunks<'a>(&self, frame: &'a [u8]) -> std::slice::Chunks<'a, u8> {
        frame.chunks(self.chunk_size)
    }

    /// Send `frame` as a sequence of notifications.
    ///
    /// Does nothing unless `state` is connected and the stack has a TX
    /// characteristic; the frame is dropped, not queued. A failed notify
    /// stops the frame there. Returns the number of notifications sent.
    pub fn transmit(&self, stack: &dyn PeripheralStack, state: PeripheralState, frame: &[u8]) -> usize {
        if !state.is_connected() || !stack.can_notify() {
            trace!("Link not ready ({}), dropping {} byte frame", state, frame.len());
            return 0;
        }

        let total = self.chunk_count(frame.len());
        let mut sent = 0;

        for chunk in self.chunks(frame) {
            if let Err(e) = stack.notify(chunk) {
                warn!("Notify failed after {} of {} chunks: {}", sent, total, e);
                break;
            }
            sent += 1;
            trace!("Notified chunk {}/{} ({} bytes)", sent, total, chunk.len());

            if !self.inter_chunk_delay.is_zero() {
                std::thread::sleep(self.inter_chunk_delay);
            }
        }

        sent
    }
}

impl Default for ChunkedTransmitter {
    fn default() -> Self {
        Self::from_config(&PeripheralConfig::default())
    }
}

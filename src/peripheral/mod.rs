//! Peripheral (advertising) side of the link.
//!
//! [`PeripheralLink`] owns the lifecycle of the local GATT server. The
//! application calls [`PeripheralLink::poll`] from its main loop; stack
//! callbacks only touch the shared state through [`PeripheralEvents`], and
//! everything heavy (handler dispatch, the watchdog, tearing down and
//! rebuilding the stack) happens inside `poll`.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use ble_line_link::peripheral::{PeripheralLink, PeripheralStack};
//! # use ble_line_link::{PeripheralConfig, Result};
//! # fn run(stack: impl PeripheralStack + 'static) -> Result<()> {
//! let mut link = PeripheralLink::new(stack, PeripheralConfig::new("BLE-LINK-TEST"))?;
//!
//! let replies = link.sender();
//! link.on_receive_raw(move |line| {
//!     if line == "PING" {
//!         replies.send_raw("PONG");
//!     }
//! });
//!
//! link.setup()?;
//! loop {
//!     link.poll();
//!     std::thread::sleep(std::time::Duration::from_millis(5));
//! }
//! # }
//! ```

pub mod stack;
pub mod state;
pub mod transmitter;

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PeripheralConfig;
use crate::error::Result;
use crate::protocol::{encode, encode_json, encode_text, Dispatcher, OutboundMessage};

pub use stack::{GattServerLayout, PeripheralEvents, PeripheralStack};
pub use state::{ConnectionStateMachine, PeripheralState};
pub use transmitter::ChunkedTransmitter;

use stack::LinkShared;

/// Cloneable handle for sending from anywhere, including handlers.
pub struct PeripheralSender<S: PeripheralStack> {
    stack: Arc<S>,
    shared: Arc<Mutex<LinkShared>>,
    transmitter: ChunkedTransmitter,
    /// Keeps the chunks of concurrent sends from interleaving.
    send_lock: Arc<Mutex<()>>,
}

impl<S: PeripheralStack> Clone for PeripheralSender<S> {
    fn clone(&self) -> Self {
        Self {
            stack: self.stack.clone(),
            shared: self.shared.clone(),
            transmitter: self.transmitter.clone(),
            send_lock: self.send_lock.clone(),
        }
    }
}

impl<S: PeripheralStack> PeripheralSender<S> {
    /// Send a structured document. Dropped silently when not connected.
    pub fn send_json(&self, doc: &Value) {
        match encode_json(doc) {
            Ok(frame) => self.send_frame(&frame),
            Err(e) => warn!("Failed to encode JSON message: {}", e),
        }
    }

    /// Send a line of text. Dropped silently when not connected.
    pub fn send_raw(&self, text: &str) {
        self.send_frame(&encode_text(text));
    }

    /// Send any outbound message. Dropped silently when not connected.
    pub fn send(&self, message: &OutboundMessage) {
        match encode(message) {
            Ok(frame) => self.send_frame(&frame),
            Err(e) => warn!("Failed to encode message: {}", e),
        }
    }

    fn send_frame(&self, frame: &[u8]) {
        let _serial = self.send_lock.lock();
        let state = self.shared.lock().machine.state();
        self.transmitter.transmit(self.stack.as_ref(), state, frame);
    }
}

/// Peripheral end of the link.
pub struct PeripheralLink<S: PeripheralStack> {
    stack: Arc<S>,
    config: PeripheralConfig,
    layout: GattServerLayout,
    shared: Arc<Mutex<LinkShared>>,
    dispatcher: Dispatcher,
    sender: PeripheralSender<S>,
}

impl<S: PeripheralStack> PeripheralLink<S> {
    /// Create a link over `stack`. Nothing is built until [`setup`](Self::setup).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(stack: S, config: PeripheralConfig) -> Result<Self> {
        config.validate()?;

        let stack = Arc::new(stack);
        let machine = ConnectionStateMachine::new(config.debounce_window);
        let shared = Arc::new(Mutex::new(LinkShared::new(machine)));
        let sender = PeripheralSender {
            stack: stack.clone(),
            shared: shared.clone(),
            transmitter: ChunkedTransmitter::from_config(&config),
            send_lock: Arc::new(Mutex::new(())),
        };

        Ok(Self {
            stack,
            layout: GattServerLayout::uart(&config),
            config,
            shared,
            dispatcher: Dispatcher::new(),
            sender,
        })
    }

    /// Build the GATT server and start advertising.
    pub fn setup(&mut self) -> Result<()> {
        self.build()
    }

    /// Run one host-loop step.
    ///
    /// Checks for a connection the stack lost without telling us, performs
    /// a pending reinit, then dispatches every complete inbound frame.
    /// Returns the number of frames that reached a handler.
    pub fn poll(&mut self) -> usize {
        let sampled_at = Instant::now();
        let active = self.stack.connected_count();
        let lost = {
            let mut shared = self.shared.lock();
            let lost = shared.machine.watchdog(active, sampled_at);
            if lost {
                shared.rx.clear();
            }
            lost
        };
        if lost {
            warn!("Link lost without a disconnect event, scheduling reinit");
        }

        let reinit = self.shared.lock().machine.begin_reinit();
        if reinit {
            self.reinitialize();
        }

        let frames: Vec<_> = self.shared.lock().inbox.drain(..).collect();
        frames
            .iter()
            .filter(|frame| self.dispatcher.dispatch(frame).is_delivered())
            .count()
    }

    /// Stop advertising, tear the stack down and return to idle.
    pub fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down BLE link");

        if let Err(e) = self.stack.stop_advertising() {
            debug!("Stop advertising during shutdown failed: {}", e);
        }

        {
            let mut shared = self.shared.lock();
            shared.machine.reset();
            shared.rx.clear();
            shared.inbox.clear();
        }

        self.stack.deinit()
    }

    /// Check if a central is connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PeripheralState {
        self.shared.lock().machine.state()
    }

    /// The link configuration.
    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    /// The handle to give the stack for its callbacks.
    pub fn events(&self) -> PeripheralEvents {
        PeripheralEvents::new(self.shared.clone())
    }

    /// A cloneable sender, for use inside handlers or other threads.
    pub fn sender(&self) -> PeripheralSender<S> {
        self.sender.clone()
    }

    /// Send a structured document. Dropped silently when not connected.
    pub fn send_json(&self, doc: &Value) {
        self.sender.send_json(doc);
    }

    /// Send a line of text. Dropped silently when not connected.
    pub fn send_raw(&self, text: &str) {
        self.sender.send_raw(text);
    }

    /// Send any outbound message. Dropped silently when not connected.
    pub fn send(&self, message: &OutboundMessage) {
        self.sender.send(message);
    }

    /// Register the handler for JSON frames. Replaces any previous one.
    pub fn on_receive_json<F>(&self, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.dispatcher.set_json_handler(handler);
    }

    /// Register the handler for text frames. Replaces any previous one.
    pub fn on_receive_raw<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.dispatcher.set_raw_handler(handler);
    }

    fn build(&self) -> Result<()> {
        self.stack.initialize(&self.layout, self.events())?;
        self.stack.start_advertising()?;
        self.shared.lock().machine.advertising_started();
        info!("Advertising started as {}", self.layout.device_name);
        Ok(())
    }

    fn reinitialize(&self) {
        info!("Reinitializing BLE stack");

        std::thread::sleep(self.config.teardown_delay);
        if let Err(e) = self.stack.deinit() {
            warn!("Stack teardown failed: {}", e);
        }
        std::thread::sleep(self.config.reinit_settle_delay);

        if let Err(e) = self.build() {
            error!("Stack rebuild failed, retrying on next poll: {}", e);
            self.shared.lock().machine.reinit_failed();
        }
    }
}

impl<S: PeripheralStack> std::fmt::Debug for PeripheralLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralLink")
            .field("device_name", &self.layout.device_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

//! Central (host) end of the link.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ble_line_link::{CentralLink, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let link = CentralLink::new("BLE-LINK-TEST").await?;
//!     link.on_receive_json(|doc| println!("json: {doc}"));
//!     link.on_receive_raw(|line| println!("raw: {line}"));
//!
//!     link.connect().await?;
//!     link.send_json(&json!({"op": "echo", "msg": "hi"})).await?;
//!     link.send_raw("PING").await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!     link.disconnect().await
//! }
//! ```

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::ble::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::ble::device::CentralAdapter;
use crate::ble::scanner::BleScanner;
use crate::config::ConnectOptions;
use crate::error::Result;
use crate::protocol::{encode, encode_json, encode_text, Dispatcher, OutboundMessage};
use crate::receive::ReceivePipeline;

/// Central session with one named peripheral.
pub struct CentralLink<A: CentralAdapter = BleScanner> {
    manager: ConnectionManager<A>,
    pipeline: Arc<ReceivePipeline>,
    options: ConnectOptions,
}

impl CentralLink<BleScanner> {
    /// Create a link on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(device_name: impl Into<String>) -> Result<Self> {
        let scanner = BleScanner::new().await?;
        Ok(Self::with_adapter(scanner, device_name))
    }
}

impl<A: CentralAdapter> CentralLink<A> {
    /// Create a link that finds `device_name` through `adapter`.
    pub fn with_adapter(adapter: A, device_name: impl Into<String>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        Self {
            manager: ConnectionManager::new(adapter, device_name),
            pipeline: Arc::new(ReceivePipeline::new(dispatcher)),
            options: ConnectOptions::default(),
        }
    }

    /// Replace the options used by [`connect`](Self::connect).
    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Options used by [`connect`](Self::connect).
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Register the handler for JSON frames. Replaces any previous one.
    pub fn on_receive_json<F>(&self, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.pipeline.dispatcher().set_json_handler(handler);
    }

    /// Register the handler for text frames. Replaces any previous one.
    ///
    /// It also receives structured frames when neither of the structured
    /// handlers is registered.
    pub fn on_receive_raw<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.pipeline.dispatcher().set_raw_handler(handler);
    }

    /// Register the `(type, payload)` handler for structured frames.
    /// Replaces any previous one; runs in addition to the JSON handler.
    pub fn on_receive<F>(&self, handler: F)
    where
        F: Fn(Option<&str>, &Value) + Send + Sync + 'static,
    {
        self.pipeline.dispatcher().set_typed_pair_handler(handler);
    }

    /// Connect with the link's options.
    pub async fn connect(&self) -> Result<()> {
        self.manager.connect(&self.options, self.pipeline.clone()).await
    }

    /// Connect with explicit options.
    pub async fn connect_with(&self, options: &ConnectOptions) -> Result<()> {
        self.manager.connect(options, self.pipeline.clone()).await
    }

    /// Close the session. Does nothing when not connected.
    pub async fn disconnect(&self) -> Result<()> {
        self.manager.disconnect().await
    }

    /// Check if the session is up and the link is alive.
    pub async fn is_connected(&self) -> bool {
        self.manager.is_connected().await
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.manager.subscribe()
    }

    /// Send a structured document.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`](crate::Error::NotConnected) without a session,
    /// or the write failure.
    pub async fn send_json(&self, doc: &Value) -> Result<()> {
        let frame = encode_json(doc)?;
        self.manager.write(&frame).await
    }

    /// Send a line of text. A missing delimiter is added.
    pub async fn send_raw(&self, text: &str) -> Result<()> {
        self.manager.write(&encode_text(text)).await
    }

    /// Send any outbound message.
    pub async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let frame = encode(message)?;
        self.manager.write(&frame).await
    }

    /// Send `{"command": command, "payload": payload}`. A missing payload is
    /// sent as an empty object.
    pub async fn send_command(&self, command: &str, payload: Option<Value>) -> Result<()> {
        let payload = payload.unwrap_or_else(|| json!({}));
        self.send_json(&json!({ "command": command, "payload": payload })).await
    }
}

impl<A: CentralAdapter> std::fmt::Debug for CentralLink<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentralLink")
            .field("manager", &self.manager)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

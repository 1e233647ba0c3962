//! BLE connection management.
//!
//! [`ConnectionManager`] owns one central session: it scans for the
//! peripheral by name, connects, resolves the UART pair, subscribes, and
//! feeds notifications into a [`ReceivePipeline`]. Every failed step
//! releases what the attempt opened before the next attempt starts.

use futures::stream::{BoxStream, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::characteristics::UartCharacteristics;
use crate::ble::device::{CentralAdapter, GattNotification, RemoteDevice};
use crate::config::{ConnectOptions, WriteMode};
use crate::error::{Error, Result};
use crate::receive::ReceivePipeline;

/// Connection state of the central session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// Looking for the advertiser.
    Scanning,
    /// Linking, discovering and subscribing.
    Connecting,
    /// Session established.
    Connected,
    /// Tearing the session down.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Scanning | Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// Advertised name of the peripheral.
    pub device_name: String,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Everything one successful connect owns.
struct Session<D> {
    device: D,
    uart: UartCharacteristics,
    listener: JoinHandle<()>,
    pipeline: Arc<ReceivePipeline>,
    write_mode: WriteMode,
}

impl<D> Drop for Session<D> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Manages the connection to one named peripheral.
pub struct ConnectionManager<A: CentralAdapter> {
    adapter: A,
    device_name: String,
    /// Current connection state.
    state: Arc<RwLock<ConnectionState>>,
    /// Live session, if any.
    session: RwLock<Option<Arc<Session<A::Device>>>>,
    /// Serializes connect and disconnect.
    lifecycle: Mutex<()>,
    /// Channel for connection events.
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl<A: CentralAdapter> ConnectionManager<A> {
    /// Create a manager that looks for `device_name` through `adapter`.
    pub fn new(adapter: A, device_name: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            adapter,
            device_name: device_name.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            session: RwLock::new(None),
            lifecycle: Mutex::new(()),
            event_tx,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Advertised name this manager connects to.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Check if a session exists and the stack still reports its link.
    pub async fn is_connected(&self) -> bool {
        let session = self.session.read().clone();
        match session {
            Some(session) => session.device.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    /// Connect, retrying whole attempts per `options`.
    ///
    /// Notifications of the new session are fed to `pipeline`. Returns
    /// immediately if the current session's link is still up; a session
    /// whose link was lost is released first.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionInProgress`] if another connect or disconnect is
    /// running, [`Error::ConnectionFailed`] with the last attempt's cause
    /// once every attempt failed.
    pub async fn connect(&self, options: &ConnectOptions, pipeline: Arc<ReceivePipeline>) -> Result<()> {
        let Ok(_lifecycle) = self.lifecycle.try_lock() else {
            return Err(Error::ConnectionInProgress);
        };

        let existing = self.session.read().clone();
        if let Some(session) = existing {
            if session.device.is_connected().await.unwrap_or(false) {
                debug!("Already connected");
                return Ok(());
            }

            info!("Link to {} was lost, reconnecting", self.device_name);
            self.session.write().take();
            if let Err(e) = release(&session).await {
                debug!("Releasing lost session: {}", e);
            }
            self.set_state(ConnectionState::Disconnected);
        }

        let attempts = options.effective_attempts();
        let mut last_error = Error::NotConnected;

        for attempt in 1..=attempts {
            debug!("Connection attempt {} of {}", attempt, attempts);

            match self.attempt(options, &pipeline).await {
                Ok(session) => {
                    info!("Connected to {} ({})", self.device_name, session.device.id());
                    *self.session.write() = Some(Arc::new(session));
                    self.set_state(ConnectionState::Connected);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempt, e);
                    pipeline.reset();
                    self.set_state(ConnectionState::Disconnected);
                    last_error = e;

                    if attempt < attempts {
                        tokio::time::sleep(options.retry_delay).await;
                    }
                }
            }
        }

        Err(Error::ConnectionFailed {
            attempts,
            source: Box::new(last_error),
        })
    }

    /// Close the session. Does nothing when there is none.
    pub async fn disconnect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let Some(session) = self.session.write().take() else {
            return Ok(());
        };

        self.set_state(ConnectionState::Disconnecting);

        let result = release(&session).await;
        self.set_state(ConnectionState::Disconnected);

        match result {
            Ok(()) => {
                info!("Disconnected from {}", self.device_name);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to disconnect cleanly: {}", e);
                Err(e)
            }
        }
    }

    /// Write one encoded frame to the RX characteristic.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] without a session, otherwise whatever the
    /// write itself fails with.
    pub async fn write(&self, frame: &[u8]) -> Result<()> {
        let session = self.session.read().clone().ok_or(Error::NotConnected)?;

        session.device.write(&session.uart.rx, frame, session.write_mode).await?;
        trace!("Wrote {} byte frame", frame.len());
        Ok(())
    }

    /// One scan, link, discover, resolve and subscribe pass.
    async fn attempt(&self, options: &ConnectOptions, pipeline: &Arc<ReceivePipeline>) -> Result<Session<A::Device>> {
        self.set_state(ConnectionState::Scanning);

        let device = self
            .adapter
            .find_device_by_name(&self.device_name, options.scan_timeout)
            .await?
            .ok_or_else(|| Error::ScanTimeout {
                name: self.device_name.clone(),
            })?;

        self.set_state(ConnectionState::Connecting);

        match self.open(&device, options, pipeline).await {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(release) = device.disconnect().await {
                    debug!("Releasing failed attempt: {}", release);
                }
                Err(e)
            }
        }
    }

    async fn open(
        &self,
        device: &A::Device,
        options: &ConnectOptions,
        pipeline: &Arc<ReceivePipeline>,
    ) -> Result<Session<A::Device>> {
        let services = tokio::time::timeout(options.connect_timeout, async {
            device.connect().await?;
            device.discover_services().await
        })
        .await
        .map_err(|_| Error::LinkFailed {
            reason: format!("timed out after {:?}", options.connect_timeout),
        })??;

        let uart = UartCharacteristics::resolve(&services)?;

        let notifications = device.notifications().await?;
        device.subscribe(&uart.tx).await?;

        let reporter = StateReporter {
            state: self.state.clone(),
            event_tx: self.event_tx.clone(),
            device_name: self.device_name.clone(),
        };
        let listener = spawn_listener(notifications, uart.tx.uuid, pipeline.clone(), reporter);

        Ok(Session {
            device: device.clone(),
            uart,
            listener,
            pipeline: pipeline.clone(),
            write_mode: options.write_mode,
        })
    }

    /// Update the connection state and emit an event.
    fn set_state(&self, new_state: ConnectionState) {
        publish_state(&self.state, &self.event_tx, &self.device_name, new_state);
    }
}

/// Update `state` and emit an event if it changed.
fn publish_state(
    state: &RwLock<ConnectionState>,
    event_tx: &broadcast::Sender<ConnectionEvent>,
    device_name: &str,
    new_state: ConnectionState,
) {
    let old_state = {
        let mut state = state.write();
        let old = *state;
        *state = new_state;
        old
    };

    if old_state != new_state {
        debug!("Connection state changed: {} -> {}", old_state, new_state);

        let _ = event_tx.send(ConnectionEvent {
            device_name: device_name.to_string(),
            state: new_state,
        });
    }
}

/// Stop the listener, drop any partial frame, unsubscribe and close the link.
async fn release<D: RemoteDevice>(session: &Session<D>) -> Result<()> {
    session.listener.abort();
    session.pipeline.reset();

    if let Err(e) = session.device.unsubscribe(&session.uart.tx).await {
        debug!("Unsubscribe failed: {}", e);
    }

    session.device.disconnect().await
}

/// What the listener needs to report a link that went away.
struct StateReporter {
    state: Arc<RwLock<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    device_name: String,
}

impl<A: CentralAdapter> std::fmt::Debug for ConnectionManager<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("device_name", &self.device_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Feed TX notifications to the pipeline until the stream ends.
///
/// The stream ends when the remote side drops the link; the partial frame
/// is discarded and the session is reported disconnected.
fn spawn_listener(
    mut notifications: BoxStream<'static, GattNotification>,
    tx_uuid: Uuid,
    pipeline: Arc<ReceivePipeline>,
    reporter: StateReporter,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = notifications.next().await {
            if notification.uuid != tx_uuid {
                trace!("Ignoring notification from {}", notification.uuid);
                continue;
            }
            pipeline.feed(&notification.value);
        }

        info!("Notification stream from {} ended", reporter.device_name);
        pipeline.reset();
        publish_state(
            &reporter.state,
            &reporter.event_tx,
            &reporter.device_name,
            ConnectionState::Disconnected,
        );
    })
}

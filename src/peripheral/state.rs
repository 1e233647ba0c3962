//! Peripheral connection lifecycle.
//!
//! ```text
//! Idle -> Advertising -> Connected -> Disconnected -> ReinitPending -> Advertising
//! ```
//!
//! The machine is pure: callers pass the event time in, which keeps the
//! debounce logic testable without sleeping.

use std::time::{Duration, Instant};

/// Lifecycle state of the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeripheralState {
    /// Stack not built yet, or shut down.
    #[default]
    Idle,
    /// Advertising and waiting for a central.
    Advertising,
    /// A central is connected.
    Connected,
    /// The central went away.
    Disconnected,
    /// The stack has to be torn down and rebuilt by the host loop.
    ReinitPending,
}

impl PeripheralState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for PeripheralState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Advertising => write!(f, "Advertising"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::ReinitPending => write!(f, "ReinitPending"),
        }
    }
}

/// Debounced connection state machine.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: PeripheralState,
    /// Set by disconnects and the watchdog, consumed by the host loop.
    reinit_pending: bool,
    debounce_window: Duration,
    /// Time of the last accepted connect event.
    last_connect: Option<Instant>,
    /// Time of the last accepted disconnect event.
    last_disconnect: Option<Instant>,
}

impl ConnectionStateMachine {
    /// Create a machine in [`PeripheralState::Idle`].
    pub fn new(debounce_window: Duration) -> Self {
        Self {
            state: PeripheralState::Idle,
            reinit_pending: false,
            debounce_window,
            last_connect: None,
            last_disconnect: None,
        }
    }

    /// Current state. A pending reinit shadows `Disconnected`.
    pub fn state(&self) -> PeripheralState {
        if self.reinit_pending && !self.state.is_connected() {
            PeripheralState::ReinitPending
        } else {
            self.state
        }
    }

    /// Check if the host loop owes a reinit.
    pub fn reinit_pending(&self) -> bool {
        self.reinit_pending
    }

    /// Handle a connect event. Returns `false` if it was debounced.
    ///
    /// An accepted connect cancels a pending reinit.
    pub fn on_connect(&mut self, now: Instant) -> bool {
        if within(self.last_connect, now, self.debounce_window) {
            return false;
        }
        self.last_connect = Some(now);
        self.state = PeripheralState::Connected;
        self.reinit_pending = false;
        true
    }

    /// Handle a disconnect event. Returns `false` if it was debounced.
    ///
    /// An accepted disconnect always leaves a reinit pending.
    pub fn on_disconnect(&mut self, now: Instant) -> bool {
        if within(self.last_disconnect, now, self.debounce_window) {
            return false;
        }
        self.last_disconnect = Some(now);
        self.state = PeripheralState::Disconnected;
        self.reinit_pending = true;
        true
    }

    /// Compare the claimed state with what the stack reports.
    ///
    /// `active_connections` is the stack's count as sampled at `sampled_at`.
    /// A connect accepted after the sample is left alone. Returns `true` if
    /// the machine claimed a connection the stack no longer has, in which
    /// case it is forced into [`PeripheralState::ReinitPending`].
    pub fn watchdog(&mut self, active_connections: usize, sampled_at: Instant) -> bool {
        let stale = self.last_connect.map_or(true, |t| t <= sampled_at);
        if self.state.is_connected() && active_connections == 0 && stale {
            self.state = PeripheralState::Disconnected;
            self.reinit_pending = true;
            return true;
        }
        false
    }

    /// The host loop takes the pending reinit. Returns `false` if none was owed.
    pub fn begin_reinit(&mut self) -> bool {
        if !self.reinit_pending {
            return false;
        }
        self.reinit_pending = false;
        self.state = PeripheralState::Disconnected;
        true
    }

    /// The stack was (re)built and is advertising.
    ///
    /// A central may already have connected while advertising was starting;
    /// that connection is kept.
    pub fn advertising_started(&mut self) {
        if !self.state.is_connected() {
            self.state = PeripheralState::Advertising;
        }
    }

    /// A rebuild failed; try again on the next poll.
    pub fn reinit_failed(&mut self) {
        self.state = PeripheralState::Disconnected;
        self.reinit_pending = true;
    }

    /// Back to [`PeripheralState::Idle`], forgetting debounce history.
    pub fn reset(&mut self) {
        self.state = PeripheralState::Idle;
        self.reinit_pending = false;
        self.last_connect = None;
        self.last_disconnect = None;
    }
}

fn within(last: Option<Instant>, now: Instant, window: Duration) -> bool {
    last.is_some_and(|t| now.saturating_duration_since(t) < window)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    fn advertising_machine() -> ConnectionStateMachine {
        let mut machine = ConnectionStateMachine::new(WINDOW);
        machine.advertising_started();
        machine
    }

    #[test]
    fn test_connect_then_disconnect() {
        let mut machine = advertising_machine();
        let t0 = Instant::now();

        assert!(machine.on_connect(t0));
        assert_eq!(machine.state(), PeripheralState::Connected);

        assert!(machine.on_disconnect(t0 + Duration::from_secs(1)));
        assert_eq!(machine.state(), PeripheralState::ReinitPending);
        assert!(machine.reinit_pending());
    }

    #[test]
    fn test_duplicate_connect_is_debounced() {
        let mut machine = advertising_machine();
        let t0 = Instant::now();

        assert!(machine.on_connect(t0));
        assert!(!machine.on_connect(t0 + Duration::from_millis(299)));
        assert!(machine.on_connect(t0 + Duration::from_millis(300)));
    }

    #[test]
    fn test_duplicate_disconnect_is_debounced() {
        let mut machine = advertising_machine();
        let t0 = Instant::now();

        machine.on_connect(t0);
        assert!(machine.on_disconnect(t0 + Duration::from_millis(10)));
        assert!(machine.begin_reinit());
        machine.advertising_started();
        assert!(!machine.on_disconnect(t0 + Duration::from_millis(100)));
        assert_eq!(machine.state(), PeripheralState::Advertising);
    }

    #[test]
    fn test_connect_and_disconnect_debounce_independently() {
        let mut machine = advertising_machine();
        let t0 = Instant::now();

        assert!(machine.on_connect(t0));
        assert!(machine.on_disconnect(t0 + Duration::from_millis(1)));
        assert!(!machine.on_connect(t0 + Duration::from_millis(2)));
        assert_eq!(machine.state(), PeripheralState::ReinitPending);
    }

    #[test]
    fn test_connect_cancels_pending_reinit() {
        let mut machine = advertising_machine();
        let t0 = Instant::now();

        machine.on_connect(t0);
        machine.on_disconnect(t0 + Duration::from_secs(1));
        assert!(machine.reinit_pending());

        assert!(machine.on_connect(t0 + Duration::from_secs(2)));
        assert!(!machine.reinit_pending());
        assert!(machine.state().is_connected());
    }

    #[test]
    fn test_watchdog_forces_reinit_on_silent_loss() {
        let mut machine = advertising_machine();
        let t0 = Instant::now();
        machine.on_connect(t0);

        assert!(!machine.watchdog(1, t0));
        assert!(machine.state().is_connected());

        assert!(machine.watchdog(0, t0 + Duration::from_millis(5)));
        assert!(machine.reinit_pending());
    }

    #[test]
    fn test_watchdog_ignores_connect_after_sample() {
        let mut machine = advertising_machine();
        let t0 = Instant::now();
        machine.on_connect(t0 + Duration::from_millis(5));

        assert!(!machine.watchdog(0, t0));
        assert!(machine.state().is_connected());
    }

    #[test]
    fn test_watchdog_ignores_unconnected_states() {
        let mut machine = advertising_machine();
        assert!(!machine.watchdog(0, Instant::now()));
        assert_eq!(machine.state(), PeripheralState::Advertising);
    }

    #[test]
    fn test_begin_reinit_consumes_flag() {
        let mut machine = advertising_machine();
        let t0 = Instant::now();
        machine.on_connect(t0);
        machine.on_disconnect(t0 + Duration::from_secs(1));

        assert!(machine.begin_reinit());
        assert_eq!(machine.state(), PeripheralState::Disconnected);
        assert!(!machine.begin_reinit());

        machine.reinit_failed();
        assert_eq!(machine.state(), PeripheralState::ReinitPending);
        assert!(machine.begin_reinit());
        machine.advertising_started();
        assert_eq!(machine.state(), PeripheralState::Advertising);
    }

    #[test]
    fn test_connect_during_advertising_start_is_kept() {
        let mut machine = ConnectionStateMachine::new(WINDOW);
        let t0 = Instant::now();

        assert!(machine.on_connect(t0));
        machine.advertising_started();

        assert_eq!(machine.state(), PeripheralState::Connected);
        assert!(!machine.watchdog(1, t0 + Duration::from_millis(5)));
    }

    #[test]
    fn test_reset() {
        let mut machine = advertising_machine();
        let t0 = Instant::now();
        machine.on_connect(t0);
        machine.reset();

        assert_eq!(machine.state(), PeripheralState::Idle);
        assert!(machine.on_connect(t0));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", PeripheralState::ReinitPending), "ReinitPending");
        assert_eq!(format!("{}", PeripheralState::Connected), "Connected");
    }
}

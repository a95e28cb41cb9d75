//! Connection state machine
//!
//! The coordinator's single authoritative connection state. Every change
//! goes through [`ConnectionStateMachine::transition`], which rejects
//! transitions that would break the one-connection rule.

use robolink_core::{ConnectionState, PortKind, StateError};

/// Identifies one successful open; bumped on every `Opened`
pub type SessionId = u64;

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// A transport reported a link open under `path`
    Opened {
        /// Path the transport resolved
        path: String,
        /// Transport that owns the link
        kind: PortKind,
    },
    /// The transport closed the link belonging to `session`
    Closed {
        /// Session the close event was raised for
        session: SessionId,
    },
    /// Forget the active connection unconditionally
    Reset,
}

/// Guarded holder of [`ConnectionState`]
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    session: SessionId,
}

impl ConnectionStateMachine {
    /// Create a machine in the `Disconnected` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Id of the most recent session, whether or not it is still open
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Apply `event`, returning the resulting state.
    ///
    /// The state is left untouched when an error is returned.
    pub fn transition(&mut self, event: StateEvent) -> Result<ConnectionState, StateError> {
        match event {
            StateEvent::Opened { path, kind } => {
                if let ConnectionState::Connected { path: current, .. } = &self.state {
                    return Err(StateError::AlreadyConnected {
                        path: current.clone(),
                    });
                }
                self.session += 1;
                self.state = ConnectionState::Connected { path, kind };
            }
            StateEvent::Closed { session } => {
                if !self.state.is_connected() {
                    return Err(StateError::NotConnected);
                }
                if session != self.session {
                    return Err(StateError::InvalidTransition {
                        current: format!("{} (session {})", self.state, self.session),
                        requested: format!("close of session {}", session),
                    });
                }
                self.state = ConnectionState::Disconnected;
            }
            StateEvent::Reset => {
                self.state = ConnectionState::Disconnected;
            }
        }
        Ok(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened(path: &str, kind: PortKind) -> StateEvent {
        StateEvent::Opened {
            path: path.to_string(),
            kind,
        }
    }

    #[test]
    fn test_starts_disconnected() {
        let machine = ConnectionStateMachine::new();
        assert_eq!(machine.state(), &ConnectionState::Disconnected);
        assert_eq!(machine.session(), 0);
    }

    #[test]
    fn test_open_then_close() {
        let mut machine = ConnectionStateMachine::new();
        let state = machine
            .transition(opened("/dev/ttyUSB0", PortKind::Serial))
            .unwrap();
        assert_eq!(state.path(), Some("/dev/ttyUSB0"));
        assert_eq!(machine.session(), 1);

        let state = machine.transition(StateEvent::Closed { session: 1 }).unwrap();
        assert_eq!(state, ConnectionState::Disconnected);
    }

    #[test]
    fn test_open_while_connected_is_rejected() {
        let mut machine = ConnectionStateMachine::new();
        machine
            .transition(opened("/dev/ttyUSB0", PortKind::Serial))
            .unwrap();

        let err = machine
            .transition(opened("bot1:192.168.1.5", PortKind::Network))
            .unwrap_err();
        assert_eq!(
            err,
            StateError::AlreadyConnected {
                path: "/dev/ttyUSB0".to_string()
            }
        );
        assert_eq!(machine.state().kind(), Some(PortKind::Serial));
        assert_eq!(machine.session(), 1);
    }

    #[test]
    fn test_stale_close_does_not_clear_newer_session() {
        let mut machine = ConnectionStateMachine::new();
        machine
            .transition(opened("/dev/ttyUSB0", PortKind::Serial))
            .unwrap();
        machine.transition(StateEvent::Reset).unwrap();
        machine
            .transition(opened("/dev/ttyACM0", PortKind::Serial))
            .unwrap();

        let err = machine
            .transition(StateEvent::Closed { session: 1 })
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        assert_eq!(machine.state().path(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_close_while_disconnected() {
        let mut machine = ConnectionStateMachine::new();
        assert_eq!(
            machine.transition(StateEvent::Closed { session: 0 }),
            Err(StateError::NotConnected)
        );
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut machine = ConnectionStateMachine::new();
        machine
            .transition(opened("bot1:192.168.1.5", PortKind::Network))
            .unwrap();
        assert_eq!(
            machine.transition(StateEvent::Reset).unwrap(),
            ConnectionState::Disconnected
        );
        assert_eq!(
            machine.transition(StateEvent::Reset).unwrap(),
            ConnectionState::Disconnected
        );
    }
}

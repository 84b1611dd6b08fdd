//! Connection state of the SFU signaling socket.
//!
//! The state machine is pure: [`ConnectionState::transition`] returns the next
//! state plus the side effects the owner must run. Effects are entry actions
//! of the target state only, so leaving a state never tears anything down by
//! itself and a resource is released at most once per entry.

use crate::error::{ConnectionError, InvalidTransition, VideoErrorCode};

/// Metadata of an established SFU session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionMetadata {
    pub session_id: String,
    pub reconnected: bool,
    pub participant_count: u32,
    pub fast_reconnect_deadline_seconds: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected(SessionMetadata),
    NetworkDisconnected,
    DisconnectedTemporarily(ConnectionError),
    DisconnectedPermanently(ConnectionError),
    DisconnectedByRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// `connect()` with a (possibly new) configuration.
    Connect,
    /// Retry after a temporary disconnect.
    Reconnect,
    HandshakeSucceeded(SessionMetadata),
    /// Handshake failure or abnormal close that the retry policy will retry.
    TransientFailure(ConnectionError),
    /// Unrecoverable error, or the retry policy gave up.
    PermanentFailure(ConnectionError),
    NetworkLost,
    NetworkAvailable,
    RequestDisconnect,
    ConfigurationCleared,
}

/// Facts outside the state that some transitions depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    pub network_available: bool,
    pub has_configuration: bool,
}

impl Default for TransitionContext {
    fn default() -> Self {
        Self {
            network_available: true,
            has_configuration: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideEffect {
    /// Invalidate in-flight connect attempts and reconnect timers.
    CancelPendingAttempts,
    CloseConnection,
    OpenConnection,
    StartHealthMonitor,
    StopHealthMonitor,
    ResetRetryCounter,
    ScheduleReconnect,
    SubscribeNetwork,
    UnsubscribeNetwork,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ConnectionState,
    pub effects: Vec<SideEffect>,
}

impl Transition {
    fn enter(state: ConnectionState) -> Self {
        let effects = state.entry_effects();
        Self { state, effects }
    }

    fn stay(state: &ConnectionState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Connected(_) => "Connected",
            Self::NetworkDisconnected => "NetworkDisconnected",
            Self::DisconnectedTemporarily(_) => "DisconnectedTemporarily",
            Self::DisconnectedPermanently(_) => "DisconnectedPermanently",
            Self::DisconnectedByRequest => "DisconnectedByRequest",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Any of the three `Disconnected*` variants.
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            Self::DisconnectedTemporarily(_)
                | Self::DisconnectedPermanently(_)
                | Self::DisconnectedByRequest
        )
    }

    pub fn session(&self) -> Option<&SessionMetadata> {
        match self {
            Self::Connected(session) => Some(session),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ConnectionError> {
        match self {
            Self::DisconnectedTemporarily(e) | Self::DisconnectedPermanently(e) => Some(e),
            _ => None,
        }
    }

    fn entry_effects(&self) -> Vec<SideEffect> {
        use SideEffect::*;
        match self {
            Self::Connecting => vec![
                CancelPendingAttempts,
                CloseConnection,
                SubscribeNetwork,
                OpenConnection,
            ],
            Self::Connected(_) => vec![ResetRetryCounter, StartHealthMonitor],
            // Subscribes so a connect issued while offline still hears
            // about the network coming back.
            Self::NetworkDisconnected => vec![
                CancelPendingAttempts,
                StopHealthMonitor,
                CloseConnection,
                SubscribeNetwork,
            ],
            Self::DisconnectedTemporarily(_) => {
                vec![StopHealthMonitor, CloseConnection, ScheduleReconnect]
            }
            Self::DisconnectedPermanently(_) | Self::DisconnectedByRequest => vec![
                CancelPendingAttempts,
                StopHealthMonitor,
                CloseConnection,
                UnsubscribeNetwork,
            ],
        }
    }

    fn connect_target(ctx: TransitionContext) -> Self {
        if ctx.network_available {
            Self::Connecting
        } else {
            Self::NetworkDisconnected
        }
    }

    pub fn transition(
        &self,
        event: ConnectionEvent,
        ctx: TransitionContext,
    ) -> Result<Transition, InvalidTransition> {
        use ConnectionEvent as E;
        let next = match (self, event) {
            (_, E::Connect) => Self::connect_target(ctx),

            (Self::DisconnectedTemporarily(_), E::Reconnect) => Self::connect_target(ctx),

            (Self::Connecting, E::HandshakeSucceeded(session)) => Self::Connected(session),

            (Self::Connecting | Self::Connected(_), E::TransientFailure(err)) => {
                Self::DisconnectedTemporarily(err)
            }

            (Self::DisconnectedPermanently(_), E::PermanentFailure(_)) => {
                return Ok(Transition::stay(self));
            }
            (
                Self::Connecting
                | Self::Connected(_)
                | Self::DisconnectedTemporarily(_)
                | Self::NetworkDisconnected,
                E::PermanentFailure(err),
            ) => Self::DisconnectedPermanently(err),

            (Self::NetworkDisconnected, E::NetworkLost) => return Ok(Transition::stay(self)),
            (
                Self::Connecting | Self::Connected(_) | Self::DisconnectedTemporarily(_),
                E::NetworkLost,
            ) => Self::NetworkDisconnected,

            (Self::NetworkDisconnected | Self::DisconnectedTemporarily(_), E::NetworkAvailable) => {
                if !ctx.has_configuration {
                    return Ok(Transition::stay(self));
                }
                Self::Connecting
            }

            (Self::DisconnectedByRequest, E::RequestDisconnect) => {
                return Ok(Transition::stay(self));
            }
            (_, E::RequestDisconnect) => Self::DisconnectedByRequest,

            (Self::DisconnectedPermanently(_), E::ConfigurationCleared) => {
                return Ok(Transition::stay(self));
            }
            (_, E::ConfigurationCleared) => Self::DisconnectedPermanently(
                ConnectionError::network(VideoErrorCode::SocketClosed, "connection configuration cleared"),
            ),

            (current, event) => {
                return Err(InvalidTransition::new(current.name(), format!("{event:?}")));
            }
        };
        Ok(Transition::enter(next))
    }
}

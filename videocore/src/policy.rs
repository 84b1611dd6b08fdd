//! Predicates answering whether the signaling socket should be connected.
//!
//! The two policies are independent; an orchestration layer combines them.

use crate::call_state::CallState;
use crate::connection::ConnectionState;

pub trait ConnectionPolicy: Send + Sync {
    fn should_connect(&self) -> bool;
    fn should_disconnect(&self) -> bool;
}

/// Keeps the socket up only while there is an active or ringing call.
pub struct CallAwarePolicy<F> {
    current_call: F,
}

impl<F> CallAwarePolicy<F>
where
    F: Fn() -> CallState + Send + Sync,
{
    pub fn new(current_call: F) -> Self {
        Self { current_call }
    }
}

impl<F> ConnectionPolicy for CallAwarePolicy<F>
where
    F: Fn() -> CallState + Send + Sync,
{
    fn should_connect(&self) -> bool {
        true
    }

    fn should_disconnect(&self) -> bool {
        let call = (self.current_call)();
        !(call.is_active() || call.is_ringing())
    }
}

/// Decides from the socket's own state.
pub struct SocketStatePolicy<F> {
    current_state: F,
}

impl<F> SocketStatePolicy<F>
where
    F: Fn() -> ConnectionState + Send + Sync,
{
    pub fn new(current_state: F) -> Self {
        Self { current_state }
    }
}

pub fn socket_should_connect(state: &ConnectionState) -> bool {
    match state {
        ConnectionState::Connecting | ConnectionState::Connected(_) => false,
        ConnectionState::NetworkDisconnected
        | ConnectionState::DisconnectedTemporarily(_)
        | ConnectionState::DisconnectedPermanently(_)
        | ConnectionState::DisconnectedByRequest => true,
    }
}

/// `DisconnectedPermanently` and `NetworkDisconnected` have nothing left to
/// tear down.
pub fn socket_should_disconnect(state: &ConnectionState) -> bool {
    match state {
        ConnectionState::Connecting
        | ConnectionState::Connected(_)
        | ConnectionState::DisconnectedTemporarily(_)
        | ConnectionState::DisconnectedByRequest => true,
        ConnectionState::DisconnectedPermanently(_) | ConnectionState::NetworkDisconnected => false,
    }
}

impl<F> ConnectionPolicy for SocketStatePolicy<F>
where
    F: Fn() -> ConnectionState + Send + Sync,
{
    fn should_connect(&self) -> bool {
        socket_should_connect(&(self.current_state)())
    }

    fn should_disconnect(&self) -> bool {
        socket_should_disconnect(&(self.current_state)())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_state::DropReason;
    use crate::connection::SessionMetadata;
    use crate::error::{ConnectionError, VideoErrorCode};
    use crate::types::call::{CallIdentity, CallInfo};

    fn err() -> ConnectionError {
        ConnectionError::network(VideoErrorCode::NetworkFailed, "x")
    }

    #[test]
    fn test_call_aware_policy() {
        let info = CallInfo::new(CallIdentity::new("default", "1"), "alice");
        let cases = [
            (CallState::Idle, true),
            (
                CallState::Incoming {
                    info: info.clone(),
                    accepted_by_me: false,
                },
                false,
            ),
            (CallState::Joining { info: info.clone() }, false),
            (
                CallState::Drop {
                    call: info.call.clone(),
                    reason: DropReason::Ended,
                },
                true,
            ),
        ];
        for (state, expected) in cases {
            let name = state.name();
            let policy = CallAwarePolicy::new(move || state.clone());
            assert!(policy.should_connect());
            assert_eq!(policy.should_disconnect(), expected, "{name}");
        }
    }

    #[test]
    fn test_socket_state_policy() {
        let cases = [
            (ConnectionState::Connecting, false, true),
            (ConnectionState::Connected(SessionMetadata::default()), false, true),
            (ConnectionState::NetworkDisconnected, true, false),
            (ConnectionState::DisconnectedTemporarily(err()), true, true),
            (ConnectionState::DisconnectedPermanently(err()), true, false),
            (ConnectionState::DisconnectedByRequest, true, true),
        ];
        for (state, connect, disconnect) in cases {
            let name = state.name();
            let policy = SocketStatePolicy::new(move || state.clone());
            assert_eq!(policy.should_connect(), connect, "{name}");
            assert_eq!(policy.should_disconnect(), disconnect, "{name}");
        }
    }
}

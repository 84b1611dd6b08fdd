//! Owner of the single [`CallState`] of a client.
//!
//! Every change goes through [`CallController::apply`], which holds the state
//! lock for the whole read-transition-write and emits
//! `Event::CallStateChanged` before releasing it, so listeners observe
//! transitions in the order they happened.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use videocore::codec::SfuDataEvent;
use videocore::types::call::CallInfoPatch;
use videocore::types::events::Event;
use videocore::{CallEvent, CallInfo, CallState, ConnectionError, InvalidTransition};

use crate::dispatch::Dispatcher;

struct RingTimer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<CallState>,
    ring: Mutex<RingTimer>,
    ring_timeout: Duration,
    dispatcher: Dispatcher,
}

#[derive(Clone)]
pub struct CallController {
    inner: Arc<Inner>,
}

/// Does not keep the controller alive. Held by listeners the controller's
/// own dispatcher owns.
#[derive(Clone)]
pub(crate) struct WeakCallController(Weak<Inner>);

impl WeakCallController {
    pub(crate) fn upgrade(&self) -> Option<CallController> {
        self.0.upgrade().map(|inner| CallController { inner })
    }
}

impl CallController {
    pub fn new(ring_timeout: Duration, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CallState::Idle),
                ring: Mutex::new(RingTimer {
                    generation: 0,
                    task: None,
                }),
                ring_timeout,
                dispatcher,
            }),
        }
    }

    pub fn state(&self) -> CallState {
        self.lock_state().clone()
    }

    pub(crate) fn downgrade(&self) -> WeakCallController {
        WeakCallController(Arc::downgrade(&self.inner))
    }

    /// Runs one transition. On error the state is left untouched.
    pub fn apply(&self, event: CallEvent) -> Result<CallState, InvalidTransition> {
        let mut state = self.lock_state();
        let event_name = event.name();
        let next = state.apply(event).inspect_err(|e| {
            warn!(target: "Call/State", "Ignoring {event_name} in {}: {e}", state.name());
        })?;
        info!(target: "Call/State", "{} --{event_name}--> {}", state.name(), next.name());

        let was_ringing = state.is_ringing();
        *state = next.clone();
        self.inner
            .dispatcher
            .emit(Event::CallStateChanged(next.clone()));

        match (was_ringing, next.is_ringing()) {
            (false, true) => self.arm_ring_timer(),
            (true, false) => self.disarm_ring_timer(),
            _ => {}
        }
        Ok(next)
    }

    pub fn start_outgoing(&self, info: CallInfo) -> Result<CallState, InvalidTransition> {
        self.apply(CallEvent::OutgoingStarted(info))
    }

    pub fn receive_invite(&self, info: CallInfo) -> Result<CallState, InvalidTransition> {
        self.apply(CallEvent::InviteReceived(info))
    }

    /// Accepts the ringing incoming call and moves it to `Joining`.
    pub fn accept_incoming(&self) -> Result<CallState, InvalidTransition> {
        let state = self.state();
        if !matches!(state, CallState::Incoming { accepted_by_me: true, .. }) {
            self.apply(CallEvent::AcceptedByMe)?;
        }
        self.apply(CallEvent::JoinRequestSent)
    }

    pub fn accepted_by_callee(&self, user_id: &str) -> Result<CallState, InvalidTransition> {
        self.apply(CallEvent::AcceptedByCallee {
            user_id: user_id.to_string(),
        })
    }

    /// A callee rejected our call, or we declined an incoming one.
    pub fn rejected_by(&self, user_id: &str) -> Result<CallState, InvalidTransition> {
        self.apply(CallEvent::RejectedBy {
            user_id: user_id.to_string(),
        })
    }

    pub fn cancelled_by(&self, user_id: &str) -> Result<CallState, InvalidTransition> {
        self.apply(CallEvent::CancelledBy {
            user_id: user_id.to_string(),
        })
    }

    pub fn update(&self, patch: CallInfoPatch) -> Result<CallState, InvalidTransition> {
        self.apply(CallEvent::Updated(patch))
    }

    pub fn end(&self) -> Result<CallState, InvalidTransition> {
        self.apply(CallEvent::Ended)
    }

    pub fn fail(&self, error: ConnectionError) -> Result<CallState, InvalidTransition> {
        self.apply(CallEvent::Failed(error))
    }

    pub fn reset(&self) -> Result<CallState, InvalidTransition> {
        self.apply(CallEvent::Reset)
    }

    /// Reacts to the SFU events that move the call along.
    pub fn on_sfu_event(&self, event: &SfuDataEvent) {
        let transition = match event {
            SfuDataEvent::JoinResponse(_) => {
                if !matches!(self.state(), CallState::Connecting { .. }) {
                    return;
                }
                CallEvent::SfuJoinResponse
            }
            SfuDataEvent::CallEnded(ended) => {
                debug!(target: "Call/State", "SFU ended the call: {:?}", ended.reason);
                CallEvent::Ended
            }
            _ => return,
        };
        let _ = self.apply(transition);
    }

    fn arm_ring_timer(&self) {
        let weak = self.downgrade();
        let timeout = self.inner.ring_timeout;
        let mut ring = self.lock_ring();
        ring.generation += 1;
        let generation = ring.generation;
        if let Some(previous) = ring.task.take() {
            previous.abort();
        }
        ring.task = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(controller) = weak.upgrade() else {
                return;
            };
            if controller.lock_ring().generation != generation {
                return;
            }
            let wait_millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            info!(target: "Call/State", "Nobody answered within {wait_millis}ms");
            let _ = controller.apply(CallEvent::TimedOut { wait_millis });
        }));
    }

    fn disarm_ring_timer(&self) {
        let mut ring = self.lock_ring();
        ring.generation += 1;
        if let Some(task) = ring.task.take() {
            task.abort();
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CallState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_ring(&self) -> MutexGuard<'_, RingTimer> {
        self.inner.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self
            .ring
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .task
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use videocore::codec::{CallEnded, JoinResponse};
    use videocore::types::call::CallUser;
    use videocore::{CallIdentity, DropReason, SfuCredentials};

    fn info() -> CallInfo {
        let mut info = CallInfo::new(CallIdentity::new("default", "c1"), "alice");
        for id in ["alice", "bob"] {
            info.users.insert(
                id.to_string(),
                CallUser {
                    user_id: id.to_string(),
                    ..Default::default()
                },
            );
        }
        info
    }

    fn controller() -> (CallController, Arc<StdMutex<Vec<&'static str>>>) {
        let dispatcher = Dispatcher::new();
        let names = Arc::new(StdMutex::new(Vec::new()));
        let sink = names.clone();
        let _ = dispatcher.subscribe(Arc::new(move |event: &Event| -> anyhow::Result<()> {
            if let Event::CallStateChanged(state) = event {
                sink.lock().unwrap().push(state.name());
            }
            Ok(())
        }));
        (
            CallController::new(Duration::from_secs(30), dispatcher),
            names,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_outgoing_call_times_out() {
        let (calls, _) = controller();
        calls.start_outgoing(info()).unwrap();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(calls.state().name(), "Outgoing");

        tokio::time::sleep(Duration::from_secs(2)).await;
        match calls.state() {
            CallState::Drop { reason, call } => {
                assert_eq!(call, CallIdentity::new("default", "c1"));
                assert_eq!(reason, DropReason::Timeout { wait_millis: 30_000 });
            }
            other => panic!("expected Drop, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepting_disarms_ring_timer() {
        let (calls, _) = controller();
        calls.receive_invite(info()).unwrap();
        let joining = calls.accept_incoming().unwrap();
        assert_eq!(joining, CallState::Joining { info: info() });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.state().name(), "Joining");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_event_keeps_state() {
        let (calls, names) = controller();
        assert!(calls.accept_incoming().is_err());
        assert_eq!(calls.state(), CallState::Idle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(names.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sfu_events_drive_connected_and_ended() {
        let (calls, names) = controller();
        let sfu = SfuCredentials {
            call_url: "wss://edge1".to_string(),
            sfu_token: "tok".to_string(),
            ice_servers: Vec::new(),
        };
        calls.receive_invite(info()).unwrap();
        calls.accept_incoming().unwrap();
        calls.apply(CallEvent::CoordinatorJoined(sfu)).unwrap();

        // A join response before the SFU join request is sent changes nothing.
        calls.on_sfu_event(&SfuDataEvent::JoinResponse(JoinResponse::default()));
        assert_eq!(calls.state().name(), "Joined");

        calls
            .apply(CallEvent::SfuJoinRequestSent {
                sfu_session_id: "s1".to_string(),
            })
            .unwrap();
        calls.on_sfu_event(&SfuDataEvent::JoinResponse(JoinResponse::default()));
        assert_eq!(calls.state().sfu_session_id(), Some("s1"));
        assert_eq!(calls.state().name(), "ConnectedToSfu");

        calls.on_sfu_event(&SfuDataEvent::CallEnded(CallEnded::default()));
        assert!(matches!(
            calls.state(),
            CallState::Drop {
                reason: DropReason::Ended,
                ..
            }
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            *names.lock().unwrap(),
            vec![
                "Incoming",
                "Incoming",
                "Joining",
                "Joined",
                "Connecting",
                "ConnectedToSfu",
                "Drop"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_drop_allows_new_call() {
        let (calls, _) = controller();
        calls.start_outgoing(info()).unwrap();
        calls.cancelled_by("alice").unwrap();
        calls.reset().unwrap();
        assert_eq!(calls.state(), CallState::Idle);
        calls.start_outgoing(info()).unwrap();
        assert!(calls.state().is_ringing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ring_timer_does_not_drop_next_call() {
        let (calls, _) = controller();
        calls.start_outgoing(info()).unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        calls.cancelled_by("alice").unwrap();
        calls.reset().unwrap();
        calls.start_outgoing(info()).unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(calls.state().name(), "Outgoing");
    }
}

//! Lifecycle of a single call.
//!
//! # State flow
//!
//! ```text
//!             invite                accept + join
//!   Idle ──────────────► Incoming ─────────────────┐
//!    │                                              ▼
//!    └──► Outgoing ────────────────────────────► Joining ──► Joined ──► Connecting ──► ConnectedToSfu
//!                                                                          ▲               │
//!                                                                          └───────────────┘
//!                                                                            SFU rejoin
//!
//!   any active state ── timeout / reject / cancel / end / failure ──► Drop ── reset ──► Idle
//! ```
//!
//! [`CallState::apply`] is a pure function. Every transition copies the
//! common [`CallInfo`] across unchanged unless the event explicitly carries a
//! new value for a field.

use std::collections::BTreeSet;

use crate::error::{ConnectionError, InvalidTransition};
use crate::types::call::{CallIdentity, CallInfo, CallInfoPatch, IceServer};

/// Why a call left the active states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Timeout { wait_millis: u64 },
    Failure(ConnectionError),
    Rejected { by_user_id: String },
    Cancelled { by_user_id: String },
    Ended,
}

/// Credentials returned by the coordinator for the assigned edge server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SfuCredentials {
    pub call_url: String,
    pub sfu_token: String,
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CallState {
    #[default]
    Idle,
    Outgoing {
        info: CallInfo,
        rejections: BTreeSet<String>,
        accepted_by_callee: bool,
    },
    Incoming {
        info: CallInfo,
        accepted_by_me: bool,
    },
    Joining {
        info: CallInfo,
    },
    Joined {
        info: CallInfo,
        sfu: SfuCredentials,
    },
    /// SFU join request sent.
    Connecting {
        info: CallInfo,
        sfu: SfuCredentials,
        sfu_session_id: String,
    },
    /// SFU join response received.
    ConnectedToSfu {
        info: CallInfo,
        sfu: SfuCredentials,
        sfu_session_id: String,
    },
    Drop {
        call: CallIdentity,
        reason: DropReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    InviteReceived(CallInfo),
    OutgoingStarted(CallInfo),
    /// Joining a call directly, without ringing.
    JoinStarted(CallInfo),
    AcceptedByMe,
    AcceptedByCallee { user_id: String },
    JoinRequestSent,
    CoordinatorJoined(SfuCredentials),
    SfuJoinRequestSent { sfu_session_id: String },
    SfuJoinResponse,
    Updated(CallInfoPatch),
    RejectedBy { user_id: String },
    CancelledBy { user_id: String },
    TimedOut { wait_millis: u64 },
    Ended,
    Failed(ConnectionError),
    Reset,
}

impl CallEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InviteReceived(_) => "InviteReceived",
            Self::OutgoingStarted(_) => "OutgoingStarted",
            Self::JoinStarted(_) => "JoinStarted",
            Self::AcceptedByMe => "AcceptedByMe",
            Self::AcceptedByCallee { .. } => "AcceptedByCallee",
            Self::JoinRequestSent => "JoinRequestSent",
            Self::CoordinatorJoined(_) => "CoordinatorJoined",
            Self::SfuJoinRequestSent { .. } => "SfuJoinRequestSent",
            Self::SfuJoinResponse => "SfuJoinResponse",
            Self::Updated(_) => "Updated",
            Self::RejectedBy { .. } => "RejectedBy",
            Self::CancelledBy { .. } => "CancelledBy",
            Self::TimedOut { .. } => "TimedOut",
            Self::Ended => "Ended",
            Self::Failed(_) => "Failed",
            Self::Reset => "Reset",
        }
    }
}

impl CallState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Outgoing { .. } => "Outgoing",
            Self::Incoming { .. } => "Incoming",
            Self::Joining { .. } => "Joining",
            Self::Joined { .. } => "Joined",
            Self::Connecting { .. } => "Connecting",
            Self::ConnectedToSfu { .. } => "ConnectedToSfu",
            Self::Drop { .. } => "Drop",
        }
    }

    pub fn info(&self) -> Option<&CallInfo> {
        match self {
            Self::Outgoing { info, .. }
            | Self::Incoming { info, .. }
            | Self::Joining { info }
            | Self::Joined { info, .. }
            | Self::Connecting { info, .. }
            | Self::ConnectedToSfu { info, .. } => Some(info),
            Self::Idle | Self::Drop { .. } => None,
        }
    }

    pub fn call(&self) -> Option<&CallIdentity> {
        match self {
            Self::Drop { call, .. } => Some(call),
            other => other.info().map(|info| &info.call),
        }
    }

    /// Neither `Idle` nor `Drop`.
    pub fn is_active(&self) -> bool {
        self.info().is_some()
    }

    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::Outgoing { .. } | Self::Incoming { .. })
    }

    pub fn sfu_session_id(&self) -> Option<&str> {
        match self {
            Self::Connecting { sfu_session_id, .. } | Self::ConnectedToSfu { sfu_session_id, .. } => {
                Some(sfu_session_id)
            }
            _ => None,
        }
    }

    pub fn sfu(&self) -> Option<&SfuCredentials> {
        match self {
            Self::Joined { sfu, .. } | Self::Connecting { sfu, .. } | Self::ConnectedToSfu { sfu, .. } => {
                Some(sfu)
            }
            _ => None,
        }
    }

    /// Same variant with `info` replaced and every other field kept.
    fn with_info(&self, info: CallInfo) -> Self {
        match self {
            Self::Outgoing {
                rejections,
                accepted_by_callee,
                ..
            } => Self::Outgoing {
                info,
                rejections: rejections.clone(),
                accepted_by_callee: *accepted_by_callee,
            },
            Self::Incoming { accepted_by_me, .. } => Self::Incoming {
                info,
                accepted_by_me: *accepted_by_me,
            },
            Self::Joining { .. } => Self::Joining { info },
            Self::Joined { sfu, .. } => Self::Joined {
                info,
                sfu: sfu.clone(),
            },
            Self::Connecting {
                sfu, sfu_session_id, ..
            } => Self::Connecting {
                info,
                sfu: sfu.clone(),
                sfu_session_id: sfu_session_id.clone(),
            },
            Self::ConnectedToSfu {
                sfu, sfu_session_id, ..
            } => Self::ConnectedToSfu {
                info,
                sfu: sfu.clone(),
                sfu_session_id: sfu_session_id.clone(),
            },
            Self::Idle | Self::Drop { .. } => self.clone(),
        }
    }

    fn drop_with(&self, reason: DropReason) -> Option<Self> {
        self.info().map(|info| Self::Drop {
            call: info.call.clone(),
            reason,
        })
    }

    pub fn apply(&self, event: CallEvent) -> Result<CallState, InvalidTransition> {
        let invalid = |event: &CallEvent| InvalidTransition::new(self.name(), event.name());

        let next = match (self, event) {
            (Self::Idle, CallEvent::InviteReceived(info)) => Self::Incoming {
                info,
                accepted_by_me: false,
            },
            (Self::Idle, CallEvent::OutgoingStarted(info)) => Self::Outgoing {
                info,
                rejections: BTreeSet::new(),
                accepted_by_callee: false,
            },
            (Self::Idle, CallEvent::JoinStarted(info)) => Self::Joining { info },

            (Self::Incoming { info, .. }, CallEvent::AcceptedByMe) => Self::Incoming {
                info: info.clone(),
                accepted_by_me: true,
            },
            (
                Self::Outgoing {
                    info, rejections, ..
                },
                CallEvent::AcceptedByCallee { .. },
            ) => Self::Outgoing {
                info: info.clone(),
                rejections: rejections.clone(),
                accepted_by_callee: true,
            },

            (
                Self::Incoming {
                    info,
                    accepted_by_me: true,
                }
                | Self::Outgoing { info, .. },
                CallEvent::JoinRequestSent,
            ) => Self::Joining { info: info.clone() },

            (Self::Joining { info }, CallEvent::CoordinatorJoined(sfu)) => Self::Joined {
                info: info.clone(),
                sfu,
            },

            (
                Self::Joined { info, sfu }
                | Self::Connecting { info, sfu, .. }
                | Self::ConnectedToSfu { info, sfu, .. },
                CallEvent::SfuJoinRequestSent { sfu_session_id },
            ) => Self::Connecting {
                info: info.clone(),
                sfu: sfu.clone(),
                sfu_session_id,
            },

            (
                Self::Connecting {
                    info,
                    sfu,
                    sfu_session_id,
                },
                CallEvent::SfuJoinResponse,
            ) => Self::ConnectedToSfu {
                info: info.clone(),
                sfu: sfu.clone(),
                sfu_session_id: sfu_session_id.clone(),
            },

            (state, CallEvent::Updated(patch)) if state.is_active() => {
                let info = state.info().map(|info| patch.apply_to(info));
                match info {
                    Some(info) => state.with_info(info),
                    None => return Err(invalid(&CallEvent::Updated(patch))),
                }
            }

            (Self::Incoming { info, .. }, CallEvent::RejectedBy { user_id }) => Self::Drop {
                call: info.call.clone(),
                reason: DropReason::Rejected {
                    by_user_id: user_id,
                },
            },
            (
                Self::Outgoing {
                    info,
                    rejections,
                    accepted_by_callee,
                },
                CallEvent::RejectedBy { user_id },
            ) => {
                let mut rejections = rejections.clone();
                rejections.insert(user_id.clone());
                let everyone_rejected = info.callees().all(|callee| rejections.contains(callee));
                if everyone_rejected {
                    Self::Drop {
                        call: info.call.clone(),
                        reason: DropReason::Rejected {
                            by_user_id: user_id,
                        },
                    }
                } else {
                    Self::Outgoing {
                        info: info.clone(),
                        rejections,
                        accepted_by_callee: *accepted_by_callee,
                    }
                }
            }

            (state, CallEvent::TimedOut { wait_millis }) if state.is_ringing() => {
                match state.drop_with(DropReason::Timeout { wait_millis }) {
                    Some(next) => next,
                    None => return Err(invalid(&CallEvent::TimedOut { wait_millis })),
                }
            }

            (state, event @ (CallEvent::CancelledBy { .. } | CallEvent::Ended | CallEvent::Failed(_)))
                if state.is_active() =>
            {
                let name = event.name();
                let reason = match event {
                    CallEvent::CancelledBy { user_id } => DropReason::Cancelled {
                        by_user_id: user_id,
                    },
                    CallEvent::Failed(err) => DropReason::Failure(err),
                    _ => DropReason::Ended,
                };
                match state.drop_with(reason) {
                    Some(next) => next,
                    None => return Err(InvalidTransition::new(state.name(), name)),
                }
            }

            (Self::Drop { .. } | Self::Idle, CallEvent::Reset) => Self::Idle,

            (_, event) => return Err(invalid(&event)),
        };
        Ok(next)
    }
}

//! Runtime-agnostic core of the video calling client.
//!
//! Nothing in this crate spawns tasks or sleeps; state machines return the
//! next state and leave effects to the caller.

pub mod call_state;
pub mod codec;
pub mod connection;
pub mod error;
pub mod listeners;
pub mod net;
pub mod policy;
pub mod retry;
pub mod types;

pub use call_state::{CallEvent, CallState, DropReason, SfuCredentials};
pub use connection::{ConnectionEvent, ConnectionState, SessionMetadata, SideEffect};
pub use error::{ApiError, ApiErrorCode, ConnectionError, InvalidTransition, VideoErrorCode};
pub use types::call::{CallIdentity, CallInfo};

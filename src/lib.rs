//! Signaling and connection-state core of a video calling client.
//!
//! The pure state machines and the wire codec live in [`videocore`]; this
//! crate drives them on tokio: the SFU socket actor, the health monitor,
//! the coordinator REST client and the per-client call controller.

pub use videocore;

pub mod call;
pub mod captions;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod network;
pub mod socket;
pub mod transport;

#[cfg(test)]
pub mod test_utils;

pub use client::Client;
pub use config::ClientConfig;
pub use dispatch::{AsyncEventHandler, Dispatcher};
pub use error::CallError;
pub use videocore::types::events::{Event, EventHandler};

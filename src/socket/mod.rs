//! The SFU signaling socket.
//!
//! [`SfuSocket`] is a handle to an actor task that exclusively owns the live
//! connection and the [`ConnectionState`]. Failures never surface as errors
//! from [`SfuSocket::connect`]; they are observed as state transitions
//! published through [`SfuSocket::state`] and as
//! `Event::ConnectionStateChanged` on the dispatcher.

mod actor;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::{mpsc, oneshot, watch};
use videocore::codec::{ClientDetails, SfuRequest};
use videocore::connection::ConnectionState;
use videocore::retry::RetryConfig;

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::health::HealthConfig;
use crate::network::NetworkStateProvider;
use crate::transport::TransportFactory;

pub use error::{Result, SocketError};

use actor::{SocketActor, SocketCommand};

/// Where and as whom to join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfig {
    pub url: String,
    pub token: String,
    pub session_id: String,
    pub subscriber_sdp: String,
}

#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub retry: RetryConfig,
    pub health: HealthConfig,
    pub connect_timeout: Duration,
    pub decode_error_threshold: u32,
    pub client_details: ClientDetails,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for SocketConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            retry: config.retry,
            health: config.health.clone(),
            connect_timeout: config.connect_timeout(),
            decode_error_threshold: config.decode_error_threshold.max(1),
            client_details: ClientDetails {
                sdk_name: env!("CARGO_PKG_NAME").to_string(),
                sdk_version: env!("CARGO_PKG_VERSION").to_string(),
                os: std::env::consts::OS.to_string(),
                device: String::new(),
            },
        }
    }
}

pub struct SfuSocket {
    commands: mpsc::UnboundedSender<SocketCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl SfuSocket {
    /// Spawns the socket actor. Must be called from within a tokio runtime.
    /// The actor stops once this handle is dropped.
    pub fn new(
        config: SocketConfig,
        factory: Arc<dyn TransportFactory>,
        network: Arc<dyn NetworkStateProvider>,
        dispatcher: Dispatcher,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::DisconnectedByRequest);
        let actor = SocketActor::new(
            config,
            factory,
            network,
            dispatcher,
            rx,
            commands.downgrade(),
            state_tx,
        );
        tokio::spawn(actor.run());
        Self { commands, state }
    }

    /// Starts connecting with `join`, replacing any previous configuration.
    pub fn connect(&self, join: JoinConfig) {
        self.command(SocketCommand::Connect(join));
    }

    /// Leaves the call and closes the connection. Returns once the socket is
    /// in `DisconnectedByRequest`; calling it again is a no-op.
    pub async fn disconnect(&self, reason: impl Into<String>) {
        let (done, wait) = oneshot::channel();
        self.command(SocketCommand::Disconnect {
            reason: reason.into(),
            done,
        });
        let _ = wait.await;
    }

    /// Sends one request. Only valid while `Connected`.
    pub async fn send(&self, request: SfuRequest) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SocketCommand::Send { request, reply })
            .map_err(|_| SocketError::Closed)?;
        response.await.map_err(|_| SocketError::Closed)?
    }

    pub fn on_network_lost(&self) {
        self.command(SocketCommand::NetworkLost);
    }

    pub fn on_network_available(&self) {
        self.command(SocketCommand::NetworkAvailable);
    }

    /// Forgets the join configuration and tears the connection down for good.
    pub fn clear_configuration(&self) {
        self.command(SocketCommand::ClearConfiguration);
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate` and returns it.
    pub async fn wait_for_state<F>(&self, predicate: F) -> ConnectionState
    where
        F: FnMut(&ConnectionState) -> bool,
    {
        let mut state = self.state.clone();
        let matched = match state.wait_for(predicate).await {
            Ok(matched) => matched.clone(),
            Err(_) => self.state(),
        };
        matched
    }

    fn command(&self, command: SocketCommand) {
        if self.commands.send(command).is_err() {
            warn!(target: "Sfu/Socket", "Socket actor is gone, dropping command");
        }
    }
}

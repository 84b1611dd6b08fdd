use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use videocore::codec::{
    self, ErrorEvent, HealthCheckRequest, JoinRequest, JoinResponse, LeaveCallRequest,
    ReconnectDetails, ReconnectStrategy, SfuDataEvent, SfuRequest,
};
use videocore::connection::{
    ConnectionEvent, ConnectionState, SessionMetadata, SideEffect, Transition, TransitionContext,
};
use videocore::error::{ConnectionError, VideoErrorCode};
use videocore::retry::{ReconnectionPolicy, RetryDecision};
use videocore::types::events::Event;

use super::{JoinConfig, SocketConfig, SocketError};
use crate::dispatch::Dispatcher;
use crate::health::{HealthCallback, HealthMonitor};
use crate::network::NetworkStateProvider;
use crate::transport::{Transport, TransportEvent, TransportFactory};

type Connection = (Arc<dyn Transport>, mpsc::Receiver<TransportEvent>);
type Reply = oneshot::Sender<Result<(), SocketError>>;

pub(super) enum SocketCommand {
    Connect(JoinConfig),
    Disconnect {
        reason: String,
        done: oneshot::Sender<()>,
    },
    Send {
        request: SfuRequest,
        reply: Reply,
    },
    NetworkLost,
    NetworkAvailable,
    ClearConfiguration,
    AttemptFinished {
        generation: u64,
        result: Result<Connection, String>,
    },
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    ReconnectDue {
        generation: u64,
    },
    HandshakeTimedOut {
        generation: u64,
    },
    HealthCheck,
    LivenessLost,
}

fn forward(commands: &WeakUnboundedSender<SocketCommand>, command: SocketCommand) -> bool {
    commands
        .upgrade()
        .is_some_and(|tx| tx.send(command).is_ok())
}

fn notifier(
    commands: &WeakUnboundedSender<SocketCommand>,
    make: fn() -> SocketCommand,
) -> HealthCallback {
    let commands = commands.clone();
    Arc::new(move || {
        forward(&commands, make());
    })
}

fn fail(reply: Option<Reply>, error: SocketError) {
    match reply {
        Some(reply) => {
            let _ = reply.send(Err(error));
        }
        None => warn!(target: "Sfu/Socket", "Dropped outbound request: {error}"),
    }
}

struct Outbound {
    frame: Vec<u8>,
    reply: Option<Reply>,
}

/// The live connection. Dropping it flushes already queued frames and then
/// closes the transport.
struct Link {
    outbound: UnboundedSender<Outbound>,
    pump: JoinHandle<()>,
}

impl Link {
    fn open(
        generation: u64,
        transport: Arc<dyn Transport>,
        mut events: mpsc::Receiver<TransportEvent>,
        commands: WeakUnboundedSender<SocketCommand>,
    ) -> Self {
        let (outbound, mut queue) = mpsc::unbounded_channel::<Outbound>();
        tokio::spawn(async move {
            while let Some(Outbound { frame, reply }) = queue.recv().await {
                let result = transport
                    .send(&frame)
                    .await
                    .map_err(SocketError::Transport);
                match (reply, result) {
                    (Some(reply), result) => {
                        let _ = reply.send(result);
                    }
                    (None, Err(e)) => warn!(target: "Sfu/Socket", "Failed to send frame: {e}"),
                    (None, Ok(())) => {}
                }
            }
            transport.disconnect().await;
        });

        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !forward(&commands, SocketCommand::Transport { generation, event }) {
                    return;
                }
            }
            forward(
                &commands,
                SocketCommand::Transport {
                    generation,
                    event: TransportEvent::Disconnected {
                        code: None,
                        reason: "transport event stream ended".to_string(),
                    },
                },
            );
        });

        Self { outbound, pump }
    }

    fn queue(&self, outbound: Outbound) {
        if let Err(mpsc::error::SendError(outbound)) = self.outbound.send(outbound) {
            fail(outbound.reply, SocketError::Closed);
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Sole owner of the connection state and the live connection.
///
/// Every mutation happens on the actor task in command order. Work that has
/// to wait (connect attempts, timers, the transport's event stream) runs in
/// helper tasks that report back as commands tagged with the generation they
/// were started under; anything tagged with an older generation is dropped.
pub(super) struct SocketActor {
    commands: UnboundedReceiver<SocketCommand>,
    self_tx: WeakUnboundedSender<SocketCommand>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    config: SocketConfig,
    factory: Arc<dyn TransportFactory>,
    network: Arc<dyn NetworkStateProvider>,
    dispatcher: Dispatcher,
    join: Option<JoinConfig>,
    generation: u64,
    retry: ReconnectionPolicy,
    health: HealthMonitor,
    network_subscribed: bool,
    link: Option<Link>,
    attempt: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    handshake_timer: Option<JoinHandle<()>>,
    reconnect_delay: Duration,
    reconnecting: bool,
    previous_session_id: Option<String>,
    decode_failures: u32,
}

impl SocketActor {
    pub(super) fn new(
        config: SocketConfig,
        factory: Arc<dyn TransportFactory>,
        network: Arc<dyn NetworkStateProvider>,
        dispatcher: Dispatcher,
        commands: UnboundedReceiver<SocketCommand>,
        self_tx: WeakUnboundedSender<SocketCommand>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let health = HealthMonitor::new(
            config.health.clone(),
            notifier(&self_tx, || SocketCommand::HealthCheck),
            notifier(&self_tx, || SocketCommand::LivenessLost),
        );
        let state = state_tx.borrow().clone();
        Self {
            commands,
            self_tx,
            state,
            state_tx,
            retry: ReconnectionPolicy::new(config.retry),
            config,
            factory,
            network,
            dispatcher,
            join: None,
            generation: 0,
            health,
            network_subscribed: false,
            link: None,
            attempt: None,
            reconnect_timer: None,
            handshake_timer: None,
            reconnect_delay: Duration::ZERO,
            reconnecting: false,
            previous_session_id: None,
            decode_failures: 0,
        }
    }

    pub(super) async fn run(mut self) {
        debug!(target: "Sfu/Socket", "Socket actor started");
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        self.shutdown();
    }

    fn handle(&mut self, command: SocketCommand) {
        match command {
            SocketCommand::Connect(join) => {
                info!(target: "Sfu/Socket", "Connecting to {}", join.url);
                self.join = Some(join);
                self.reconnecting = false;
                self.previous_session_id = None;
                // A new configuration starts with a full retry budget.
                self.retry.on_connected();
                self.apply(ConnectionEvent::Connect);
            }
            SocketCommand::Disconnect { reason, done } => {
                self.leave(&reason);
                self.apply(ConnectionEvent::RequestDisconnect);
                let _ = done.send(());
            }
            SocketCommand::Send { request, reply } => {
                if self.state.is_connected() {
                    self.queue(request, Some(reply));
                } else {
                    let _ = reply.send(Err(SocketError::NotConnected {
                        state: self.state.name(),
                    }));
                }
            }
            SocketCommand::NetworkLost => {
                if self.network_subscribed {
                    info!(target: "Sfu/Socket", "Network lost");
                    self.apply(ConnectionEvent::NetworkLost);
                }
            }
            SocketCommand::NetworkAvailable => {
                if self.network_subscribed {
                    info!(target: "Sfu/Socket", "Network available");
                    self.reconnecting = self.previous_session_id.is_some();
                    self.apply(ConnectionEvent::NetworkAvailable);
                }
            }
            SocketCommand::ClearConfiguration => {
                self.join = None;
                self.apply(ConnectionEvent::ConfigurationCleared);
            }
            SocketCommand::AttemptFinished { generation, result } => {
                self.on_attempt_finished(generation, result);
            }
            SocketCommand::Transport { generation, event } => {
                if generation == self.generation {
                    self.on_transport_event(event);
                }
            }
            SocketCommand::ReconnectDue { generation } => {
                if generation == self.generation
                    && matches!(self.state, ConnectionState::DisconnectedTemporarily(_))
                {
                    info!(
                        target: "Sfu/Socket",
                        "Reconnect attempt {} of {}",
                        self.retry.attempts(),
                        self.retry.config().max_retries
                    );
                    self.reconnecting = true;
                    self.apply(ConnectionEvent::Reconnect);
                }
            }
            SocketCommand::HandshakeTimedOut { generation } => {
                if generation == self.generation
                    && matches!(self.state, ConnectionState::Connecting)
                {
                    self.handle_failure(ConnectionError::network(
                        VideoErrorCode::SocketFailure,
                        format!(
                            "no join response within {}ms",
                            self.config.connect_timeout.as_millis()
                        ),
                    ));
                }
            }
            SocketCommand::HealthCheck => {
                if self.state.is_connected() {
                    self.queue(SfuRequest::HealthCheck(HealthCheckRequest {}), None);
                }
            }
            SocketCommand::LivenessLost => {
                if self.state.is_connected() && self.health.is_running() {
                    self.handle_failure(ConnectionError::network(
                        VideoErrorCode::SocketFailure,
                        "health check timed out",
                    ));
                }
            }
        }
    }

    fn apply(&mut self, event: ConnectionEvent) {
        let ctx = TransitionContext {
            network_available: self.network.is_connected(),
            has_configuration: self.join.is_some(),
        };
        let Transition { state, effects } = match self.state.transition(event, ctx) {
            Ok(transition) => transition,
            Err(e) => {
                warn!(target: "Sfu/Socket", "Ignoring event: {e}");
                return;
            }
        };
        if effects.is_empty() && state == self.state {
            return;
        }

        info!(target: "Sfu/Socket", "{} -> {}", self.state.name(), state.name());
        self.state = state.clone();
        for effect in effects {
            self.run_effect(effect);
        }
        self.state_tx.send_replace(state.clone());
        self.dispatcher.emit(Event::ConnectionStateChanged(state));
    }

    fn run_effect(&mut self, effect: SideEffect) {
        trace!(target: "Sfu/Socket", "Running {effect:?}");
        match effect {
            SideEffect::CancelPendingAttempts => {
                self.generation += 1;
                let pending = [
                    self.attempt.take(),
                    self.reconnect_timer.take(),
                    self.handshake_timer.take(),
                ];
                for task in pending.into_iter().flatten() {
                    task.abort();
                }
            }
            SideEffect::CloseConnection => {
                self.generation += 1;
                for task in [self.attempt.take(), self.handshake_timer.take()]
                    .into_iter()
                    .flatten()
                {
                    task.abort();
                }
                if self.link.take().is_some() {
                    debug!(target: "Sfu/Socket", "Closed connection");
                }
            }
            SideEffect::OpenConnection => self.open_connection(),
            SideEffect::StartHealthMonitor => self.health.start(),
            SideEffect::StopHealthMonitor => self.health.stop(),
            SideEffect::ResetRetryCounter => self.retry.on_connected(),
            SideEffect::ScheduleReconnect => self.schedule_reconnect(),
            SideEffect::SubscribeNetwork => self.network_subscribed = true,
            SideEffect::UnsubscribeNetwork => self.network_subscribed = false,
        }
    }

    fn open_connection(&mut self) {
        self.generation += 1;
        self.decode_failures = 0;
        let generation = self.generation;
        let commands = self.self_tx.clone();

        let Some(url) = self.join.as_ref().map(|join| join.url.clone()) else {
            forward(
                &commands,
                SocketCommand::AttemptFinished {
                    generation,
                    result: Err("no connection configuration".to_string()),
                },
            );
            return;
        };

        let factory = self.factory.clone();
        let attempt_commands = commands.clone();
        self.attempt = Some(tokio::spawn(async move {
            let result = factory
                .create_transport(&url)
                .await
                .map_err(|e| format!("{e:#}"));
            forward(
                &attempt_commands,
                SocketCommand::AttemptFinished { generation, result },
            );
        }));

        let timeout = self.config.connect_timeout;
        self.handshake_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            forward(&commands, SocketCommand::HandshakeTimedOut { generation });
        }));
    }

    fn schedule_reconnect(&mut self) {
        let generation = self.generation;
        let delay = std::mem::take(&mut self.reconnect_delay);
        let commands = self.self_tx.clone();
        debug!(target: "Sfu/Socket", "Reconnecting in {}ms", delay.as_millis());
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            forward(&commands, SocketCommand::ReconnectDue { generation });
        }));
    }

    fn on_attempt_finished(&mut self, generation: u64, result: Result<Connection, String>) {
        if generation != self.generation || !matches!(self.state, ConnectionState::Connecting) {
            if let Ok((transport, _)) = result {
                debug!(target: "Sfu/Socket", "Discarding stale connection attempt {generation}");
                tokio::spawn(async move { transport.disconnect().await });
            }
            return;
        }
        self.attempt = None;
        match result {
            Ok((transport, events)) => {
                self.link = Some(Link::open(
                    generation,
                    transport,
                    events,
                    self.self_tx.clone(),
                ));
                self.send_join();
            }
            Err(message) => {
                warn!(target: "Sfu/Socket", "Connection attempt failed: {message}");
                self.handle_failure(ConnectionError::network(
                    VideoErrorCode::NetworkFailed,
                    message,
                ));
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                debug!(target: "Sfu/Socket", "Transport connected, awaiting join response");
            }
            TransportEvent::DataReceived(frame) => self.on_frame(frame),
            TransportEvent::Disconnected { .. } if !event.is_abnormal_close() => {
                info!(target: "Sfu/Socket", "Connection closed normally by peer");
                self.apply(ConnectionEvent::RequestDisconnect);
            }
            TransportEvent::Disconnected { code, reason } => {
                info!(
                    target: "Sfu/Socket",
                    "Connection closed by peer (code {code:?}): {reason}"
                );
                self.handle_failure(ConnectionError::network(
                    VideoErrorCode::NetworkFailed,
                    format!("connection closed (code {code:?}): {reason}"),
                ));
            }
        }
    }

    fn on_frame(&mut self, frame: Bytes) {
        self.health.ack();
        let event = match codec::decode_event(&frame) {
            Ok(event) => {
                self.decode_failures = 0;
                event
            }
            Err(e) => {
                self.decode_failures += 1;
                warn!(
                    target: "Sfu/Socket",
                    "Dropping undecodable frame ({}/{}): {e}",
                    self.decode_failures, self.config.decode_error_threshold
                );
                if self.decode_failures >= self.config.decode_error_threshold {
                    self.decode_failures = 0;
                    self.handle_failure(ConnectionError::network(
                        VideoErrorCode::CantParseEvent,
                        format!(
                            "{} consecutive undecodable frames",
                            self.config.decode_error_threshold
                        ),
                    ));
                }
                return;
            }
        };

        trace!(target: "Sfu/Socket", "<-- {}", event.name());
        match &event {
            SfuDataEvent::JoinResponse(response) => self.on_join_response(response),
            SfuDataEvent::Error(error) => self.on_sfu_error(error),
            SfuDataEvent::GoAway(go_away) => {
                info!(target: "Sfu/Socket", "SFU sent go-away ({:?})", go_away.reason());
                self.handle_failure(ConnectionError::network(
                    VideoErrorCode::NetworkFailed,
                    "SFU requested migration",
                ));
            }
            _ => {}
        }
        self.dispatcher.emit(Event::Sfu(Arc::new(event)));
    }

    fn on_join_response(&mut self, response: &JoinResponse) {
        if !matches!(self.state, ConnectionState::Connecting) {
            debug!(
                target: "Sfu/Socket",
                "Ignoring join response while {}",
                self.state.name()
            );
            return;
        }
        let Some(join) = &self.join else {
            return;
        };
        let session = SessionMetadata {
            session_id: join.session_id.clone(),
            reconnected: response.reconnected,
            participant_count: response
                .call_state
                .as_ref()
                .and_then(|snapshot| snapshot.participant_count.as_ref())
                .map_or(0, |count| count.total),
            fast_reconnect_deadline_seconds: response.fast_reconnect_deadline_seconds,
        };
        if let Some(timer) = self.handshake_timer.take() {
            timer.abort();
        }
        self.previous_session_id = Some(session.session_id.clone());
        self.apply(ConnectionEvent::HandshakeSucceeded(session));
    }

    fn on_sfu_error(&mut self, event: &ErrorEvent) {
        let (code, message) = event
            .error
            .as_ref()
            .map_or((0, String::new()), |e| (e.code, e.message.clone()));
        let strategy = event.reconnect_strategy();
        let error = ConnectionError::Network { code, message };
        warn!(target: "Sfu/Socket", "SFU error ({strategy:?}): {error}");

        if error.is_unrecoverable() || strategy == ReconnectStrategy::Disconnect {
            error!(target: "Sfu/Socket", "SFU error is unrecoverable, disconnecting");
            self.apply(ConnectionEvent::PermanentFailure(error));
        } else {
            self.handle_failure(error);
        }
    }

    /// Routes a failure of the current connection through the retry policy.
    fn handle_failure(&mut self, error: ConnectionError) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected(_)
        ) {
            debug!(
                target: "Sfu/Socket",
                "Ignoring failure while {}: {error}",
                self.state.name()
            );
            return;
        }
        let was_connected = self.state.is_connected();
        match self.retry.on_failure(&error, was_connected) {
            RetryDecision::RetryNow { attempt } => {
                info!(target: "Sfu/Socket", "Connection lost ({error}), retrying now (attempt {attempt})");
                self.reconnect_delay = Duration::ZERO;
                self.apply(ConnectionEvent::TransientFailure(error));
            }
            RetryDecision::RetryAfter { attempt, delay } => {
                info!(
                    target: "Sfu/Socket",
                    "Connection failed ({error}), retrying in {}ms (attempt {attempt})",
                    delay.as_millis()
                );
                self.reconnect_delay = delay;
                self.apply(ConnectionEvent::TransientFailure(error));
            }
            RetryDecision::GiveUp => {
                if error.is_unrecoverable() {
                    error!(target: "Sfu/Socket", "Unrecoverable connection error: {error}");
                } else {
                    error!(
                        target: "Sfu/Socket",
                        "Giving up after {} reconnect attempts: {error}",
                        self.retry.attempts()
                    );
                }
                self.apply(ConnectionEvent::PermanentFailure(error));
            }
        }
    }

    fn send_join(&self) {
        let Some(join) = &self.join else {
            return;
        };
        let reconnect_details = self.reconnecting.then(|| ReconnectDetails {
            strategy: ReconnectStrategy::Fast as i32,
            previous_session_id: self.previous_session_id.clone().unwrap_or_default(),
            reconnect_attempt: self.retry.attempts(),
        });
        self.queue(
            SfuRequest::Join(JoinRequest {
                token: join.token.clone(),
                session_id: join.session_id.clone(),
                subscriber_sdp: join.subscriber_sdp.clone(),
                client_details: Some(self.config.client_details.clone()),
                reconnect_details,
            }),
            None,
        );
    }

    /// Best-effort goodbye queued ahead of the close.
    fn leave(&self, reason: &str) {
        if let ConnectionState::Connected(session) = &self.state {
            info!(target: "Sfu/Socket", "Leaving call: {reason}");
            self.queue(
                SfuRequest::LeaveCall(LeaveCallRequest {
                    session_id: session.session_id.clone(),
                    reason: reason.to_string(),
                }),
                None,
            );
        }
    }

    fn queue(&self, request: SfuRequest, reply: Option<Reply>) {
        let frame = match codec::encode_request(&request) {
            Ok(frame) => frame,
            Err(e) => return fail(reply, e.into()),
        };
        match &self.link {
            Some(link) => {
                trace!(target: "Sfu/Socket", "--> {}", request.name());
                link.queue(Outbound { frame, reply });
            }
            None => fail(
                reply,
                SocketError::NotConnected {
                    state: self.state.name(),
                },
            ),
        }
    }

    fn shutdown(&mut self) {
        self.health.stop();
        let pending = [
            self.attempt.take(),
            self.reconnect_timer.take(),
            self.handshake_timer.take(),
        ];
        for task in pending.into_iter().flatten() {
            task.abort();
        }
        self.link = None;
        debug!(target: "Sfu/Socket", "Socket actor stopped");
    }
}

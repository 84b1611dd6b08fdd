use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};
use videocore::codec::SfuRequest;
use videocore::listeners::SubscriptionHandle;
use videocore::net::HttpClient;
use videocore::types::call::CallInfoPatch;
use videocore::types::captions::{ClosedCaption, ClosedCaptionEvent};
use videocore::types::events::{Event, EventHandler};
use videocore::{
    CallEvent, CallIdentity, CallInfo, CallState, ConnectionError, ConnectionState,
    SfuCredentials, VideoErrorCode,
};

use crate::call::{CallController, WeakCallController};
use crate::captions::ClosedCaptionManager;
use crate::config::ClientConfig;
use crate::coordinator::{
    CoordinatorApi, CoordinatorClient, CoordinatorError, CreateCallRequest, MemberRequest,
    MuteUsersRequest, QueryMembersRequest, QueryMembersResponse,
};
use crate::dispatch::{AsyncEventHandler, Dispatcher};
use crate::error::{CallError, Result};
use crate::network::NetworkStateProvider;
use crate::socket::{JoinConfig, SfuSocket, SocketConfig};
use crate::transport::TransportFactory;

/// One user's connection to the video service, holding at most one call.
pub struct Client {
    user_id: String,
    coordinator: Arc<dyn CoordinatorApi>,
    dispatcher: Dispatcher,
    calls: CallController,
    socket: SfuSocket,
    captions: ClosedCaptionManager,
    internal_listener: SubscriptionHandle,
}

impl Client {
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: ClientConfig,
        user_id: impl Into<String>,
        coordinator: Arc<dyn CoordinatorApi>,
        transport_factory: Arc<dyn TransportFactory>,
        network: Arc<dyn NetworkStateProvider>,
    ) -> Self {
        let dispatcher = Dispatcher::new();
        let calls = CallController::new(config.ring_timeout(), dispatcher.clone());
        let socket = SfuSocket::new(
            SocketConfig::from(&config),
            transport_factory,
            network,
            dispatcher.clone(),
        );
        let captions = ClosedCaptionManager::new(config.captions.clone(), dispatcher.clone());
        let internal_listener = dispatcher.subscribe(call_driver(calls.downgrade()));

        Self {
            user_id: user_id.into(),
            coordinator,
            dispatcher,
            calls,
            socket,
            captions,
            internal_listener,
        }
    }

    /// Uses the REST coordinator at `config.coordinator_url`.
    pub fn with_http_client(
        config: ClientConfig,
        user_id: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
        transport_factory: Arc<dyn TransportFactory>,
        network: Arc<dyn NetworkStateProvider>,
    ) -> Self {
        let coordinator = Arc::new(CoordinatorClient::from_config(http_client, &config));
        Self::new(config, user_id, coordinator, transport_factory, network)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionHandle {
        self.dispatcher.subscribe(handler)
    }

    pub fn subscribe_async(&self, handler: Arc<dyn AsyncEventHandler>) -> SubscriptionHandle {
        self.dispatcher.subscribe_async(handler)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        handle != self.internal_listener && self.dispatcher.unsubscribe(handle)
    }

    pub fn current_call_state(&self) -> CallState {
        self.calls.state()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.socket.state()
    }

    pub fn socket(&self) -> &SfuSocket {
        &self.socket
    }

    /// Creates (or loads) `call` with `members` and starts ringing them.
    pub async fn ring(&self, call: CallIdentity, members: Vec<String>) -> Result<CallState> {
        let mut request = CreateCallRequest {
            ring: true,
            ..Default::default()
        };
        request.members.push(MemberRequest::new(&self.user_id));
        request.members.extend(
            members
                .into_iter()
                .filter(|id| *id != self.user_id)
                .map(MemberRequest::new),
        );

        let response = self.coordinator.create_or_get_call(&call, request).await?;
        let info = response.call.to_call_info(&response.members, true);
        Ok(self.calls.start_outgoing(info)?)
    }

    /// Registers a ringing call pushed to this user.
    pub fn on_incoming_call(&self, info: CallInfo) -> Result<CallState> {
        Ok(self.calls.receive_invite(info)?)
    }

    /// A callee accepted our outgoing call; joins it.
    pub async fn on_callee_accepted(&self, user_id: &str) -> Result<CallState> {
        self.calls.accepted_by_callee(user_id)?;
        self.calls.apply(CallEvent::JoinRequestSent)?;
        self.complete_join(false, false).await
    }

    pub fn on_call_rejected(&self, user_id: &str) -> Result<CallState> {
        Ok(self.calls.rejected_by(user_id)?)
    }

    pub fn on_call_cancelled(&self, user_id: &str) -> Result<CallState> {
        Ok(self.calls.cancelled_by(user_id)?)
    }

    pub fn on_call_updated(&self, patch: CallInfoPatch) -> Result<CallState> {
        Ok(self.calls.update(patch)?)
    }

    /// Accepts the ringing incoming call and joins it.
    pub async fn accept(&self) -> Result<CallState> {
        let call = self.ringing_call(|state| matches!(state, CallState::Incoming { .. }))?;
        if let Err(e) = self.coordinator.accept_call(&call).await {
            let _ = self.calls.fail(connection_error(&e));
            return Err(e.into());
        }
        self.calls.accept_incoming()?;
        self.complete_join(false, false).await
    }

    /// Joins `call` directly, without ringing anybody.
    pub async fn join(&self, call: CallIdentity, create: bool) -> Result<CallState> {
        self.calls
            .apply(CallEvent::JoinStarted(CallInfo::new(call, &self.user_id)))?;
        self.complete_join(create, false).await
    }

    /// Declines the ringing incoming call.
    pub async fn decline(&self) -> Result<CallState> {
        let call = self.ringing_call(|state| matches!(state, CallState::Incoming { .. }))?;
        if let Err(e) = self.coordinator.reject_call(&call).await {
            warn!(target: "Call/State", "Failed to report rejection of {call}: {e}");
        }
        Ok(self.calls.rejected_by(&self.user_id)?)
    }

    /// Stops ringing our outgoing call.
    pub async fn cancel(&self) -> Result<CallState> {
        let call = self.ringing_call(|state| matches!(state, CallState::Outgoing { .. }))?;
        if let Err(e) = self.coordinator.reject_call(&call).await {
            warn!(target: "Call/State", "Failed to report cancellation of {call}: {e}");
        }
        Ok(self.calls.cancelled_by(&self.user_id)?)
    }

    /// Leaves the current call; other participants stay.
    pub async fn leave(&self) -> Result<CallState> {
        if !self.calls.state().is_active() {
            return Err(CallError::NoActiveCall);
        }
        self.socket.disconnect("user is leaving the call").await;
        self.captions.clear();
        Ok(self.calls.end()?)
    }

    /// Ends the call for everybody, then leaves it.
    pub async fn end_call(&self) -> Result<CallState> {
        let call = self.active_call()?;
        self.coordinator.end_call(&call).await?;
        self.leave().await
    }

    /// Returns a dropped call to `Idle` so a new one can start.
    pub fn reset_call(&self) -> Result<CallState> {
        self.captions.clear();
        Ok(self.calls.reset()?)
    }

    pub async fn send(&self, request: SfuRequest) -> Result<()> {
        Ok(self.socket.send(request).await?)
    }

    pub async fn send_user_event(&self, custom: BTreeMap<String, serde_json::Value>) -> Result<()> {
        let call = self.active_call()?;
        Ok(self.coordinator.send_user_event(&call, custom).await?)
    }

    pub async fn query_members(&self, request: QueryMembersRequest) -> Result<QueryMembersResponse> {
        let call = self.active_call()?;
        Ok(self.coordinator.query_members(&call, request).await?)
    }

    pub async fn mute_users(&self, request: MuteUsersRequest) -> Result<()> {
        let call = self.active_call()?;
        Ok(self.coordinator.mute_users(&call, request).await?)
    }

    pub fn handle_caption_event(&self, event: ClosedCaptionEvent) {
        self.captions.handle_event(event);
    }

    pub fn captions(&self) -> Vec<ClosedCaption> {
        self.captions.captions()
    }

    pub fn on_network_lost(&self) {
        self.socket.on_network_lost();
    }

    pub fn on_network_available(&self) {
        self.socket.on_network_available();
    }

    /// Coordinator join, then the SFU join request. The call ends up in
    /// `Connecting`; the SFU's join response moves it to `ConnectedToSfu`.
    async fn complete_join(&self, create: bool, ring: bool) -> Result<CallState> {
        let call = self.active_call()?;
        let response = match self.coordinator.join_call(&call, create, ring).await {
            Ok(response) => response,
            Err(e) => {
                let _ = self.calls.fail(connection_error(&e));
                return Err(e.into());
            }
        };

        let joined = response.call.to_call_info(&response.members, ring);
        self.calls.update(CallInfoPatch {
            broadcasting_enabled: Some(joined.broadcasting_enabled),
            recording_enabled: Some(joined.recording_enabled),
            updated_at: joined.updated_at,
            users: Some(joined.users),
            call_details: Some(joined.call_details),
            custom: Some(joined.custom),
        })?;

        let sfu = SfuCredentials::from(response.credentials);
        self.calls.apply(CallEvent::CoordinatorJoined(sfu.clone()))?;

        let session_id = new_session_id();
        let state = self.calls.apply(CallEvent::SfuJoinRequestSent {
            sfu_session_id: session_id.clone(),
        })?;
        info!(target: "Call/State", "Joining {call} on {} as session {session_id}", sfu.call_url);
        self.socket.connect(JoinConfig {
            url: sfu.call_url,
            token: sfu.sfu_token,
            session_id,
            subscriber_sdp: String::new(),
        });
        Ok(state)
    }

    fn active_call(&self) -> Result<CallIdentity> {
        let state = self.calls.state();
        match state.info() {
            Some(info) => Ok(info.call.clone()),
            None => Err(CallError::NoActiveCall),
        }
    }

    fn ringing_call(&self, expected: impl Fn(&CallState) -> bool) -> Result<CallIdentity> {
        let state = self.calls.state();
        if !expected(&state) {
            return Err(CallError::NoActiveCall);
        }
        self.active_call()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.dispatcher.unsubscribe(self.internal_listener);
    }
}

/// Keeps the call state in step with the signaling connection.
fn call_driver(calls: WeakCallController) -> Arc<dyn EventHandler> {
    Arc::new(move |event: &Event| -> anyhow::Result<()> {
        let Some(calls) = calls.upgrade() else {
            return Ok(());
        };
        match event {
            Event::Sfu(sfu_event) => calls.on_sfu_event(sfu_event),
            Event::ConnectionStateChanged(ConnectionState::DisconnectedPermanently(error)) => {
                if calls.state().is_active() {
                    let _ = calls.fail(error.clone());
                }
            }
            Event::ConnectionStateChanged(ConnectionState::Connecting) => {
                // The socket is re-sending the join request for the same session.
                if let CallState::ConnectedToSfu { sfu_session_id, .. } = calls.state() {
                    let _ = calls.apply(CallEvent::SfuJoinRequestSent { sfu_session_id });
                }
            }
            _ => {}
        }
        Ok(())
    })
}

fn connection_error(error: &CoordinatorError) -> ConnectionError {
    match error {
        CoordinatorError::Api(api) => ConnectionError::Api(api.clone()),
        other => ConnectionError::network(VideoErrorCode::NetworkFailed, other.to_string()),
    }
}

fn new_session_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use video_client::coordinator::{
    CallResponse, CoordinatorApi, CoordinatorError, CreateCallRequest, Credentials,
    EdgeServerResponse, GetOrCreateCallResponse, JoinCallResponse, MemberResponse,
    MuteUsersRequest, QueryMembersRequest, QueryMembersResponse, SfuServer, UserResponse,
};
use video_client::network::SharedNetworkState;
use video_client::videocore::codec::{
    JoinResponse, SfuDataEvent, SfuRequest, decode_request, encode_event,
};
use video_client::videocore::net::{Transport, TransportEvent, TransportFactory};
use video_client::videocore::types::captions::{ClosedCaption, ClosedCaptionEvent};
use video_client::videocore::{CallIdentity, CallState, ConnectionState, DropReason};
use video_client::{CallError, Client, ClientConfig, Event};

type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Answers every SFU join request with a join response.
struct EchoSfu {
    events: mpsc::Sender<TransportEvent>,
    requests: Mutex<Vec<SfuRequest>>,
}

#[async_trait]
impl Transport for EchoSfu {
    async fn send(&self, data: &[u8]) -> Result<(), anyhow::Error> {
        let request = decode_request(data)?;
        if let SfuRequest::Join(_) = request {
            let frame = encode_event(&SfuDataEvent::JoinResponse(JoinResponse::default()))?;
            let _ = self
                .events
                .try_send(TransportEvent::DataReceived(Bytes::from(frame)));
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }

    async fn disconnect(&self) {}
}

#[derive(Default)]
struct EchoSfuFactory {
    opened: Mutex<Vec<(String, Arc<EchoSfu>)>>,
}

#[async_trait]
impl TransportFactory for EchoSfuFactory {
    async fn create_transport(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        let (tx, rx) = mpsc::channel(32);
        let sfu = Arc::new(EchoSfu {
            events: tx.clone(),
            requests: Mutex::new(Vec::new()),
        });
        self.opened.lock().unwrap().push((url.to_string(), sfu.clone()));
        tx.try_send(TransportEvent::Connected)?;
        Ok((sfu, rx))
    }
}

#[derive(Default)]
struct FakeCoordinator {
    calls: Mutex<Vec<String>>,
}

impl FakeCoordinator {
    fn record(&self, what: &str) {
        self.calls.lock().unwrap().push(what.to_string());
    }

    fn call(call: &CallIdentity) -> CallResponse {
        CallResponse {
            call_type: call.call_type().to_string(),
            id: call.id().to_string(),
            created_by: UserResponse {
                id: "alice".to_string(),
                ..Default::default()
            },
            recording: false,
            broadcasting: false,
            captioning: false,
            created_at: None,
            updated_at: None,
            ended_at: None,
            custom: BTreeMap::new(),
        }
    }

    fn members() -> Vec<MemberResponse> {
        ["alice", "bob"]
            .into_iter()
            .map(|id| MemberResponse {
                user_id: id.to_string(),
                ..Default::default()
            })
            .collect()
    }

    fn credentials() -> Credentials {
        Credentials {
            server: SfuServer {
                url: "wss://edge1".to_string(),
                ws_endpoint: String::new(),
                edge_name: "edge1".to_string(),
            },
            token: "tok".to_string(),
            ice_servers: Vec::new(),
        }
    }
}

#[async_trait]
impl CoordinatorApi for FakeCoordinator {
    async fn create_or_get_call(
        &self,
        call: &CallIdentity,
        request: CreateCallRequest,
    ) -> CoordinatorResult<GetOrCreateCallResponse> {
        self.record(&format!("create ring={}", request.ring));
        Ok(GetOrCreateCallResponse {
            call: Self::call(call),
            members: Self::members(),
            created: true,
        })
    }

    async fn join_call(
        &self,
        call: &CallIdentity,
        create: bool,
        _ring: bool,
    ) -> CoordinatorResult<JoinCallResponse> {
        self.record(&format!("join create={create}"));
        Ok(JoinCallResponse {
            call: Self::call(call),
            members: Self::members(),
            credentials: Self::credentials(),
            created: create,
        })
    }

    async fn select_edge_server(
        &self,
        _call: &CallIdentity,
        _latencies: HashMap<String, Vec<f64>>,
    ) -> CoordinatorResult<EdgeServerResponse> {
        Ok(EdgeServerResponse {
            credentials: Self::credentials(),
        })
    }

    async fn send_user_event(
        &self,
        _call: &CallIdentity,
        _custom: BTreeMap<String, serde_json::Value>,
    ) -> CoordinatorResult<()> {
        self.record("event");
        Ok(())
    }

    async fn query_members(
        &self,
        _call: &CallIdentity,
        _request: QueryMembersRequest,
    ) -> CoordinatorResult<QueryMembersResponse> {
        Ok(QueryMembersResponse {
            members: Self::members(),
            next: None,
        })
    }

    async fn mute_users(
        &self,
        _call: &CallIdentity,
        _request: MuteUsersRequest,
    ) -> CoordinatorResult<()> {
        self.record("mute");
        Ok(())
    }

    async fn accept_call(&self, _call: &CallIdentity) -> CoordinatorResult<()> {
        self.record("accept");
        Ok(())
    }

    async fn reject_call(&self, _call: &CallIdentity) -> CoordinatorResult<()> {
        self.record("reject");
        Ok(())
    }

    async fn end_call(&self, _call: &CallIdentity) -> CoordinatorResult<()> {
        self.record("end");
        Ok(())
    }
}

struct Setup {
    client: Client,
    coordinator: Arc<FakeCoordinator>,
    factory: Arc<EchoSfuFactory>,
    events: Arc<Mutex<Vec<String>>>,
}

fn setup(config: ClientConfig) -> Setup {
    let coordinator = Arc::new(FakeCoordinator::default());
    let factory = Arc::new(EchoSfuFactory::default());
    let client = Client::new(
        config,
        "alice",
        coordinator.clone(),
        factory.clone(),
        Arc::new(SharedNetworkState::default()),
    );
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    client.subscribe(Arc::new(move |event: &Event| -> anyhow::Result<()> {
        let line = match event {
            Event::CallStateChanged(state) => format!("call:{}", state.name()),
            Event::ConnectionStateChanged(state) => format!("socket:{}", state.name()),
            Event::Sfu(sfu) => format!("sfu:{}", sfu.name()),
            Event::ClosedCaptionsUpdated(list) => format!("captions:{}", list.len()),
        };
        sink.lock().unwrap().push(line);
        Ok(())
    }));
    Setup {
        client,
        coordinator,
        factory,
        events,
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn ring_then_callee_accepts_connects_to_sfu() {
    let s = setup(ClientConfig::new("key", "jwt"));
    let call = CallIdentity::new("default", "standup");

    let outgoing = s
        .client
        .ring(call.clone(), vec!["bob".to_string()])
        .await
        .unwrap();
    assert!(outgoing.is_ringing());
    assert_eq!(outgoing.info().unwrap().callees().collect::<Vec<_>>(), vec!["bob"]);

    s.client.on_callee_accepted("bob").await.unwrap();
    wait_until(|| matches!(s.client.current_call_state(), CallState::ConnectedToSfu { .. })).await;

    assert!(s.client.connection_state().is_connected());
    let opened = s.factory.opened.lock().unwrap();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, "wss://edge1");
    let join = opened[0].1.requests.lock().unwrap()[0].clone();
    match join {
        SfuRequest::Join(join) => {
            assert_eq!(join.token, "tok");
            assert!(join.reconnect_details.is_none());
            assert_eq!(
                Some(join.session_id.as_str()),
                s.client.current_call_state().sfu_session_id()
            );
        }
        other => panic!("expected join request, got {other:?}"),
    }
    assert_eq!(
        *s.coordinator.calls.lock().unwrap(),
        vec!["create ring=true", "join create=false"]
    );
}

#[tokio::test(start_paused = true)]
async fn unanswered_ring_times_out() {
    let mut config = ClientConfig::new("key", "jwt");
    config.ring_timeout_ms = 5_000;
    let s = setup(config);
    s.client
        .ring(CallIdentity::new("default", "c1"), vec!["bob".to_string()])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(matches!(
        s.client.current_call_state(),
        CallState::Drop {
            reason: DropReason::Timeout { wait_millis: 5_000 },
            ..
        }
    ));
    assert!(s.factory.opened.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn end_call_reports_and_disconnects() {
    let s = setup(ClientConfig::new("key", "jwt"));
    s.client
        .join(CallIdentity::new("default", "c1"), true)
        .await
        .unwrap();
    wait_until(|| matches!(s.client.current_call_state(), CallState::ConnectedToSfu { .. })).await;

    s.client.end_call().await.unwrap();
    assert_eq!(s.client.connection_state(), ConnectionState::DisconnectedByRequest);
    assert!(matches!(
        s.client.current_call_state(),
        CallState::Drop {
            reason: DropReason::Ended,
            ..
        }
    ));
    assert_eq!(
        *s.coordinator.calls.lock().unwrap(),
        vec!["join create=true", "end"]
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    let events = s.events.lock().unwrap().clone();
    let connected = events.iter().position(|e| e == "socket:Connected").unwrap();
    let join_response = events.iter().position(|e| e == "sfu:JoinResponse").unwrap();
    assert!(connected < join_response);
    assert_eq!(events.last().map(String::as_str), Some("call:Drop"));
}

#[tokio::test(start_paused = true)]
async fn coordinator_operations_need_an_active_call() {
    let s = setup(ClientConfig::new("key", "jwt"));
    assert!(matches!(
        s.client.mute_users(MuteUsersRequest::default()).await,
        Err(CallError::NoActiveCall)
    ));

    s.client
        .join(CallIdentity::new("default", "c1"), false)
        .await
        .unwrap();
    s.client
        .mute_users(MuteUsersRequest {
            user_ids: vec!["bob".to_string()],
            audio: true,
            ..Default::default()
        })
        .await
        .unwrap();
    s.client.send_user_event(BTreeMap::new()).await.unwrap();
    let members = s
        .client
        .query_members(QueryMembersRequest::default())
        .await
        .unwrap();
    assert_eq!(members.members.len(), 2);
    assert_eq!(
        *s.coordinator.calls.lock().unwrap(),
        vec!["join create=false", "mute", "event"]
    );
}

#[tokio::test(start_paused = true)]
async fn captions_flow_through_client_and_clear_on_leave() {
    let s = setup(ClientConfig::new("key", "jwt"));
    s.client
        .join(CallIdentity::new("default", "c1"), false)
        .await
        .unwrap();

    let start = chrono::Utc::now();
    s.client.handle_caption_event(ClosedCaptionEvent::Caption(ClosedCaption {
        speaker_id: "bob".to_string(),
        text: "hello".to_string(),
        start_time: start,
        end_time: start,
    }));
    assert_eq!(s.client.captions().len(), 1);

    s.client.leave().await.unwrap();
    assert!(s.client.captions().is_empty());
}

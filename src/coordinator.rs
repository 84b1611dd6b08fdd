//! Call-management REST client.
//!
//! Every operation is a single JSON request against
//! `{base_url}/video/...?api_key=...`, authenticated with the user's JWT.
//! Non-2xx responses are parsed into [`ApiError`] when the body carries one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use videocore::net::{HttpClient, HttpRequest, HttpResponse};
use videocore::types::call::{CallDetails, CallUser, IceServer};
use videocore::{ApiError, CallIdentity, CallInfo, SfuCredentials};

use crate::config::ClientConfig;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Api(ApiError),
    #[error("unexpected HTTP status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CoordinatorError {
    /// Whether retrying the same request may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Api(err) => err.is_retriable(),
            Self::Http { status, .. } => *status >= 500,
            Self::Transport(_) => true,
            Self::Decode(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemberResponse {
    pub user_id: String,
    #[serde(default)]
    pub user: Option<UserResponse>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemberResponse {
    fn to_call_user(&self) -> CallUser {
        let user = self.user.clone().unwrap_or_default();
        CallUser {
            user_id: self.user_id.clone(),
            name: user.name.unwrap_or_default(),
            role: self.role.clone().unwrap_or(user.role),
            image_url: user.image.unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    #[serde(rename = "type")]
    pub call_type: String,
    pub id: String,
    pub created_by: UserResponse,
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub broadcasting: bool,
    #[serde(default)]
    pub captioning: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl CallResponse {
    pub fn identity(&self) -> CallIdentity {
        CallIdentity::new(&self.call_type, &self.id)
    }

    /// Builds the call-state snapshot from this call and its members.
    pub fn to_call_info(&self, members: &[MemberResponse], ring: bool) -> CallInfo {
        let mut info = CallInfo::new(self.identity(), &self.created_by.id);
        info.recording_enabled = self.recording;
        info.broadcasting_enabled = self.broadcasting;
        info.created_at = self.created_at;
        info.updated_at = self.updated_at;
        info.custom = self.custom.clone();
        info.users = members
            .iter()
            .map(|m| (m.user_id.clone(), m.to_call_user()))
            .collect();
        info.call_details = CallDetails {
            member_user_ids: members.iter().map(|m| m.user_id.clone()).collect(),
            members: info.users.clone(),
            ring,
            owner_user_id: Some(self.created_by.id.clone()),
        };
        info
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetOrCreateCallResponse {
    pub call: CallResponse,
    #[serde(default)]
    pub members: Vec<MemberResponse>,
    #[serde(default)]
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SfuServer {
    pub url: String,
    #[serde(default)]
    pub ws_endpoint: String,
    #[serde(default)]
    pub edge_name: String,
}

impl SfuServer {
    /// The signaling socket URL; `url` when no dedicated endpoint is given.
    pub fn socket_url(&self) -> &str {
        if self.ws_endpoint.is_empty() {
            &self.url
        } else {
            &self.ws_endpoint
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub server: SfuServer,
    pub token: String,
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
}

impl From<Credentials> for SfuCredentials {
    fn from(credentials: Credentials) -> Self {
        SfuCredentials {
            call_url: credentials.server.socket_url().to_string(),
            sfu_token: credentials.token,
            ice_servers: credentials.ice_servers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinCallResponse {
    pub call: CallResponse,
    #[serde(default)]
    pub members: Vec<MemberResponse>,
    pub credentials: Credentials,
    #[serde(default)]
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EdgeServerResponse {
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryMembersResponse {
    #[serde(default)]
    pub members: Vec<MemberResponse>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MemberRequest {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl MemberRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CreateCallRequest {
    pub members: Vec<MemberRequest>,
    pub ring: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MuteUsersRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub user_ids: Vec<String>,
    pub mute_all_users: bool,
    pub audio: bool,
    pub video: bool,
    pub screenshare: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct QueryMembersRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_conditions: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Operations the call controller needs from the coordinator.
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    async fn create_or_get_call(
        &self,
        call: &CallIdentity,
        request: CreateCallRequest,
    ) -> Result<GetOrCreateCallResponse>;

    async fn join_call(&self, call: &CallIdentity, create: bool, ring: bool)
    -> Result<JoinCallResponse>;

    /// `latencies` maps candidate edge URLs to measured round trips in seconds.
    async fn select_edge_server(
        &self,
        call: &CallIdentity,
        latencies: HashMap<String, Vec<f64>>,
    ) -> Result<EdgeServerResponse>;

    async fn send_user_event(
        &self,
        call: &CallIdentity,
        custom: BTreeMap<String, serde_json::Value>,
    ) -> Result<()>;

    async fn query_members(
        &self,
        call: &CallIdentity,
        request: QueryMembersRequest,
    ) -> Result<QueryMembersResponse>;

    async fn mute_users(&self, call: &CallIdentity, request: MuteUsersRequest) -> Result<()>;

    async fn accept_call(&self, call: &CallIdentity) -> Result<()>;

    async fn reject_call(&self, call: &CallIdentity) -> Result<()>;

    async fn end_call(&self, call: &CallIdentity) -> Result<()>;
}

pub struct CoordinatorClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    user_token: String,
}

impl CoordinatorClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        user_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            user_token: user_token.into(),
        }
    }

    pub fn from_config(http: Arc<dyn HttpClient>, config: &ClientConfig) -> Self {
        Self::new(
            http,
            &config.coordinator_url,
            &config.api_key,
            &config.user_token,
        )
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/video/{}?api_key={}",
            self.base_url,
            path,
            urlencoding::encode(&self.api_key)
        )
    }

    fn call_url(&self, call: &CallIdentity, action: Option<&str>) -> String {
        let mut path = format!(
            "call/{}/{}",
            urlencoding::encode(call.call_type()),
            urlencoding::encode(call.id())
        );
        if let Some(action) = action {
            path.push('/');
            path.push_str(action);
        }
        self.url(&path)
    }

    fn request<B>(&self, url: String, body: &B) -> Result<HttpRequest>
    where
        B: Serialize + ?Sized,
    {
        Ok(HttpRequest::post(url)
            .with_header("Authorization", &self.user_token)
            .with_header("stream-auth-type", "jwt")
            .with_header("Content-Type", "application/json")
            .with_body(serde_json::to_vec(body)?))
    }

    async fn post<B, T>(&self, url: String, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Send,
    {
        let request = self.request(url, body)?;
        let response = self.execute(request).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// For endpoints whose response body carries nothing the client uses.
    async fn post_unit<B>(&self, url: String, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let request = self.request(url, body)?;
        self.execute(request).await.map(|_| ())
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(target: "Coordinator", "{} {}", request.method, request.url);
        let response = self
            .http
            .execute(request)
            .await
            .map_err(CoordinatorError::Transport)?;
        if response.is_success() {
            return Ok(response);
        }
        let error = error_from_response(&response);
        warn!(target: "Coordinator", "Request failed: {error}");
        Err(error)
    }
}

/// Maps a non-2xx response to the typed API error when the body has one.
pub fn error_from_response(response: &HttpResponse) -> CoordinatorError {
    match serde_json::from_slice::<ApiError>(&response.body) {
        Ok(err) => CoordinatorError::Api(err),
        Err(_) => CoordinatorError::Http {
            status: response.status_code,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        },
    }
}

#[derive(Serialize)]
struct GetOrCreateBody<'a> {
    data: &'a CreateCallRequest,
    ring: bool,
}

#[derive(Serialize)]
struct JoinBody {
    create: bool,
    ring: bool,
    location: &'static str,
}

#[derive(Serialize)]
struct EdgeBody {
    latency_measurements: HashMap<String, Vec<f64>>,
}

#[derive(Serialize)]
struct UserEventBody {
    custom: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize)]
struct QueryMembersBody<'a> {
    #[serde(rename = "type")]
    call_type: &'a str,
    id: &'a str,
    #[serde(flatten)]
    query: QueryMembersRequest,
}

#[derive(Serialize)]
struct Empty {}

#[async_trait]
impl CoordinatorApi for CoordinatorClient {
    async fn create_or_get_call(
        &self,
        call: &CallIdentity,
        request: CreateCallRequest,
    ) -> Result<GetOrCreateCallResponse> {
        let body = GetOrCreateBody {
            ring: request.ring,
            data: &request,
        };
        self.post(self.call_url(call, None), &body).await
    }

    async fn join_call(
        &self,
        call: &CallIdentity,
        create: bool,
        ring: bool,
    ) -> Result<JoinCallResponse> {
        let body = JoinBody {
            create,
            ring,
            location: "auto",
        };
        self.post(self.call_url(call, Some("join")), &body).await
    }

    async fn select_edge_server(
        &self,
        call: &CallIdentity,
        latencies: HashMap<String, Vec<f64>>,
    ) -> Result<EdgeServerResponse> {
        let body = EdgeBody {
            latency_measurements: latencies,
        };
        self.post(self.call_url(call, Some("get_edge_server")), &body)
            .await
    }

    async fn send_user_event(
        &self,
        call: &CallIdentity,
        custom: BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        self.post_unit(self.call_url(call, Some("event")), &UserEventBody { custom })
            .await
    }

    async fn query_members(
        &self,
        call: &CallIdentity,
        request: QueryMembersRequest,
    ) -> Result<QueryMembersResponse> {
        let body = QueryMembersBody {
            call_type: call.call_type(),
            id: call.id(),
            query: request,
        };
        self.post(self.url("call/members"), &body).await
    }

    async fn mute_users(&self, call: &CallIdentity, request: MuteUsersRequest) -> Result<()> {
        self.post_unit(self.call_url(call, Some("mute_users")), &request)
            .await
    }

    async fn accept_call(&self, call: &CallIdentity) -> Result<()> {
        self.post_unit(self.call_url(call, Some("accept")), &Empty {})
            .await
    }

    async fn reject_call(&self, call: &CallIdentity) -> Result<()> {
        self.post_unit(self.call_url(call, Some("reject")), &Empty {})
            .await
    }

    async fn end_call(&self, call: &CallIdentity) -> Result<()> {
        self.post_unit(self.call_url(call, Some("mark_ended")), &Empty {})
            .await
    }
}

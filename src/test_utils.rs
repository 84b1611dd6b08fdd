use std::collections::VecDeque;
use std::sync::Mutex;

use videocore::net::{HttpClient, HttpRequest, HttpResponse};

enum Scripted {
    Respond(HttpResponse),
    Fail(String),
}

/// Answers requests from a FIFO script and records every request.
/// With the script exhausted it answers `200 {}`.
#[derive(Default)]
pub struct MockHttpClient {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status_code: u16, body: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Respond(HttpResponse {
                status_code,
                body: body.as_bytes().to_vec(),
            }));
    }

    pub fn fail(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        self.requests.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(HttpResponse {
                status_code: 200,
                body: b"{}".to_vec(),
            }),
        }
    }
}

/// A `join` response pointing at `call_url` with SFU token `tok`.
pub fn join_response_json(call_type: &str, id: &str, creator: &str, call_url: &str) -> String {
    serde_json::json!({
        "call": {"type": call_type, "id": id, "created_by": {"id": creator}},
        "members": [{"user_id": creator}],
        "credentials": {
            "server": {"url": call_url, "edge_name": "edge-test"},
            "token": "tok",
            "ice_servers": [{"urls": ["stun:stun.test:3478"]}]
        }
    })
    .to_string()
}

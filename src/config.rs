use std::time::Duration;

use serde::{Deserialize, Serialize};
use videocore::retry::RetryConfig;

use crate::captions::ClosedCaptionsSettings;
use crate::health::HealthConfig;

pub const DEFAULT_COORDINATOR_URL: &str = "https://video.stream-io-api.com";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub coordinator_url: String,
    pub api_key: String,
    pub user_token: String,
    pub retry: RetryConfig,
    pub health: HealthConfig,
    /// How long an outgoing or incoming call rings before it is dropped.
    pub ring_timeout_ms: u64,
    /// Upper bound between opening the SFU socket and its join response.
    pub connect_timeout_ms: u64,
    /// Consecutive undecodable frames tolerated before reconnecting.
    pub decode_error_threshold: u32,
    pub captions: ClosedCaptionsSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            coordinator_url: DEFAULT_COORDINATOR_URL.to_string(),
            api_key: String::new(),
            user_token: String::new(),
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            ring_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            decode_error_threshold: 5,
            captions: ClosedCaptionsSettings::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, user_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            user_token: user_token.into(),
            ..Default::default()
        }
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_millis(self.ring_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConnectionError;

pub const MAX_RETRIES_CEILING: u32 = 15;
pub const RETRY_INTERVAL_CEILING_MS: u64 = 10_000;

/// Retry settings for the signaling connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, retry_interval_ms: u64) -> Self {
        Self {
            max_retries,
            retry_interval_ms,
        }
    }

    /// Clamps both values to their ceilings, warning for each one that was
    /// out of range.
    pub fn guarded(self) -> Self {
        let mut guarded = self;
        if self.max_retries > MAX_RETRIES_CEILING {
            warn!(
                target: "Sfu/Retry",
                "max_retries {} exceeds the ceiling, using {}",
                self.max_retries, MAX_RETRIES_CEILING
            );
            guarded.max_retries = MAX_RETRIES_CEILING;
        }
        if self.retry_interval_ms > RETRY_INTERVAL_CEILING_MS {
            warn!(
                target: "Sfu/Retry",
                "retry_interval_ms {} exceeds the ceiling, using {}",
                self.retry_interval_ms, RETRY_INTERVAL_CEILING_MS
            );
            guarded.retry_interval_ms = RETRY_INTERVAL_CEILING_MS;
        }
        guarded
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect without waiting. Used for the first attempt after an
    /// established session dropped.
    RetryNow { attempt: u32 },
    RetryAfter { attempt: u32, delay: Duration },
    GiveUp,
}

/// Counts reconnect attempts and decides what to do after each failure.
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    config: RetryConfig,
    attempts: u32,
}

impl ReconnectionPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: config.guarded(),
            attempts: 0,
        }
    }

    pub fn config(&self) -> RetryConfig {
        self.config
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// `was_connected` is true when the failure ended an established session
    /// rather than a connect attempt.
    pub fn on_failure(&mut self, error: &ConnectionError, was_connected: bool) -> RetryDecision {
        if error.is_unrecoverable() {
            return RetryDecision::GiveUp;
        }
        if self.attempts >= self.config.max_retries {
            return RetryDecision::GiveUp;
        }
        self.attempts += 1;
        if was_connected && self.attempts == 1 {
            RetryDecision::RetryNow {
                attempt: self.attempts,
            }
        } else {
            RetryDecision::RetryAfter {
                attempt: self.attempts,
                delay: self.config.retry_interval(),
            }
        }
    }

    pub fn on_connected(&mut self) {
        self.attempts = 0;
    }
}

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error codes returned by the coordinator API.
///
/// Codes added on the server after this client shipped deserialize into
/// [`ApiErrorCode::Unknown`] and serialize back to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ApiErrorCode {
    InternalError,
    AccessKeyError,
    InputError,
    AuthFailed,
    DuplicateUsername,
    RateLimited,
    NotFound,
    NotAllowed,
    EventNotSupported,
    ChannelFeatureNotSupported,
    MessageTooLong,
    MultipleNestingLevel,
    PayloadTooBig,
    ExpiredToken,
    TokenNotValidYet,
    TokenUsedBeforeIat,
    InvalidTokenSignature,
    CustomCommandEndpointMissing,
    CustomCommandEndpointCallError,
    ConnectionIdNotFound,
    CoolDown,
    QueryChannelPermissionsMismatch,
    TooManyConnections,
    NotSupportedInPushV1,
    AppSuspended,
    VideoProviderNotConfigured,
    VideoInvalidCallId,
    VideoCreateCallFailed,
    VideoNoDatacentersAvailable,
    VideoJoinCallFailure,
    QueryCallsPermissionsMismatch,
    Unknown(String),
}

impl ApiErrorCode {
    const TABLE: &'static [(&'static str, ApiErrorCode)] = &[
        ("internal-error", Self::InternalError),
        ("access-key-error", Self::AccessKeyError),
        ("input-error", Self::InputError),
        ("auth-failed", Self::AuthFailed),
        ("duplicate-username", Self::DuplicateUsername),
        ("rate-limited", Self::RateLimited),
        ("not-found", Self::NotFound),
        ("not-allowed", Self::NotAllowed),
        ("event-not-supported", Self::EventNotSupported),
        ("channel-feature-not-supported", Self::ChannelFeatureNotSupported),
        ("message-too-long", Self::MessageTooLong),
        ("multiple-nesting-level", Self::MultipleNestingLevel),
        ("payload-too-big", Self::PayloadTooBig),
        ("expired-token", Self::ExpiredToken),
        ("token-not-valid-yet", Self::TokenNotValidYet),
        ("token-used-before-iat", Self::TokenUsedBeforeIat),
        ("invalid-token-signature", Self::InvalidTokenSignature),
        ("custom-command-endpoint-missing", Self::CustomCommandEndpointMissing),
        ("custom-command-endpoint-call-error", Self::CustomCommandEndpointCallError),
        ("connection-id-not-found", Self::ConnectionIdNotFound),
        ("cool-down", Self::CoolDown),
        ("query-channel-permissions-mismatch", Self::QueryChannelPermissionsMismatch),
        ("too-many-connections", Self::TooManyConnections),
        ("not-supported-in-push-v1", Self::NotSupportedInPushV1),
        ("app-suspended", Self::AppSuspended),
        ("video-provider-not-configured", Self::VideoProviderNotConfigured),
        ("video-invalid-call-id", Self::VideoInvalidCallId),
        ("video-create-call-failed", Self::VideoCreateCallFailed),
        ("video-no-datacenters-available", Self::VideoNoDatacentersAvailable),
        ("video-join-call-failure", Self::VideoJoinCallFailure),
        ("query-calls-permissions-mismatch", Self::QueryCallsPermissionsMismatch),
    ];

    pub fn as_str(&self) -> &str {
        if let Self::Unknown(raw) = self {
            return raw;
        }
        Self::TABLE
            .iter()
            .find(|(_, code)| code == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    pub fn parse(value: &str) -> Self {
        Self::TABLE
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, code)| code.clone())
            .unwrap_or_else(|| Self::Unknown(value.to_string()))
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ApiErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ApiErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Failure reported by the coordinator API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("API error {status_code} ({code}): {message}")]
pub struct ApiError {
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    pub code: ApiErrorCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Vec<i32>,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub more_info: String,
    /// Set by the server. An absent flag is treated as unrecoverable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unrecoverable: Option<bool>,
}

impl ApiError {
    pub fn new(status_code: u16, code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code,
            message: message.into(),
            details: Vec::new(),
            duration: String::new(),
            more_info: String::new(),
            unrecoverable: None,
        }
    }

    pub fn with_unrecoverable(mut self, unrecoverable: bool) -> Self {
        self.unrecoverable = Some(unrecoverable);
        self
    }

    pub fn is_unrecoverable(&self) -> bool {
        self.unrecoverable.unwrap_or(true)
    }

    /// Inverse of [`Self::is_unrecoverable`].
    pub fn is_retriable(&self) -> bool {
        !self.is_unrecoverable()
    }
}

/// Client-side socket error codes. The SFU reports errors in the same code
/// space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum VideoErrorCode {
    ApiKeyNotFound = 2,
    ValidationError = 4,
    AuthenticationError = 5,
    TokenExpired = 40,
    NetworkFailed = 1000,
    ParserError = 1001,
    SocketClosed = 1002,
    SocketFailure = 1003,
    CantParseEvent = 1005,
    InvalidToken = 1006,
    UndefinedToken = 1007,
}

impl VideoErrorCode {
    pub const ALL: &'static [VideoErrorCode] = &[
        Self::ApiKeyNotFound,
        Self::ValidationError,
        Self::AuthenticationError,
        Self::TokenExpired,
        Self::NetworkFailed,
        Self::ParserError,
        Self::SocketClosed,
        Self::SocketFailure,
        Self::CantParseEvent,
        Self::InvalidToken,
        Self::UndefinedToken,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Codes after which reconnecting with the same credentials cannot succeed.
    pub fn is_unrecoverable(self) -> bool {
        matches!(
            self,
            Self::UndefinedToken
                | Self::InvalidToken
                | Self::ApiKeyNotFound
                | Self::ValidationError
                | Self::SocketClosed
        )
    }
}

/// Why the signaling connection is not (or no longer) usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("socket error {code}: {message}")]
    Network { code: i32, message: String },
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ConnectionError {
    pub fn network(code: VideoErrorCode, message: impl Into<String>) -> Self {
        Self::Network {
            code: code.code(),
            message: message.into(),
        }
    }

    pub fn is_unrecoverable(&self) -> bool {
        match self {
            Self::Network { code, .. } => {
                VideoErrorCode::from_code(*code).is_some_and(VideoErrorCode::is_unrecoverable)
            }
            Self::Api(err) => err.is_unrecoverable(),
        }
    }
}

/// A state machine was asked to handle an event that has no transition from
/// its current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition from {from} on {event}")]
pub struct InvalidTransition {
    pub from: String,
    pub event: String,
}

impl InvalidTransition {
    pub fn new(from: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            event: event.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_code_round_trips() {
        let json = r#"{"StatusCode":400,"code":"video-brand-new-thing","message":"nope"}"#;
        let err: ApiError = serde_json::from_str(json).unwrap();
        assert_eq!(
            err.code,
            ApiErrorCode::Unknown("video-brand-new-thing".to_string())
        );
        let back = serde_json::to_value(&err).unwrap();
        assert_eq!(back["code"], "video-brand-new-thing");
    }

    #[test]
    fn test_known_codes_parse() {
        for (name, code) in ApiErrorCode::TABLE {
            assert_eq!(&ApiErrorCode::parse(name), code);
            assert_eq!(code.as_str(), *name);
        }
    }

    #[test]
    fn test_missing_unrecoverable_flag_is_unrecoverable() {
        let err = ApiError::new(401, ApiErrorCode::AuthFailed, "bad token");
        assert!(err.is_unrecoverable());
        assert!(!err.with_unrecoverable(false).is_unrecoverable());
    }

    #[test]
    fn test_socket_codes() {
        assert!(ConnectionError::network(VideoErrorCode::InvalidToken, "x").is_unrecoverable());
        assert!(!ConnectionError::network(VideoErrorCode::NetworkFailed, "x").is_unrecoverable());
        let unknown = ConnectionError::Network {
            code: 4242,
            message: String::new(),
        };
        assert!(!unknown.is_unrecoverable());
    }
}

//! Protobuf payload shapes shared by events and requests.

use prost::{Enumeration, Message};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum TrackType {
    Unspecified = 0,
    Audio = 1,
    Video = 2,
    ScreenShare = 3,
    ScreenShareAudio = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum PeerType {
    PublisherUnspecified = 0,
    Subscriber = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ConnectionQuality {
    Unspecified = 0,
    Poor = 1,
    Good = 2,
    Excellent = 3,
}

/// How the server asks the client to recover after an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ReconnectStrategy {
    Unspecified = 0,
    /// Do not reconnect; the session is over.
    Disconnect = 1,
    /// Reconnect to the same SFU and keep the session.
    Fast = 2,
    /// Obtain new credentials from the coordinator and join again.
    Rejoin = 3,
    /// Move to a different SFU.
    Migrate = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum GoAwayReason {
    Unspecified = 0,
    ShuttingDown = 1,
    Rebalance = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum CallEndedReason {
    Unspecified = 0,
    Ended = 1,
    LiveEnded = 2,
    Kicked = 3,
    SessionEnded = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum TrackUnpublishReason {
    Unspecified = 0,
    UserMuted = 1,
    PermissionRevoked = 2,
    Moderation = 3,
}

#[derive(Clone, PartialEq, Message)]
pub struct Participant {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
    #[prost(enumeration = "TrackType", repeated, tag = "3")]
    pub published_tracks: Vec<i32>,
    /// Unix epoch milliseconds.
    #[prost(int64, tag = "4")]
    pub joined_at: i64,
    #[prost(string, tag = "5")]
    pub track_lookup_prefix: String,
    #[prost(enumeration = "ConnectionQuality", tag = "6")]
    pub connection_quality: i32,
    #[prost(bool, tag = "7")]
    pub is_speaking: bool,
    #[prost(bool, tag = "8")]
    pub is_dominant_speaker: bool,
    #[prost(float, tag = "9")]
    pub audio_level: f32,
    #[prost(string, tag = "10")]
    pub name: String,
    #[prost(string, tag = "11")]
    pub image: String,
    #[prost(string, repeated, tag = "12")]
    pub roles: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParticipantCount {
    #[prost(uint32, tag = "1")]
    pub total: u32,
    #[prost(uint32, tag = "2")]
    pub anonymous: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Pin {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
}

/// Snapshot of the SFU-side call sent along with the join response.
#[derive(Clone, PartialEq, Message)]
pub struct CallSnapshot {
    #[prost(message, repeated, tag = "1")]
    pub participants: Vec<Participant>,
    #[prost(message, optional, tag = "2")]
    pub participant_count: Option<ParticipantCount>,
    #[prost(message, repeated, tag = "3")]
    pub pins: Vec<Pin>,
}

#[derive(Clone, PartialEq, Message)]
pub struct IceTrickle {
    #[prost(enumeration = "PeerType", tag = "1")]
    pub peer_type: i32,
    #[prost(string, tag = "2")]
    pub ice_candidate: String,
    #[prost(string, tag = "3")]
    pub session_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct AudioLevel {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
    #[prost(float, tag = "3")]
    pub level: f32,
    #[prost(bool, tag = "4")]
    pub is_speaking: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectionQualityInfo {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
    #[prost(enumeration = "ConnectionQuality", tag = "3")]
    pub connection_quality: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VideoLayerSetting {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bool, tag = "2")]
    pub active: bool,
    #[prost(int32, tag = "3")]
    pub max_bitrate: i32,
    #[prost(float, tag = "4")]
    pub scale_resolution_down_by: f32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VideoSender {
    #[prost(enumeration = "TrackType", tag = "1")]
    pub track_type: i32,
    #[prost(message, repeated, tag = "2")]
    pub layers: Vec<VideoLayerSetting>,
}

/// Error body reported by the SFU. `code` shares the client's socket error
/// code space (see [`crate::error::VideoErrorCode`]).
#[derive(Clone, PartialEq, Message)]
pub struct SfuError {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(bool, tag = "3")]
    pub should_retry: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct CallGrants {
    #[prost(bool, tag = "1")]
    pub can_publish_audio: bool,
    #[prost(bool, tag = "2")]
    pub can_publish_video: bool,
    #[prost(bool, tag = "3")]
    pub can_screenshare: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ClientDetails {
    #[prost(string, tag = "1")]
    pub sdk_name: String,
    #[prost(string, tag = "2")]
    pub sdk_version: String,
    #[prost(string, tag = "3")]
    pub os: String,
    #[prost(string, tag = "4")]
    pub device: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ReconnectDetails {
    #[prost(enumeration = "ReconnectStrategy", tag = "1")]
    pub strategy: i32,
    #[prost(string, tag = "2")]
    pub previous_session_id: String,
    #[prost(uint32, tag = "3")]
    pub reconnect_attempt: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct MuteState {
    #[prost(enumeration = "TrackType", tag = "1")]
    pub track_type: i32,
    #[prost(bool, tag = "2")]
    pub muted: bool,
}

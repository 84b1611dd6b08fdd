use prost::Message;

use super::models::*;

#[derive(Clone, PartialEq, Message)]
pub struct SubscriberOffer {
    #[prost(string, tag = "1")]
    pub sdp: String,
    #[prost(bool, tag = "2")]
    pub ice_restart: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct PublisherAnswer {
    #[prost(string, tag = "1")]
    pub sdp: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectionQualityChanged {
    #[prost(message, repeated, tag = "1")]
    pub updates: Vec<ConnectionQualityInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AudioLevelChanged {
    #[prost(message, repeated, tag = "1")]
    pub levels: Vec<AudioLevel>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChangePublishQuality {
    #[prost(message, repeated, tag = "1")]
    pub video_senders: Vec<VideoSender>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParticipantJoined {
    #[prost(string, tag = "1")]
    pub call_cid: String,
    #[prost(message, optional, tag = "2")]
    pub participant: Option<Participant>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParticipantLeft {
    #[prost(string, tag = "1")]
    pub call_cid: String,
    #[prost(message, optional, tag = "2")]
    pub participant: Option<Participant>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParticipantUpdated {
    #[prost(string, tag = "1")]
    pub call_cid: String,
    #[prost(message, optional, tag = "2")]
    pub participant: Option<Participant>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DominantSpeakerChanged {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
}

/// Handshake completion. Receiving this moves the socket to `Connected`.
#[derive(Clone, PartialEq, Message)]
pub struct JoinResponse {
    #[prost(message, optional, tag = "1")]
    pub call_state: Option<CallSnapshot>,
    #[prost(bool, tag = "2")]
    pub reconnected: bool,
    #[prost(int32, tag = "3")]
    pub fast_reconnect_deadline_seconds: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct HealthCheckResponse {
    #[prost(message, optional, tag = "1")]
    pub participant_count: Option<ParticipantCount>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TrackPublished {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
    #[prost(enumeration = "TrackType", tag = "3")]
    pub track_type: i32,
    #[prost(message, optional, tag = "4")]
    pub participant: Option<Participant>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TrackUnpublished {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
    #[prost(enumeration = "TrackType", tag = "3")]
    pub track_type: i32,
    #[prost(enumeration = "TrackUnpublishReason", tag = "4")]
    pub cause: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ErrorEvent {
    #[prost(message, optional, tag = "1")]
    pub error: Option<SfuError>,
    #[prost(enumeration = "ReconnectStrategy", tag = "2")]
    pub reconnect_strategy: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CallGrantsUpdated {
    #[prost(message, optional, tag = "1")]
    pub current_grants: Option<CallGrants>,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GoAway {
    #[prost(enumeration = "GoAwayReason", tag = "1")]
    pub reason: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct IceRestart {
    #[prost(enumeration = "PeerType", tag = "1")]
    pub peer_type: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct PinsUpdated {
    #[prost(message, repeated, tag = "1")]
    pub pins: Vec<Pin>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CallEnded {
    #[prost(enumeration = "CallEndedReason", tag = "1")]
    pub reason: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParticipantMigrationComplete {}

wire_enum! {
    /// Event pushed by the SFU over the signaling socket.
    pub enum SfuDataEvent {
        1 => SubscriberOffer(SubscriberOffer),
        2 => PublisherAnswer(PublisherAnswer),
        3 => ConnectionQualityChanged(ConnectionQualityChanged),
        4 => AudioLevelChanged(AudioLevelChanged),
        5 => IceTrickle(IceTrickle),
        6 => ChangePublishQuality(ChangePublishQuality),
        7 => ParticipantJoined(ParticipantJoined),
        8 => ParticipantLeft(ParticipantLeft),
        9 => DominantSpeakerChanged(DominantSpeakerChanged),
        10 => JoinResponse(JoinResponse),
        11 => HealthCheckResponse(HealthCheckResponse),
        12 => TrackPublished(TrackPublished),
        13 => TrackUnpublished(TrackUnpublished),
        14 => Error(ErrorEvent),
        15 => CallGrantsUpdated(CallGrantsUpdated),
        16 => GoAway(GoAway),
        17 => IceRestart(IceRestart),
        18 => PinsUpdated(PinsUpdated),
        19 => CallEnded(CallEnded),
        20 => ParticipantUpdated(ParticipantUpdated),
        21 => ParticipantMigrationComplete(ParticipantMigrationComplete),
    }
    unknown => Unknown,
}

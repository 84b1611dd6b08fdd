use prost::Message;

use super::models::*;

/// First frame on every connection. The matching [`super::JoinResponse`]
/// completes the handshake.
#[derive(Clone, PartialEq, Message)]
pub struct JoinRequest {
    #[prost(string, tag = "1")]
    pub token: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
    #[prost(string, tag = "3")]
    pub subscriber_sdp: String,
    #[prost(message, optional, tag = "4")]
    pub client_details: Option<ClientDetails>,
    /// Present when this join resumes an earlier session.
    #[prost(message, optional, tag = "5")]
    pub reconnect_details: Option<ReconnectDetails>,
}

#[derive(Clone, PartialEq, Message)]
pub struct HealthCheckRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct LeaveCallRequest {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, tag = "2")]
    pub reason: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct UpdateMuteStates {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(message, repeated, tag = "2")]
    pub mute_states: Vec<MuteState>,
}

wire_enum! {
    /// Message sent by the client to the SFU.
    pub enum SfuRequest {
        1 => Join(JoinRequest),
        2 => HealthCheck(HealthCheckRequest),
        3 => IceTrickle(IceTrickle),
        4 => LeaveCall(LeaveCallRequest),
        5 => UpdateMuteStates(UpdateMuteStates),
    }
}

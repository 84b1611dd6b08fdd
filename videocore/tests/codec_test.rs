//! Wire codec behaviour against hand-built frames.

use prost::Message;
use videocore::codec::*;

fn participant(user: &str, session: &str) -> Participant {
    Participant {
        user_id: user.to_string(),
        session_id: session.to_string(),
        published_tracks: vec![TrackType::Audio as i32, TrackType::Video as i32],
        joined_at: 1_700_000_000_000,
        name: user.to_uppercase(),
        roles: vec!["user".to_string()],
        ..Default::default()
    }
}

fn sample_events() -> Vec<SfuDataEvent> {
    vec![
        SfuDataEvent::SubscriberOffer(SubscriberOffer {
            sdp: "v=0".to_string(),
            ice_restart: true,
        }),
        SfuDataEvent::JoinResponse(JoinResponse {
            call_state: Some(CallSnapshot {
                participants: vec![participant("alice", "s1")],
                participant_count: Some(ParticipantCount {
                    total: 1,
                    anonymous: 0,
                }),
                pins: vec![],
            }),
            reconnected: false,
            fast_reconnect_deadline_seconds: 30,
        }),
        SfuDataEvent::IceTrickle(IceTrickle {
            peer_type: PeerType::Subscriber as i32,
            ice_candidate: "candidate:1 1 udp".to_string(),
            session_id: "s1".to_string(),
        }),
        SfuDataEvent::TrackPublished(TrackPublished {
            user_id: "bob".to_string(),
            session_id: "s2".to_string(),
            track_type: TrackType::ScreenShare as i32,
            participant: Some(participant("bob", "s2")),
        }),
        SfuDataEvent::ParticipantLeft(ParticipantLeft {
            call_cid: "default:c1".to_string(),
            participant: Some(participant("bob", "s2")),
        }),
        SfuDataEvent::Error(ErrorEvent {
            error: Some(SfuError {
                code: 1006,
                message: "invalid token".to_string(),
                should_retry: false,
            }),
            reconnect_strategy: ReconnectStrategy::Disconnect as i32,
        }),
        SfuDataEvent::GoAway(GoAway {
            reason: GoAwayReason::ShuttingDown as i32,
        }),
        SfuDataEvent::HealthCheckResponse(HealthCheckResponse::default()),
        SfuDataEvent::PinsUpdated(PinsUpdated {
            pins: vec![Pin {
                user_id: "alice".to_string(),
                session_id: "s1".to_string(),
            }],
        }),
        SfuDataEvent::ParticipantMigrationComplete(ParticipantMigrationComplete {}),
    ]
}

#[test]
fn test_known_events_survive_reencoding() {
    for event in sample_events() {
        let frame = encode_event(&event).unwrap();
        let decoded = decode_event(&frame).unwrap();
        assert_eq!(decoded, event, "{}", event.name());
        assert_eq!(encode_event(&decoded).unwrap(), frame, "{}", event.name());
    }
}

#[test]
fn test_unknown_kind_is_forward_compatible() {
    let body = DominantSpeakerChanged {
        user_id: "carol".to_string(),
        session_id: "s3".to_string(),
    }
    .encode_to_vec();
    let frame = write_frame(4000, &body).unwrap();

    let decoded = decode_event(&frame).unwrap();
    match &decoded {
        SfuDataEvent::Unknown(raw) => {
            assert_eq!(raw.kind, 4000);
            assert_eq!(&raw.payload[..], &body[..]);
        }
        other => panic!("expected Unknown, got {}", other.name()),
    }
    assert_eq!(encode_event(&decoded).unwrap(), frame);
}

#[test]
fn test_corrupt_payload_is_a_decode_error() {
    // Field 1 declared as a 10-byte string with only 2 bytes present.
    let frame = write_frame(10, &[0x0A, 0x0A, b'h', b'i']).unwrap();
    assert!(matches!(
        decode_event(&frame),
        Err(DecodeError::Payload { kind: 10, .. })
    ));
}

#[test]
fn test_unknown_fields_inside_known_kind_are_skipped() {
    // GoAway with its reason plus an extra varint field 15 from a newer server.
    let mut body = GoAway {
        reason: GoAwayReason::Rebalance as i32,
    }
    .encode_to_vec();
    body.extend_from_slice(&[0x78, 0x01]);
    let frame = write_frame(16, &body).unwrap();

    match decode_event(&frame).unwrap() {
        SfuDataEvent::GoAway(go_away) => {
            assert_eq!(go_away.reason(), GoAwayReason::Rebalance);
        }
        other => panic!("expected GoAway, got {}", other.name()),
    }
}

#[test]
fn test_requests_encode_under_their_kind() {
    let join = SfuRequest::Join(JoinRequest {
        token: "tok".to_string(),
        session_id: "s1".to_string(),
        subscriber_sdp: String::new(),
        client_details: Some(ClientDetails {
            sdk_name: "video-client".to_string(),
            ..Default::default()
        }),
        reconnect_details: None,
    });
    let frame = encode_request(&join).unwrap();
    assert_eq!(u16::from_be_bytes([frame[1], frame[2]]), 1);
    assert_eq!(decode_request(&frame).unwrap(), join);

    let health = encode_request(&SfuRequest::HealthCheck(HealthCheckRequest {})).unwrap();
    assert_eq!(health, vec![PROTOCOL_VERSION, 0, 2, 0, 0, 0]);
}

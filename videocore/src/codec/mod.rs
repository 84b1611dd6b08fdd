//! Binary framing for SFU signaling traffic.
//!
//! Every frame carries exactly one event (server to client) or one request
//! (client to server):
//!
//! ```text
//! +---------+-------------+---------------+------------------+
//! | version | kind (u16)  | length (u24)  | protobuf payload |
//! +---------+-------------+---------------+------------------+
//!   1 byte    2 bytes BE    3 bytes BE      `length` bytes
//! ```
//!
//! Decoding never panics and has no side effects. Event kinds this build does
//! not know about decode to [`SfuDataEvent::Unknown`] so newer servers keep
//! working with older clients. Request kinds are a closed set and an unknown
//! one is an error.

use thiserror::Error;

/// Declares a wire enum whose variants map one-to-one onto frame kinds.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $kind:literal => $variant:ident($payload:ty), )+
        }
        $( unknown => $unknown:ident, )?
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant($payload), )+
            $(
                /// A well-formed frame of a kind this client does not know.
                $unknown($crate::codec::UnknownEvent),
            )?
        }

        impl $name {
            /// Every kind this build can decode.
            pub const KNOWN_KINDS: &'static [u16] = &[$($kind),+];

            /// The frame kind this value is encoded under.
            pub fn kind(&self) -> u16 {
                match self {
                    $( Self::$variant(_) => $kind, )+
                    $( Self::$unknown(raw) => raw.kind, )?
                }
            }

            /// Short name for logging.
            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$variant(_) => stringify!($variant), )+
                    $( Self::$unknown(_) => stringify!($unknown), )?
                }
            }

            pub(crate) fn encode_payload(&self) -> Vec<u8> {
                use prost::Message as _;
                match self {
                    $( Self::$variant(payload) => payload.encode_to_vec(), )+
                    $( Self::$unknown(raw) => raw.payload.to_vec(), )?
                }
            }

            /// `None` when `kind` is not one of [`Self::KNOWN_KINDS`].
            pub(crate) fn decode_payload(kind: u16, payload: &[u8]) -> Option<Result<Self, $crate::codec::DecodeError>> {
                use prost::Message as _;
                let decoded = match kind {
                    $( $kind => <$payload>::decode(payload).map(Self::$variant), )+
                    _ => return None,
                };
                Some(decoded.map_err(|source| $crate::codec::DecodeError::Payload { kind, source }))
            }
        }
    };
}

mod events;
mod models;
mod requests;

pub use events::*;
pub use models::*;
pub use requests::*;

use bytes::Bytes;

pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 6;
pub const MAX_PAYLOAD_LEN: usize = (1 << 24) - 1;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("protocol version mismatch: expected {expected}, got {found}")]
    VersionMismatch { expected: u8, found: u8 },
    #[error("frame kind 0 is reserved")]
    ReservedKind,
    #[error("unknown request kind {0}")]
    UnknownKind(u16),
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
    #[error("invalid payload for kind {kind}: {source}")]
    Payload {
        kind: u16,
        #[source]
        source: prost::DecodeError,
    },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload of {0} bytes exceeds the frame limit of {MAX_PAYLOAD_LEN}")]
    TooLarge(usize),
    #[error("frame kind 0 is reserved")]
    ReservedKind,
    #[error("event kind {0} is known and cannot be encoded as unknown")]
    KnownKindAsUnknown(u16),
}

/// Raw contents of an event frame with an unrecognised kind.
///
/// `kind` must not be one of [`SfuDataEvent::KNOWN_KINDS`]; [`encode_event`]
/// rejects such values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownEvent {
    pub kind: u16,
    pub payload: Bytes,
}

/// Splits a frame into its kind and payload after validating the header.
pub fn split_frame(frame: &[u8]) -> Result<(u16, &[u8]), DecodeError> {
    if frame.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            needed: HEADER_LEN,
            actual: frame.len(),
        });
    }
    if frame[0] != PROTOCOL_VERSION {
        return Err(DecodeError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found: frame[0],
        });
    }
    let kind = u16::from_be_bytes([frame[1], frame[2]]);
    if kind == 0 {
        return Err(DecodeError::ReservedKind);
    }
    let len = ((frame[3] as usize) << 16) | ((frame[4] as usize) << 8) | (frame[5] as usize);
    let end = HEADER_LEN + len;
    if frame.len() < end {
        return Err(DecodeError::Truncated {
            needed: end,
            actual: frame.len(),
        });
    }
    if frame.len() > end {
        return Err(DecodeError::TrailingBytes(frame.len() - end));
    }
    Ok((kind, &frame[HEADER_LEN..]))
}

/// Prefixes `payload` with a frame header.
pub fn write_frame(kind: u16, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if kind == 0 {
        return Err(EncodeError::ReservedKind);
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::TooLarge(payload.len()));
    }
    let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
    data.push(PROTOCOL_VERSION);
    data.extend_from_slice(&kind.to_be_bytes());
    let len_bytes = (payload.len() as u32).to_be_bytes();
    data.extend_from_slice(&len_bytes[1..]);
    data.extend_from_slice(payload);
    Ok(data)
}

pub fn decode_event(frame: &[u8]) -> Result<SfuDataEvent, DecodeError> {
    let (kind, payload) = split_frame(frame)?;
    match SfuDataEvent::decode_payload(kind, payload) {
        Some(decoded) => decoded,
        None => Ok(SfuDataEvent::Unknown(UnknownEvent {
            kind,
            payload: Bytes::copy_from_slice(payload),
        })),
    }
}

pub fn encode_event(event: &SfuDataEvent) -> Result<Vec<u8>, EncodeError> {
    if let SfuDataEvent::Unknown(raw) = event {
        if SfuDataEvent::KNOWN_KINDS.contains(&raw.kind) {
            return Err(EncodeError::KnownKindAsUnknown(raw.kind));
        }
    }
    write_frame(event.kind(), &event.encode_payload())
}

pub fn decode_request(frame: &[u8]) -> Result<SfuRequest, DecodeError> {
    let (kind, payload) = split_frame(frame)?;
    SfuRequest::decode_payload(kind, payload).unwrap_or(Err(DecodeError::UnknownKind(kind)))
}

pub fn encode_request(request: &SfuRequest) -> Result<Vec<u8>, EncodeError> {
    write_frame(request.kind(), &request.encode_payload())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let frame = write_frame(0x0102, &[9, 9, 9]).unwrap();
        assert_eq!(frame, vec![PROTOCOL_VERSION, 0x01, 0x02, 0, 0, 3, 9, 9, 9]);
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        let err = split_frame(&[PROTOCOL_VERSION, 0, 1]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                needed: HEADER_LEN,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let mut frame = write_frame(7, &[1, 2, 3, 4]).unwrap();
        frame.truncate(frame.len() - 1);
        assert!(matches!(
            split_frame(&frame),
            Err(DecodeError::Truncated { needed: 10, actual: 9 })
        ));
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let mut frame = write_frame(7, &[]).unwrap();
        frame[0] = PROTOCOL_VERSION + 1;
        assert!(matches!(
            decode_event(&frame),
            Err(DecodeError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_reserved_kind_and_trailing_bytes() {
        let frame = [PROTOCOL_VERSION, 0, 0, 0, 0, 0];
        assert!(matches!(split_frame(&frame), Err(DecodeError::ReservedKind)));

        let mut frame = write_frame(7, &[1]).unwrap();
        frame.push(0xFF);
        assert!(matches!(split_frame(&frame), Err(DecodeError::TrailingBytes(1))));

        assert!(matches!(write_frame(0, &[]), Err(EncodeError::ReservedKind)));
    }

    #[test]
    fn test_unknown_request_kind_is_an_error() {
        let frame = write_frame(999, &[]).unwrap();
        assert!(matches!(decode_request(&frame), Err(DecodeError::UnknownKind(999))));
    }

    #[test]
    fn test_known_kinds_are_unique() {
        let mut kinds = SfuDataEvent::KNOWN_KINDS.to_vec();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), SfuDataEvent::KNOWN_KINDS.len());
        assert!(!kinds.contains(&0));
    }

    #[test]
    fn test_unknown_event_with_known_kind_is_not_encoded() {
        let known = SfuDataEvent::KNOWN_KINDS[0];
        let event = SfuDataEvent::Unknown(UnknownEvent {
            kind: known,
            payload: Bytes::new(),
        });
        assert!(matches!(
            encode_event(&event),
            Err(EncodeError::KnownKindAsUnknown(k)) if k == known
        ));

        let event = SfuDataEvent::Unknown(UnknownEvent {
            kind: 4000,
            payload: Bytes::from_static(&[1, 2]),
        });
        let frame = encode_event(&event).unwrap();
        assert_eq!(decode_event(&frame).unwrap(), event);
    }
}

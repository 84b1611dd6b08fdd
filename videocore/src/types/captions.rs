use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One transcribed line of speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedCaption {
    pub speaker_id: String,
    pub text: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ClosedCaption {
    /// Two captions with the same key describe the same utterance.
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (&self.speaker_id, self.start_time)
    }
}

/// Transcription events delivered by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosedCaptionEvent {
    Started,
    Caption(ClosedCaption),
    Stopped,
}

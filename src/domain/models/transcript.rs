//! Transcript entries read from the authoritative session log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::turn::TurnActor;

/// One conversational entry in the append-only transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub actor: TurnActor,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(actor: TurnActor, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            actor,
            text: text.into(),
            timestamp,
        }
    }
}

//! Port for reading an agent's authoritative transcript.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{Agent, TranscriptEntry};

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("agent has no transcript configured")]
    NotConfigured,

    #[error("failed to read transcript {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// All conversational entries for the agent, in log order.
    async fn read_entries(&self, agent: &Agent) -> Result<Vec<TranscriptEntry>, TranscriptError>;
}

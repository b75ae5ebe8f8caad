//! Domain errors for the turnguard capture system.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while capturing and reconciling turns.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Command not found: {0}")]
    CommandNotFound(Uuid),

    #[error("Turn not found: {0}")]
    TurnNotFound(Uuid),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Transcript unavailable for agent {agent_id}: {reason}")]
    TranscriptUnavailable { agent_id: Uuid, reason: String },

    #[error("Terminal bridge error: {0}")]
    Bridge(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

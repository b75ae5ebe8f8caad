//! Repository port for turn persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Turn;

#[async_trait]
pub trait TurnRepository: Send + Sync {
    /// Insert a turn in its own transaction; it is durable once this returns.
    async fn create(&self, turn: &Turn) -> DomainResult<()>;

    /// Get a turn by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Turn>>;

    /// Turns of one command in timestamp order.
    async fn list_for_command(&self, command_id: Uuid) -> DomainResult<Vec<Turn>>;

    /// Turns of one agent with `timestamp >= since`, in timestamp order.
    async fn list_for_agent_since(&self, agent_id: Uuid, since: DateTime<Utc>) -> DomainResult<Vec<Turn>>;

    /// Total number of turns recorded for an agent.
    async fn count_for_agent(&self, agent_id: Uuid) -> DomainResult<u64>;

    /// Replace a turn's timestamp with the transcript's authoritative value.
    async fn correct_timestamp(&self, id: Uuid, timestamp: DateTime<Utc>) -> DomainResult<()>;

    /// Set the content hash of a turn that has none. Returns false if it already had one.
    async fn backfill_content_hash(&self, id: Uuid, hash: &str) -> DomainResult<bool>;

    /// Replace the hash `from` with `to`. Returns false if the stored hash was no longer `from`.
    async fn upgrade_content_hash(&self, id: Uuid, from: &str, to: &str) -> DomainResult<bool>;
}

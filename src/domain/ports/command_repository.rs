//! Repository port for command persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Command, CommandState};

#[async_trait]
pub trait CommandRepository: Send + Sync {
    /// Create a new command.
    async fn create(&self, command: &Command) -> DomainResult<()>;

    /// Get a command by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Command>>;

    /// Move a command from `from` to `to` in its own transaction.
    ///
    /// Fails with `ConcurrencyConflict` if the stored state is no longer `from`.
    async fn update_state(
        &self,
        id: Uuid,
        from: CommandState,
        to: CommandState,
        completed_at: Option<DateTime<Utc>>,
    ) -> DomainResult<()>;

    /// Commands of one agent, newest first.
    async fn list_for_agent(&self, agent_id: Uuid) -> DomainResult<Vec<Command>>;
}

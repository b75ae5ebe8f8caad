//! Repository port for agent persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Agent;

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Insert a new agent.
    async fn create(&self, agent: &Agent) -> DomainResult<()>;

    /// Get an agent by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>>;

    /// List all agents.
    async fn list(&self) -> DomainResult<Vec<Agent>>;

    /// Point the agent at a new active command (or none).
    async fn set_active_command(&self, id: Uuid, command_id: Option<Uuid>) -> DomainResult<()>;

    /// Record how many transcript entries have been reconciled.
    async fn update_transcript_cursor(&self, id: Uuid, cursor: u64) -> DomainResult<()>;

    /// Change the terminal pane reference.
    async fn update_pane(&self, id: Uuid, pane_id: Option<String>) -> DomainResult<()>;
}

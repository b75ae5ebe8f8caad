//! Operator responses typed into an agent's pane.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{CommandState, TurnActor, TurnDraft, TurnIntent, TurnSource};
use crate::domain::ports::{BridgeError, TerminalBridge};
use crate::services::lifecycle_manager::{CapturedTurn, CommandLifecycleManager, TurnCapture};

#[derive(Debug, Error)]
pub enum RespondError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("agent {0} has no terminal pane")]
    NoPane(Uuid),

    #[error("failed to send to pane: {0}")]
    Send(#[from] BridgeError),

    /// The text reached the pane but the turn was not stored.
    #[error("text was sent but recording the turn failed: {0}")]
    RecordFailed(#[source] DomainError),
}

pub struct OperatorResponder {
    bridge: Arc<dyn TerminalBridge>,
    lifecycle: Arc<CommandLifecycleManager>,
}

impl OperatorResponder {
    pub fn new(bridge: Arc<dyn TerminalBridge>, lifecycle: Arc<CommandLifecycleManager>) -> Self {
        Self { bridge, lifecycle }
    }

    /// Send `text` to the agent, then record it as a user turn. `intent`
    /// defaults to an answer when the agent is waiting on input and to a new
    /// instruction otherwise.
    pub async fn respond(
        &self,
        agent_id: Uuid,
        text: &str,
        intent: Option<TurnIntent>,
    ) -> Result<CapturedTurn, RespondError> {
        let agent = self
            .lifecycle
            .agents()
            .get(agent_id)
            .await?
            .ok_or(DomainError::AgentNotFound(agent_id))?;
        let pane_id = agent.pane_id.ok_or(RespondError::NoPane(agent_id))?;

        let intent = match intent {
            Some(intent) => intent,
            None => match self.lifecycle.agent_state(agent_id).await? {
                CommandState::AwaitingInput => TurnIntent::Answer,
                _ => TurnIntent::Command,
            },
        };

        self.bridge.send_text(&pane_id, text).await?;

        let draft = TurnDraft::new(TurnActor::User, intent, text).with_source(TurnSource::Operator);
        let captured = self
            .lifecycle
            .capture_turn(TurnCapture::new(agent_id, draft))
            .await
            .map_err(|e| {
                warn!(agent_id = %agent_id, error = %e, "Operator text sent but not recorded");
                RespondError::RecordFailed(e)
            })?;

        info!(
            agent_id = %agent_id,
            turn_id = %captured.turn.id,
            intent = %intent,
            "Operator response delivered"
        );
        Ok(captured)
    }
}

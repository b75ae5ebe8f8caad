//! Command lifecycle manager.
//!
//! The one place turns are written and state transitions are attempted, for
//! the hook fast path and the reconciler alike. Turn persistence and the
//! state transition are two separate commits, strictly in that order: once
//! `record_turn` returns, nothing that happens afterwards can lose the turn.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::lifecycle::{transition, RejectedTransition, RejectionReason};
use crate::domain::models::{content_key, Command, CommandState, Turn, TurnActor, TurnDraft, TurnIntent};
use crate::domain::ports::{AgentRepository, CommandRepository, TurnRepository};
use crate::services::event_bus::{EventBus, EventPayload};

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Rejected(#[from] RejectedTransition),

    #[error("command {command_id} is no longer in state {expected}")]
    Conflict { command_id: Uuid, expected: CommandState },

    #[error("failed to persist transition: {0}")]
    Store(#[from] DomainError),
}

/// A turn reported for an agent, before a command is chosen for it.
#[derive(Debug, Clone)]
pub struct TurnCapture {
    pub agent_id: Uuid,
    pub draft: TurnDraft,
}

impl TurnCapture {
    pub fn new(agent_id: Uuid, draft: TurnDraft) -> Self {
        Self { agent_id, draft }
    }
}

/// What happened to the command after the turn was stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Transitioned { from: CommandState, to: CommandState },
    /// Accepted with no state implication.
    Unchanged { state: CommandState },
    Rejected { transition: RejectedTransition },
    Failed { reason: String },
}

impl TransitionOutcome {
    /// Whether the turn is stored but the command state did not follow.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CapturedTurn {
    pub turn: Turn,
    pub command_id: Uuid,
    /// Whether a new command was opened for this turn.
    pub opened_command: bool,
    pub outcome: TransitionOutcome,
}

pub struct CommandLifecycleManager {
    agents: Arc<dyn AgentRepository>,
    commands: Arc<dyn CommandRepository>,
    turns: Arc<dyn TurnRepository>,
    events: Arc<EventBus>,
}

impl CommandLifecycleManager {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        commands: Arc<dyn CommandRepository>,
        turns: Arc<dyn TurnRepository>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            agents,
            commands,
            turns,
            events,
        }
    }

    pub fn turns(&self) -> &Arc<dyn TurnRepository> {
        &self.turns
    }

    pub fn agents(&self) -> &Arc<dyn AgentRepository> {
        &self.agents
    }

    /// Persist a turn under `command` in its own transaction.
    pub async fn record_turn(&self, command: &Command, draft: TurnDraft) -> DomainResult<Turn> {
        let turn = draft.into_turn(command.id, command.agent_id);
        self.turns.create(&turn).await?;

        debug!(
            turn_id = %turn.id,
            command_id = %command.id,
            agent_id = %command.agent_id,
            actor = %turn.actor,
            intent = %turn.intent,
            source = turn.source.as_str(),
            "Turn recorded"
        );
        self.events.emit(EventPayload::TurnCreated {
            turn_id: turn.id,
            command_id: command.id,
            agent_id: command.agent_id,
            actor: turn.actor,
            intent: turn.intent,
            source: turn.source,
        });

        Ok(turn)
    }

    /// Move `command` to `to_state` because of `trigger`, as a separate commit.
    ///
    /// `to_state` must be what the state machine yields for the trigger. A
    /// transition with no state implication leaves the row untouched.
    pub async fn transition_state(
        &self,
        command: &Command,
        to_state: CommandState,
        trigger: &Turn,
    ) -> Result<CommandState, TransitionError> {
        let from = command.state;
        let target = transition(from, trigger.actor, trigger.intent)?;
        if target != to_state {
            return Err(RejectedTransition {
                from,
                actor: trigger.actor,
                intent: trigger.intent,
                reason: RejectionReason::NotInTable,
            }
            .into());
        }

        if target == from {
            return Ok(from);
        }

        let completed_at = target.is_terminal().then(chrono::Utc::now);
        self.commands
            .update_state(command.id, from, target, completed_at)
            .await
            .map_err(|e| match e {
                DomainError::ConcurrencyConflict { .. } => TransitionError::Conflict {
                    command_id: command.id,
                    expected: from,
                },
                other => TransitionError::Store(other),
            })?;

        info!(
            command_id = %command.id,
            agent_id = %command.agent_id,
            turn_id = %trigger.id,
            from = %from,
            to = %target,
            "Command state changed"
        );
        self.events.emit(EventPayload::StateChange {
            command_id: command.id,
            agent_id: command.agent_id,
            turn_id: Some(trigger.id),
            from,
            to: target,
        });

        Ok(target)
    }

    /// Full capture path: pick the command, store the turn, then try the
    /// transition. Only a failure to store the turn is returned as an error.
    pub async fn capture_turn(&self, capture: TurnCapture) -> DomainResult<CapturedTurn> {
        let TurnCapture { agent_id, mut draft } = capture;
        if draft.content_hash.is_none() {
            draft.content_hash = Some(content_key(draft.actor, &draft.text));
        }

        let (command, opened_command) = self.resolve_command(agent_id, draft.actor, draft.intent).await?;
        let turn = self.record_turn(&command, draft).await?;

        let outcome = match transition(command.state, turn.actor, turn.intent) {
            Err(rejected) => {
                warn!(
                    turn_id = %turn.id,
                    command_id = %command.id,
                    agent_id = %agent_id,
                    transition = %rejected,
                    preserved = true,
                    "State transition rejected"
                );
                self.emit_pending(&command, &turn, rejected.reason.to_string());
                TransitionOutcome::Rejected { transition: rejected }
            }
            Ok(to) if to == command.state => TransitionOutcome::Unchanged { state: to },
            Ok(to) => match self.transition_state(&command, to, &turn).await {
                Ok(to) => TransitionOutcome::Transitioned {
                    from: command.state,
                    to,
                },
                Err(e) => {
                    warn!(
                        turn_id = %turn.id,
                        command_id = %command.id,
                        agent_id = %agent_id,
                        from = %command.state,
                        to = %to,
                        error = %e,
                        preserved = true,
                        "State transition failed"
                    );
                    self.emit_pending(&command, &turn, e.to_string());
                    TransitionOutcome::Failed { reason: e.to_string() }
                }
            },
        };

        Ok(CapturedTurn {
            command_id: command.id,
            turn,
            opened_command,
            outcome,
        })
    }

    /// The agent's active command, if it has one.
    pub async fn active_command(&self, agent_id: Uuid) -> DomainResult<Option<Command>> {
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or(DomainError::AgentNotFound(agent_id))?;

        match agent.active_command_id {
            Some(id) => self.commands.get(id).await,
            None => Ok(None),
        }
    }

    /// Effective state: the active command's state, or idle.
    pub async fn agent_state(&self, agent_id: Uuid) -> DomainResult<CommandState> {
        Ok(self
            .active_command(agent_id)
            .await?
            .map_or(CommandState::Idle, |c| c.state))
    }

    /// The command a new turn belongs to. A top-level user instruction with
    /// no open command supersedes the old one; any other turn with no command
    /// gets an idle holder so it can still be stored.
    async fn resolve_command(
        &self,
        agent_id: Uuid,
        actor: TurnActor,
        intent: TurnIntent,
    ) -> DomainResult<(Command, bool)> {
        let active = self.active_command(agent_id).await?;
        let instruction = actor == TurnActor::User && intent == TurnIntent::Command;

        match active {
            Some(command) if !(instruction && command.state.is_terminal()) => Ok((command, false)),
            previous => {
                let command = Command::new(agent_id);
                self.commands.create(&command).await?;
                self.agents.set_active_command(agent_id, Some(command.id)).await?;
                debug!(
                    agent_id = %agent_id,
                    command_id = %command.id,
                    superseded = ?previous.map(|c| c.id),
                    "Opened command"
                );
                Ok((command, true))
            }
        }
    }

    fn emit_pending(&self, command: &Command, turn: &Turn, reason: String) {
        self.events.emit(EventPayload::StatePending {
            command_id: command.id,
            agent_id: command.agent_id,
            turn_id: turn.id,
            state: command.state,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteAgentRepository, SqliteCommandRepository, SqliteTurnRepository,
    };
    use crate::domain::models::Agent;
    use crate::services::event_bus::UnifiedEvent;
    use tokio::sync::broadcast;

    struct Fixture {
        manager: CommandLifecycleManager,
        commands: Arc<SqliteCommandRepository>,
        agent: Agent,
        events: broadcast::Receiver<UnifiedEvent>,
    }

    async fn setup() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let commands = Arc::new(SqliteCommandRepository::new(pool.clone()));
        let turns = Arc::new(SqliteTurnRepository::new(pool));
        let bus = Arc::new(EventBus::default());
        let events = bus.subscribe();

        let agent = Agent::new("worker");
        agents.create(&agent).await.unwrap();

        Fixture {
            manager: CommandLifecycleManager::new(agents, commands.clone(), turns, bus),
            commands,
            agent,
            events,
        }
    }

    fn capture(agent: &Agent, actor: TurnActor, intent: TurnIntent, text: &str) -> TurnCapture {
        TurnCapture::new(agent.id, TurnDraft::new(actor, intent, text))
    }

    #[tokio::test]
    async fn test_instruction_opens_command() {
        let mut fx = setup().await;
        let captured = fx
            .manager
            .capture_turn(capture(&fx.agent, TurnActor::User, TurnIntent::Command, "fix the bug"))
            .await
            .unwrap();

        assert!(captured.opened_command);
        assert_eq!(
            captured.outcome,
            TransitionOutcome::Transitioned {
                from: CommandState::Idle,
                to: CommandState::Commanded
            }
        );
        assert!(captured.turn.content_hash.is_some());
        assert_eq!(fx.manager.agent_state(fx.agent.id).await.unwrap(), CommandState::Commanded);

        let first = fx.events.recv().await.unwrap();
        assert_eq!(first.payload.name(), "turn_created");
        let second = fx.events.recv().await.unwrap();
        assert_eq!(second.payload.name(), "state_change");
    }

    #[tokio::test]
    async fn test_full_cycle_and_supersession() {
        let fx = setup().await;
        let m = &fx.manager;
        let a = &fx.agent;

        let first = m.capture_turn(capture(a, TurnActor::User, TurnIntent::Command, "one")).await.unwrap();
        m.capture_turn(capture(a, TurnActor::Agent, TurnIntent::Progress, "working")).await.unwrap();
        m.capture_turn(capture(a, TurnActor::Agent, TurnIntent::Completion, "done")).await.unwrap();
        assert_eq!(m.agent_state(a.id).await.unwrap(), CommandState::Complete);

        let second = m.capture_turn(capture(a, TurnActor::User, TurnIntent::Command, "two")).await.unwrap();
        assert!(second.opened_command);
        assert_ne!(first.command_id, second.command_id);
        assert_eq!(m.agent_state(a.id).await.unwrap(), CommandState::Commanded);

        let old = fx.commands.get(first.command_id).await.unwrap().unwrap();
        assert_eq!(old.state, CommandState::Complete);
        assert!(old.completed_at.is_some());
        assert_eq!(fx.commands.list_for_agent(a.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_agent_output_without_instruction_is_preserved() {
        let mut fx = setup().await;
        let captured = fx
            .manager
            .capture_turn(capture(&fx.agent, TurnActor::Agent, TurnIntent::Progress, "stray output"))
            .await
            .unwrap();

        assert!(captured.outcome.is_pending());
        assert!(matches!(captured.outcome, TransitionOutcome::Rejected { .. }));
        let stored = fx.manager.turns().get(captured.turn.id).await.unwrap();
        assert!(stored.is_some());
        assert_eq!(fx.manager.agent_state(fx.agent.id).await.unwrap(), CommandState::Idle);

        let _created = fx.events.recv().await.unwrap();
        let pending = fx.events.recv().await.unwrap();
        assert_eq!(pending.payload.name(), "state_pending");
    }

    #[tokio::test]
    async fn test_same_state_transition_leaves_row_untouched() {
        let fx = setup().await;
        let m = &fx.manager;
        let a = &fx.agent;
        let first = m.capture_turn(capture(a, TurnActor::User, TurnIntent::Command, "go")).await.unwrap();
        m.capture_turn(capture(a, TurnActor::Agent, TurnIntent::Progress, "step 1")).await.unwrap();
        let before = fx.commands.get(first.command_id).await.unwrap().unwrap();

        let again = m.capture_turn(capture(a, TurnActor::Agent, TurnIntent::Progress, "step 2")).await.unwrap();
        assert_eq!(again.outcome, TransitionOutcome::Unchanged { state: CommandState::Processing });
        let after = fx.commands.get(first.command_id).await.unwrap().unwrap();
        assert_eq!(before.updated_at, after.updated_at);
    }

    #[tokio::test]
    async fn test_transition_state_rejects_wrong_target() {
        let fx = setup().await;
        let captured = fx
            .manager
            .capture_turn(capture(&fx.agent, TurnActor::User, TurnIntent::Command, "go"))
            .await
            .unwrap();
        let command = fx.commands.get(captured.command_id).await.unwrap().unwrap();

        let err = fx
            .manager
            .transition_state(&command, CommandState::Complete, &captured.turn)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_stale_command_is_a_conflict() {
        let fx = setup().await;
        let m = &fx.manager;
        let a = &fx.agent;
        let captured = m.capture_turn(capture(a, TurnActor::User, TurnIntent::Command, "go")).await.unwrap();
        let stale = fx.commands.get(captured.command_id).await.unwrap().unwrap();
        m.capture_turn(capture(a, TurnActor::Agent, TurnIntent::Progress, "working")).await.unwrap();

        let trigger = m
            .capture_turn(capture(a, TurnActor::Agent, TurnIntent::Question, "Should I?"))
            .await
            .unwrap()
            .turn;
        let err = m
            .transition_state(&stale, CommandState::AwaitingInput, &trigger)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let fx = setup().await;
        let err = fx
            .manager
            .capture_turn(TurnCapture::new(
                Uuid::new_v4(),
                TurnDraft::new(TurnActor::User, TurnIntent::Command, "x"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AgentNotFound(_)));
    }
}

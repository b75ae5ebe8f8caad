//! Common test utilities for integration tests
//!
//! Builds a fully wired service graph over an in-memory migrated SQLite pool
//! with in-memory transcript, bridge, and classifier adapters.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use uuid::Uuid;

use turnguard::adapters::mock::{InMemoryTranscriptSource, MockTerminalBridge, ScriptedIntentClassifier};
use turnguard::adapters::sqlite::{
    create_migrated_test_pool, SqliteAgentRepository, SqliteCommandRepository, SqliteTurnRepository,
};
use turnguard::domain::models::{
    Agent, Command, CommandState, ReconcilerConfig, TranscriptEntry, Turn, TurnActor, WatchdogConfig,
};
use turnguard::domain::ports::{
    AgentRepository, CommandRepository, IntentClassifier, TranscriptSource, TurnRepository,
};
use turnguard::domain::DomainResult;
use turnguard::services::{
    CommandLifecycleManager, EventBus, ReconciliationLockRegistry, TerminalWatchdog, TranscriptReconciler,
};

pub struct Harness {
    pub pool: sqlx::SqlitePool,
    pub agents: Arc<SqliteAgentRepository>,
    pub commands: Arc<SqliteCommandRepository>,
    pub turns: Arc<SqliteTurnRepository>,
    pub events: Arc<EventBus>,
    pub lifecycle: Arc<CommandLifecycleManager>,
    pub transcripts: Arc<InMemoryTranscriptSource>,
    pub locks: Arc<ReconciliationLockRegistry>,
    pub reconciler: Arc<TranscriptReconciler>,
    pub bridge: MockTerminalBridge,
}

pub struct HarnessBuilder {
    config: ReconcilerConfig,
    classifier: Arc<dyn IntentClassifier>,
    transcripts: Option<Arc<dyn TranscriptSource>>,
    fail_transitions: bool,
}

impl HarnessBuilder {
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn classifier(mut self, classifier: impl IntentClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Replace the transcript source handed to the reconciler.
    pub fn transcripts(mut self, source: Arc<dyn TranscriptSource>) -> Self {
        self.transcripts = Some(source);
        self
    }

    /// Make every command state update fail in the lifecycle manager.
    pub fn fail_transitions(mut self) -> Self {
        self.fail_transitions = true;
        self
    }

    pub async fn build(self) -> Harness {
        let pool = create_migrated_test_pool().await.expect("test pool");
        let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let commands = Arc::new(SqliteCommandRepository::new(pool.clone()));
        let turns = Arc::new(SqliteTurnRepository::new(pool.clone()));
        let events = Arc::new(EventBus::default());
        let lifecycle_commands: Arc<dyn CommandRepository> = if self.fail_transitions {
            Arc::new(FailingTransitions { inner: commands.clone() })
        } else {
            commands.clone()
        };
        let lifecycle = Arc::new(CommandLifecycleManager::new(
            agents.clone(),
            lifecycle_commands,
            turns.clone(),
            events.clone(),
        ));
        let transcripts = Arc::new(InMemoryTranscriptSource::new());
        let locks = Arc::new(ReconciliationLockRegistry::new());
        let reconciler = Arc::new(TranscriptReconciler::new(
            lifecycle.clone(),
            self.transcripts
                .unwrap_or_else(|| transcripts.clone() as Arc<dyn TranscriptSource>),
            self.classifier,
            locks.clone(),
            events.clone(),
            self.config,
        ));

        Harness {
            pool,
            agents,
            commands,
            turns,
            events,
            lifecycle,
            transcripts,
            locks,
            reconciler,
            bridge: MockTerminalBridge::new(),
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: ReconcilerConfig::default(),
            classifier: Arc::new(ScriptedIntentClassifier::new()),
            transcripts: None,
            fail_transitions: false,
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub async fn agent(&self, name: &str, pane: Option<&str>) -> Agent {
        let mut agent = Agent::new(name);
        agent.pane_id = pane.map(str::to_string);
        self.agents.create(&agent).await.expect("create agent");
        agent
    }

    /// A command already in `state`, made active for `agent_id`.
    pub async fn command_in(&self, agent_id: Uuid, state: CommandState) -> Command {
        let command = Command::new(agent_id);
        self.commands.create(&command).await.expect("create command");
        if state != CommandState::Idle {
            self.commands
                .update_state(command.id, CommandState::Idle, state, None)
                .await
                .expect("seed state");
        }
        self.agents
            .set_active_command(agent_id, Some(command.id))
            .await
            .expect("activate command");
        self.commands.get(command.id).await.unwrap().unwrap()
    }

    pub async fn all_turns(&self, agent_id: Uuid) -> Vec<Turn> {
        self.turns
            .list_for_agent_since(agent_id, DateTime::<Utc>::UNIX_EPOCH)
            .await
            .expect("list turns")
    }

    pub async fn state(&self, agent_id: Uuid) -> CommandState {
        self.lifecycle.agent_state(agent_id).await.expect("agent state")
    }

    pub async fn reset_cursor(&self, agent_id: Uuid) {
        self.agents.update_transcript_cursor(agent_id, 0).await.expect("reset cursor");
    }

    pub fn watchdog(&self, config: WatchdogConfig) -> Arc<TerminalWatchdog> {
        Arc::new(TerminalWatchdog::new(
            Arc::new(self.bridge.clone()),
            self.agents.clone(),
            self.turns.clone(),
            self.reconciler.clone(),
            self.events.clone(),
            config,
        ))
    }
}

/// Transcript entry `secs_ago` seconds in the past.
pub fn entry(actor: TurnActor, text: &str, secs_ago: i64) -> TranscriptEntry {
    TranscriptEntry::new(actor, text, (Utc::now() - Duration::seconds(secs_ago)).trunc_subsecs(3))
}

/// Watchdog settings that escalate on the first unexplained change.
pub fn eager_watchdog() -> WatchdogConfig {
    WatchdogConfig {
        poll_interval_ms: 10,
        gap_threshold_ms: 0,
        ..WatchdogConfig::default()
    }
}

/// Command store whose state updates always fail; everything else delegates.
pub struct FailingTransitions {
    pub inner: Arc<dyn CommandRepository>,
}

#[async_trait]
impl CommandRepository for FailingTransitions {
    async fn create(&self, command: &Command) -> DomainResult<()> {
        self.inner.create(command).await
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Command>> {
        self.inner.get(id).await
    }

    async fn update_state(
        &self,
        _id: Uuid,
        _from: CommandState,
        _to: CommandState,
        _completed_at: Option<DateTime<Utc>>,
    ) -> DomainResult<()> {
        Err(turnguard::DomainError::DatabaseError("disk I/O error".to_string()))
    }

    async fn list_for_agent(&self, agent_id: Uuid) -> DomainResult<Vec<Command>> {
        self.inner.list_for_agent(agent_id).await
    }
}

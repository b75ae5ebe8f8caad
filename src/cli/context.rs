//! Wiring of the stores, adapters and services a command needs.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::classifier::KeywordIntentClassifier;
use crate::adapters::sqlite::{
    initialize_database, PoolConfig, SqliteAgentRepository, SqliteCommandRepository,
    SqliteTurnRepository,
};
use crate::adapters::tmux::TmuxBridge;
use crate::adapters::transcript::JsonlTranscriptSource;
use crate::domain::models::{Config, WatchdogConfig};
use crate::domain::ports::{AgentRepository, IntentClassifier, TerminalBridge};
use crate::services::{
    CommandLifecycleManager, EventBus, OperatorResponder, ReconciliationDaemon,
    ReconciliationLockRegistry, TerminalWatchdog, TranscriptReconciler,
};

/// Fully wired services over the configured database.
pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub agents: Arc<dyn AgentRepository>,
    pub events: Arc<EventBus>,
    pub lifecycle: Arc<CommandLifecycleManager>,
    pub reconciler: Arc<TranscriptReconciler>,
    pub bridge: Arc<dyn TerminalBridge>,
    pub classifier: Arc<dyn IntentClassifier>,
}

impl AppContext {
    pub async fn open(config: Config) -> Result<Self> {
        let pool = initialize_database(&config.database.url(), Some(PoolConfig::from(&config.database)))
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;

        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let events = Arc::new(EventBus::new(&config.events));
        let lifecycle = Arc::new(CommandLifecycleManager::new(
            agents.clone(),
            Arc::new(SqliteCommandRepository::new(pool.clone())),
            Arc::new(SqliteTurnRepository::new(pool.clone())),
            events.clone(),
        ));
        let classifier: Arc<dyn IntentClassifier> = Arc::new(KeywordIntentClassifier::new());
        let reconciler = Arc::new(TranscriptReconciler::new(
            lifecycle.clone(),
            Arc::new(JsonlTranscriptSource::new()),
            classifier.clone(),
            Arc::new(ReconciliationLockRegistry::new()),
            events.clone(),
            config.reconciler.clone(),
        ));
        let bridge: Arc<dyn TerminalBridge> = Arc::new(TmuxBridge::new(&config.bridge));

        Ok(Self {
            config,
            pool,
            agents,
            events,
            lifecycle,
            reconciler,
            bridge,
            classifier,
        })
    }

    pub fn watchdog(&self, config: WatchdogConfig) -> TerminalWatchdog {
        TerminalWatchdog::new(
            self.bridge.clone(),
            self.agents.clone(),
            self.lifecycle.turns().clone(),
            self.reconciler.clone(),
            self.events.clone(),
            config,
        )
    }

    pub fn daemon(&self, interval: Duration) -> ReconciliationDaemon {
        ReconciliationDaemon::new(self.reconciler.clone(), self.agents.clone(), interval)
    }

    pub fn responder(&self) -> OperatorResponder {
        OperatorResponder::new(self.bridge.clone(), self.lifecycle.clone())
    }
}

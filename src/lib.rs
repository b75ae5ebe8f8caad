//! turnguard - turn capture reliability for supervised coding-agent sessions
//!
//! Every user or agent utterance in a supervised session becomes a durable
//! turn, and each agent's command lifecycle follows those turns. Hooks are
//! the fast path; a pane watchdog and a transcript reconciler recover what
//! the hooks miss.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, the lifecycle state machine, and port traits
//! - **Adapter Layer** (`adapters`): SQLite store, tmux bridge, JSONL transcripts, classifier
//! - **Service Layer** (`services`): capture, reconciliation, and pane watching
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Agent, Command, CommandState, Config, Turn, TurnActor, TurnDraft, TurnIntent, TurnSource,
};
pub use domain::ports::{
    AgentRepository, CommandRepository, IntentClassifier, TerminalBridge, TranscriptSource,
    TurnRepository,
};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    CommandLifecycleManager, EventBus, OperatorResponder, ReconciliationDaemon,
    ReconciliationLockRegistry, TerminalWatchdog, TranscriptReconciler,
};

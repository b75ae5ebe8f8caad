//! Port trait definitions (Hexagonal Architecture)
//!
//! Contracts the services depend on; adapters under `crate::adapters`
//! implement them:
//! - `TurnRepository`, `CommandRepository`, `AgentRepository`: persistent store
//! - `TerminalBridge`: pane capture/send
//! - `IntentClassifier`: text -> intent
//! - `TranscriptSource`: the append-only session log

pub mod agent_repository;
pub mod command_repository;
pub mod intent_classifier;
pub mod terminal_bridge;
pub mod transcript_source;
pub mod turn_repository;

pub use agent_repository::AgentRepository;
pub use command_repository::CommandRepository;
pub use intent_classifier::{Classification, ClassifierError, IntentClassifier};
pub use terminal_bridge::{BridgeError, TerminalBridge};
pub use transcript_source::{TranscriptError, TranscriptSource};
pub use turn_repository::TurnRepository;

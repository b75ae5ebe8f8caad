pub mod agent;
pub mod command;
pub mod config;
pub mod content_key;
pub mod lifecycle;
pub mod transcript;
pub mod turn;

pub use agent::Agent;
pub use command::{Command, CommandState};
pub use config::{
    BridgeConfig, Config, DatabaseConfig, EventsConfig, LogFormat, LoggingConfig,
    ReconcilerConfig, RotationPolicy, WatchdogConfig,
};
pub use content_key::{content_key, is_legacy_hash, legacy_content_key, normalize, ContentKeys};
pub use lifecycle::{transition, RejectedTransition, RejectionReason};
pub use transcript::TranscriptEntry;
pub use turn::{Turn, TurnActor, TurnDraft, TurnIntent, TurnSource};

//! Command domain model.
//!
//! A command is one unit of agent work, opened by a top-level user
//! instruction and closed by the agent reporting completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// No instruction received yet.
    Idle,
    /// Instruction received, agent has not responded.
    Commanded,
    /// Agent is working.
    Processing,
    /// Agent asked a question and is blocked on the operator.
    AwaitingInput,
    /// Agent reported the work as done.
    Complete,
}

impl Default for CommandState {
    fn default() -> Self {
        Self::Idle
    }
}

impl CommandState {
    pub const ALL: [CommandState; 5] = [
        Self::Idle,
        Self::Commanded,
        Self::Processing,
        Self::AwaitingInput,
        Self::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Commanded => "commanded",
            Self::Processing => "processing",
            Self::AwaitingInput => "awaiting_input",
            Self::Complete => "complete",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "commanded" => Some(Self::Commanded),
            "processing" => Some(Self::Processing),
            "awaiting_input" | "awaiting-input" => Some(Self::AwaitingInput),
            "complete" | "completed" => Some(Self::Complete),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub state: CommandState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Command {
    /// Open a new command for an agent in the `Idle` state.
    pub fn new(agent_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_id,
            state: CommandState::Idle,
            started_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Apply an already-validated state change in memory.
    pub fn apply_state(&mut self, state: CommandState) {
        self.state = state;
        self.updated_at = Utc::now();
        self.completed_at = state.is_terminal().then_some(self.updated_at);
    }
}

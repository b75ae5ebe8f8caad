//! Agent domain model.
//!
//! An agent is one running coding-agent session with an optional terminal
//! pane and an optional transcript on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::command::{Command, CommandState};

/// A supervised agent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    /// Human-readable session name.
    pub name: String,
    /// Terminal pane reference (e.g. tmux `%12`).
    pub pane_id: Option<String>,
    /// Path to the append-only transcript for this session.
    pub transcript_path: Option<String>,
    /// Command currently tracked for this agent.
    pub active_command_id: Option<Uuid>,
    /// Number of transcript entries already reconciled.
    pub transcript_cursor: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            pane_id: None,
            transcript_path: None,
            active_command_id: None,
            transcript_cursor: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_pane(mut self, pane_id: impl Into<String>) -> Self {
        self.pane_id = Some(pane_id.into());
        self
    }

    pub fn with_transcript(mut self, path: impl Into<String>) -> Self {
        self.transcript_path = Some(path.into());
        self
    }

    /// The agent's state is its active command's state, or idle.
    pub fn effective_state(&self, active: Option<&Command>) -> CommandState {
        match (self.active_command_id, active) {
            (Some(id), Some(command)) if command.id == id => command.state,
            _ => CommandState::Idle,
        }
    }
}

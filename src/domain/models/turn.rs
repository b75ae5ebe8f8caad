//! Turn domain model.
//!
//! A turn is one recorded utterance (user or agent) inside a command.
//! Turns are written once and never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnActor {
    /// The human operator.
    User,
    /// The coding agent.
    Agent,
}

impl TurnActor {
    pub const ALL: [TurnActor; 2] = [Self::User, Self::Agent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" | "human" => Some(Self::User),
            "agent" | "assistant" => Some(Self::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for TurnActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a turn means for the command lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnIntent {
    /// A top-level instruction from the user.
    Command,
    /// The user answering an agent question.
    Answer,
    /// The agent asking for input.
    Question,
    /// Intermediate agent output.
    Progress,
    /// The agent reporting the work as done.
    Completion,
    /// Explicit end-of-command marker.
    EndOfCommand,
}

impl TurnIntent {
    pub const ALL: [TurnIntent; 6] = [
        Self::Command,
        Self::Answer,
        Self::Question,
        Self::Progress,
        Self::Completion,
        Self::EndOfCommand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Answer => "answer",
            Self::Question => "question",
            Self::Progress => "progress",
            Self::Completion => "completion",
            Self::EndOfCommand => "end_of_command",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "command" => Some(Self::Command),
            "answer" => Some(Self::Answer),
            "question" => Some(Self::Question),
            "progress" => Some(Self::Progress),
            "completion" => Some(Self::Completion),
            "end_of_command" | "end-of-command" => Some(Self::EndOfCommand),
            _ => None,
        }
    }
}

impl fmt::Display for TurnIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which capture path produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSource {
    /// Fast path: a hook event delivered by the agent session.
    Hook,
    /// Recovery path: created from the authoritative transcript.
    Reconciler,
    /// Text the operator sent through the dashboard.
    Operator,
}

impl Default for TurnSource {
    fn default() -> Self {
        Self::Hook
    }
}

impl TurnSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hook => "hook",
            Self::Reconciler => "reconciler",
            Self::Operator => "operator",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hook" => Some(Self::Hook),
            "reconciler" => Some(Self::Reconciler),
            "operator" => Some(Self::Operator),
            _ => None,
        }
    }
}

/// A persisted turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    /// Parent command.
    pub command_id: Uuid,
    /// Owning agent (denormalized from the command).
    pub agent_id: Uuid,
    pub actor: TurnActor,
    pub intent: TurnIntent,
    pub text: String,
    /// When the utterance happened.
    pub timestamp: DateTime<Utc>,
    /// Content key; `None` for turns written before hashing existed.
    pub content_hash: Option<String>,
    /// Classifier confidence for the intent (1.0 for hook-reported intents).
    pub source_confidence: f64,
    pub source: TurnSource,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to write a turn under a known command.
#[derive(Debug, Clone)]
pub struct TurnDraft {
    pub actor: TurnActor,
    pub intent: TurnIntent,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub content_hash: Option<String>,
    pub source_confidence: f64,
    pub source: TurnSource,
}

impl TurnDraft {
    pub fn new(actor: TurnActor, intent: TurnIntent, text: impl Into<String>) -> Self {
        Self {
            actor,
            intent,
            text: text.into(),
            timestamp: Utc::now(),
            content_hash: None,
            source_confidence: 1.0,
            source: TurnSource::Hook,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.source_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_source(mut self, source: TurnSource) -> Self {
        self.source = source;
        self
    }

    /// Materialize the draft as a turn belonging to `command_id`.
    pub fn into_turn(self, command_id: Uuid, agent_id: Uuid) -> Turn {
        Turn {
            id: Uuid::new_v4(),
            command_id,
            agent_id,
            actor: self.actor,
            intent: self.intent,
            text: self.text,
            timestamp: self.timestamp,
            content_hash: self.content_hash,
            source_confidence: self.source_confidence,
            source: self.source,
            created_at: Utc::now(),
        }
    }
}

//! Notification channel for the dashboard.
//!
//! A broadcast channel with sequence numbering. Publishing is synchronous,
//! never blocks and never fails the caller: with no subscribers the event is
//! dropped, and a slow subscriber lags instead of applying back-pressure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::{CommandState, EventsConfig, TurnActor, TurnIntent, TurnSource};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Event category for filtering and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Turn,
    Command,
    Watchdog,
    Reconciler,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Turn => write!(f, "turn"),
            Self::Command => write!(f, "command"),
            Self::Watchdog => write!(f, "watchdog"),
            Self::Reconciler => write!(f, "reconciler"),
        }
    }
}

/// Event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub category: EventCategory,
    pub agent_id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub payload: EventPayload,
}

impl UnifiedEvent {
    /// Wrap a payload; the sequence number is assigned on publish.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            sequence: SequenceNumber::zero(),
            timestamp: Utc::now(),
            severity: payload.severity(),
            category: payload.category(),
            agent_id: payload.agent_id(),
            correlation_id: None,
            payload,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    TurnCreated {
        turn_id: Uuid,
        command_id: Uuid,
        agent_id: Uuid,
        actor: TurnActor,
        intent: TurnIntent,
        source: TurnSource,
    },
    StateChange {
        command_id: Uuid,
        agent_id: Uuid,
        turn_id: Option<Uuid>,
        from: CommandState,
        to: CommandState,
    },
    /// The turn is stored but its transition was rejected or failed.
    StatePending {
        command_id: Uuid,
        agent_id: Uuid,
        turn_id: Uuid,
        state: CommandState,
        reason: String,
    },
    GapDetected {
        agent_id: Uuid,
        pane_id: String,
        gap_ms: u64,
    },
    ReconciliationCompleted {
        agent_id: Uuid,
        partial: bool,
        created_count: usize,
        corrected_count: usize,
        examined_count: usize,
    },
}

impl EventPayload {
    /// Wire name of the event, as seen by subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TurnCreated { .. } => "turn_created",
            Self::StateChange { .. } => "state_change",
            Self::StatePending { .. } => "state_pending",
            Self::GapDetected { .. } => "gap_detected",
            Self::ReconciliationCompleted { .. } => "reconciliation_completed",
        }
    }

    pub fn agent_id(&self) -> Uuid {
        match self {
            Self::TurnCreated { agent_id, .. }
            | Self::StateChange { agent_id, .. }
            | Self::StatePending { agent_id, .. }
            | Self::GapDetected { agent_id, .. }
            | Self::ReconciliationCompleted { agent_id, .. } => *agent_id,
        }
    }

    fn severity(&self) -> EventSeverity {
        match self {
            Self::StatePending { .. } | Self::GapDetected { .. } => EventSeverity::Warning,
            Self::TurnCreated { .. } | Self::StateChange { .. } => EventSeverity::Info,
            Self::ReconciliationCompleted { created_count, .. } if *created_count > 0 => EventSeverity::Warning,
            Self::ReconciliationCompleted { .. } => EventSeverity::Debug,
        }
    }

    fn category(&self) -> EventCategory {
        match self {
            Self::TurnCreated { .. } => EventCategory::Turn,
            Self::StateChange { .. } | Self::StatePending { .. } => EventCategory::Command,
            Self::GapDetected { .. } => EventCategory::Watchdog,
            Self::ReconciliationCompleted { .. } => EventCategory::Reconciler,
        }
    }
}

/// Broadcast event bus shared by every capture path.
pub struct EventBus {
    sender: broadcast::Sender<UnifiedEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(config: &EventsConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Assign a sequence number and broadcast.
    pub fn publish(&self, mut event: UnifiedEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        event.sequence = SequenceNumber(seq);
        tracing::trace!(event = event.payload.name(), sequence = seq, agent_id = %event.agent_id, "Publishing event");

        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn emit(&self, payload: EventPayload) {
        self.publish(UnifiedEvent::new(payload));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UnifiedEvent> {
        self.sender.subscribe()
    }

    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(&EventsConfig::default())
    }
}

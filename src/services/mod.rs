//! Application services: turn capture, reconciliation and pane watching.

pub mod event_bus;
pub mod lifecycle_manager;
pub mod reconciler;
pub mod reconciliation_daemon;
pub mod reconciliation_lock;
pub mod responder;
pub mod watchdog;

pub use event_bus::{EventBus, EventCategory, EventPayload, EventSeverity, UnifiedEvent};
pub use lifecycle_manager::{
    CapturedTurn, CommandLifecycleManager, TransitionError, TransitionOutcome, TurnCapture,
};
pub use reconciler::{ReconcileReport, ReconcileStatus, TranscriptReconciler};
pub use reconciliation_daemon::{DaemonHandle, ReconciliationDaemon, SweepReport};
pub use reconciliation_lock::{ReconciliationGuard, ReconciliationLockRegistry};
pub use responder::{OperatorResponder, RespondError};
pub use watchdog::{TerminalWatchdog, TickReport, WatchdogHandle};

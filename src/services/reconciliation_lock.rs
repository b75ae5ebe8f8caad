//! Per-agent reconciliation locks.
//!
//! One async mutex per agent, created on first use and never removed. Only
//! `try_acquire` is offered: a caller that finds the lock held does not wait.
//! Not reentrant; a holder that tries again gets `None`. Holding is tracked
//! by a flag next to each mutex, so `is_held` never touches the mutex and
//! cannot make a concurrent `try_acquire` fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Proof that the caller holds an agent's reconciliation lock.
/// Dropping it releases the lock.
#[derive(Debug)]
pub struct ReconciliationGuard {
    agent_id: Uuid,
    held: Arc<AtomicBool>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for ReconciliationGuard {
    fn drop(&mut self) {
        // Cleared while the mutex is still ours; fields drop after this.
        self.held.store(false, Ordering::Release);
    }
}

impl ReconciliationGuard {
    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

#[derive(Debug, Default)]
struct LockSlot {
    mutex: Arc<AsyncMutex<()>>,
    held: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
pub struct ReconciliationLockRegistry {
    locks: Mutex<HashMap<Uuid, LockSlot>>,
}

impl ReconciliationLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_for(&self, agent_id: Uuid) -> (Arc<AsyncMutex<()>>, Arc<AtomicBool>) {
        // A poisoned map only means another thread panicked mid-insert; the
        // map itself is still usable.
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let slot = locks.entry(agent_id).or_default();
        (slot.mutex.clone(), slot.held.clone())
    }

    /// Take the agent's lock without waiting, or `None` if it is held.
    pub fn try_acquire(&self, agent_id: Uuid) -> Option<ReconciliationGuard> {
        let (mutex, held) = self.slot_for(agent_id);
        let guard = mutex.try_lock_owned().ok()?;
        held.store(true, Ordering::Release);
        Some(ReconciliationGuard {
            agent_id,
            held,
            _guard: guard,
        })
    }

    /// Whether some caller currently holds the agent's lock.
    pub fn is_held(&self, agent_id: Uuid) -> bool {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .get(&agent_id)
            .is_some_and(|slot| slot.held.load(Ordering::Acquire))
    }
}

//! Terminal watchdog.
//!
//! Polls each registered agent's pane, hashes what it sees, and checks new
//! output against recently recorded turns. Output that no turn explains for
//! longer than the gap threshold means the fast path lost something, so the
//! agent is handed to the reconciler.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{normalize, Turn, WatchdogConfig};
use crate::domain::ports::{AgentRepository, BridgeError, TerminalBridge, TurnRepository};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::reconciler::TranscriptReconciler;

/// Minimum length for a pane line or turn text to count in overlap checks.
const MIN_OVERLAP_CHARS: usize = 3;

#[derive(Debug, Clone)]
struct PaneState {
    pane_id: Option<String>,
    last_hash: Option<String>,
    gap_started: Option<Instant>,
}

impl PaneState {
    fn new(pane_id: Option<String>) -> Self {
        Self {
            pane_id,
            last_hash: None,
            gap_started: None,
        }
    }
}

/// What one poll of one agent found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneObservation {
    Baseline,
    Unchanged,
    /// New output overlaps a recent turn.
    Explained,
    /// Unexplained output, still under the threshold.
    GapOpen,
    /// Threshold reached and the reconciler ran.
    Reconciled,
    /// Threshold reached but another reconciliation holds the lock.
    LockBusy,
    /// Agent was unregistered mid-sweep.
    Gone,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub agents_checked: usize,
    pub skipped_no_pane: usize,
    pub baselines: usize,
    pub unchanged: usize,
    pub explained: usize,
    pub gaps_open: usize,
    pub escalations: usize,
    pub reconciled: usize,
    pub lock_busy: usize,
    pub capture_failures: usize,
}

impl TickReport {
    fn record(&mut self, observation: PaneObservation) {
        match observation {
            PaneObservation::Baseline => self.baselines += 1,
            PaneObservation::Unchanged => self.unchanged += 1,
            PaneObservation::Explained => self.explained += 1,
            PaneObservation::GapOpen => self.gaps_open += 1,
            PaneObservation::Reconciled => {
                self.escalations += 1;
                self.reconciled += 1;
            }
            PaneObservation::LockBusy => {
                self.escalations += 1;
                self.lock_busy += 1;
            }
            PaneObservation::Gone => {}
        }
    }
}

fn pane_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// The last `count` pane lines worth comparing against turns.
fn snippet(content: &str, count: usize) -> Vec<String> {
    let mut lines: Vec<String> = content
        .lines()
        .rev()
        .map(normalize)
        .filter(|l| l.chars().filter(|c| c.is_alphanumeric()).count() >= MIN_OVERLAP_CHARS)
        .take(count)
        .collect();
    lines.reverse();
    lines
}

/// Whether any snippet line and any recent turn share text.
fn overlaps(lines: &[String], turns: &[Turn]) -> bool {
    turns.iter().any(|turn| {
        let text = normalize(&turn.text);
        if text.chars().count() < MIN_OVERLAP_CHARS {
            return false;
        }
        lines.iter().any(|line| text.contains(line.as_str()) || line.contains(text.as_str()))
    })
}

pub struct TerminalWatchdog {
    bridge: Arc<dyn TerminalBridge>,
    agents: Arc<dyn AgentRepository>,
    turns: Arc<dyn TurnRepository>,
    reconciler: Arc<TranscriptReconciler>,
    events: Arc<EventBus>,
    config: WatchdogConfig,
    watched: Mutex<HashMap<Uuid, PaneState>>,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl TerminalWatchdog {
    pub fn new(
        bridge: Arc<dyn TerminalBridge>,
        agents: Arc<dyn AgentRepository>,
        turns: Arc<dyn TurnRepository>,
        reconciler: Arc<TranscriptReconciler>,
        events: Arc<EventBus>,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            bridge,
            agents,
            turns,
            reconciler,
            events,
            config,
            watched: Mutex::new(HashMap::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Watch an agent. Re-registering with the same pane keeps its state.
    pub async fn register(&self, agent_id: Uuid, pane_id: Option<String>) {
        let mut watched = self.watched.lock().await;
        match watched.get(&agent_id) {
            Some(state) if state.pane_id == pane_id => {}
            _ => {
                debug!(agent_id = %agent_id, pane_id = ?pane_id, "Watching agent");
                watched.insert(agent_id, PaneState::new(pane_id));
            }
        }
    }

    /// Stop watching an agent and forget its hash and gap timer.
    pub async fn unregister(&self, agent_id: Uuid) {
        if self.watched.lock().await.remove(&agent_id).is_some() {
            debug!(agent_id = %agent_id, "Stopped watching agent");
        }
    }

    pub async fn is_registered(&self, agent_id: Uuid) -> bool {
        self.watched.lock().await.contains_key(&agent_id)
    }

    /// Register every stored agent. Returns how many are watched.
    pub async fn sync_from_store(&self) -> DomainResult<usize> {
        for agent in self.agents.list().await? {
            self.register(agent.id, agent.pane_id).await;
        }
        Ok(self.watched.lock().await.len())
    }

    /// One sweep over all registered agents.
    pub async fn tick(&self) -> TickReport {
        let targets: Vec<(Uuid, Option<String>)> = self
            .watched
            .lock()
            .await
            .iter()
            .map(|(id, state)| (*id, state.pane_id.clone()))
            .collect();

        let mut report = TickReport::default();
        for (agent_id, pane_id) in targets {
            let Some(pane_id) = pane_id else {
                report.skipped_no_pane += 1;
                continue;
            };
            report.agents_checked += 1;

            match self.observe(agent_id, &pane_id).await {
                Ok(observation) => report.record(observation),
                Err(e) => {
                    debug!(agent_id = %agent_id, pane_id = %pane_id, error = %e, "Pane capture failed");
                    report.capture_failures += 1;
                }
            }
        }
        report
    }

    async fn observe(&self, agent_id: Uuid, pane_id: &str) -> Result<PaneObservation, BridgeError> {
        let content = self
            .bridge
            .capture_pane(pane_id, self.config.capture_lines, self.config.capture_timeout())
            .await?;
        let hash = pane_hash(&content);

        let changed = {
            let mut watched = self.watched.lock().await;
            let Some(state) = watched.get_mut(&agent_id) else {
                return Ok(PaneObservation::Gone);
            };
            match state.last_hash.replace(hash.clone()) {
                None => return Ok(PaneObservation::Baseline),
                Some(previous) if previous == hash => {
                    if state.gap_started.is_none() {
                        return Ok(PaneObservation::Unchanged);
                    }
                    false
                }
                Some(_) => true,
            }
        };

        if changed {
            let since = chrono::Utc::now()
                .checked_sub_signed(self.config.recent_turn_window())
                .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
            let recent = match self.turns.list_for_agent_since(agent_id, since).await {
                Ok(turns) => turns,
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "Could not load recent turns");
                    Vec::new()
                }
            };

            let explained = overlaps(&snippet(&content, self.config.snippet_lines), &recent);
            let mut watched = self.watched.lock().await;
            let Some(state) = watched.get_mut(&agent_id) else {
                return Ok(PaneObservation::Gone);
            };
            if explained {
                state.gap_started = None;
                return Ok(PaneObservation::Explained);
            }
            state.gap_started.get_or_insert_with(Instant::now);
        }

        Ok(self.evaluate_gap(agent_id, pane_id).await)
    }

    async fn evaluate_gap(&self, agent_id: Uuid, pane_id: &str) -> PaneObservation {
        let age = {
            let watched = self.watched.lock().await;
            match watched.get(&agent_id).and_then(|s| s.gap_started) {
                Some(started) => started.elapsed(),
                None => return PaneObservation::Gone,
            }
        };
        if age < self.config.gap_threshold() {
            return PaneObservation::GapOpen;
        }

        let gap_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX);
        info!(agent_id = %agent_id, pane_id = %pane_id, gap_ms, "Unexplained pane output, escalating to reconciler");
        self.events.emit(EventPayload::GapDetected {
            agent_id,
            pane_id: pane_id.to_string(),
            gap_ms,
        });

        let Some(guard) = self.reconciler.locks().try_acquire(agent_id) else {
            debug!(agent_id = %agent_id, "Reconciliation in progress, keeping gap timer");
            return PaneObservation::LockBusy;
        };

        match self.reconciler.reconcile_with_guard(&guard, agent_id).await {
            Ok(report) => debug!(agent_id = %agent_id, created = report.created_count, "Gap reconciled"),
            Err(e) => warn!(agent_id = %agent_id, error = %e, "Gap reconciliation failed"),
        }
        drop(guard);

        if let Some(state) = self.watched.lock().await.get_mut(&agent_id) {
            state.gap_started = None;
        }
        PaneObservation::Reconciled
    }

    /// Spawn the polling loop.
    pub fn start(self: Arc<Self>) -> WatchdogHandle {
        self.stop_flag.store(false, Ordering::Release);
        let stop_flag = self.stop_flag.clone();
        let wake = self.wake.clone();
        let watchdog = self;

        let join = tokio::spawn(async move {
            let mut timer = interval(watchdog.config.poll_interval());
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(poll_interval_ms = watchdog.config.poll_interval_ms, "Terminal watchdog started");

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if watchdog.stop_flag.load(Ordering::Acquire) {
                            break;
                        }
                        let report = watchdog.tick().await;
                        if report.escalations > 0 || report.capture_failures > 0 {
                            debug!(?report, "Watchdog sweep");
                        }
                    }
                    _ = watchdog.wake.notified() => {}
                }

                if watchdog.stop_flag.load(Ordering::Acquire) {
                    break;
                }
            }

            info!("Terminal watchdog stopped");
        });

        WatchdogHandle { stop_flag, wake, join }
    }
}

/// Control handle for a running watchdog loop.
pub struct WatchdogHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    join: JoinHandle<()>,
}

impl WatchdogHandle {
    /// Request the loop to stop after the current sweep.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.join.await {
            warn!(error = %e, "Watchdog task ended abnormally");
        }
    }
}

//! Periodic reconciliation daemon.
//!
//! Sweeps every stored agent through the reconciler on a fixed interval.
//! This bounds how long a turn can stay missing when both the fast path and
//! the watchdog miss it. Agents whose lock is held are skipped until the
//! next sweep.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::AgentRepository;
use crate::services::reconciler::TranscriptReconciler;

/// Result of one sweep over all agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub agents: usize,
    pub reconciled: usize,
    pub skipped_busy: usize,
    pub skipped_no_transcript: usize,
    pub failed: usize,
    pub turns_created: usize,
}

/// Status of the daemon.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub running: bool,
    pub total_runs: u64,
    pub failed_runs: u64,
    pub turns_created: u64,
    pub last_run: Option<Instant>,
}

/// Handle to control the daemon.
pub struct DaemonHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<DaemonStatus>>,
    join: JoinHandle<()>,
}

impl DaemonHandle {
    /// Request the daemon to stop.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }

    /// Stop and wait for the current sweep to finish.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.join.await {
            warn!(error = %e, "Reconciliation daemon ended abnormally");
        }
    }
}

pub struct ReconciliationDaemon {
    reconciler: Arc<TranscriptReconciler>,
    agents: Arc<dyn AgentRepository>,
    interval: Duration,
    run_on_startup: bool,
    status: Arc<RwLock<DaemonStatus>>,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ReconciliationDaemon {
    pub fn new(reconciler: Arc<TranscriptReconciler>, agents: Arc<dyn AgentRepository>, interval: Duration) -> Self {
        Self {
            reconciler,
            agents,
            interval,
            run_on_startup: true,
            status: Arc::new(RwLock::new(DaemonStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn with_run_on_startup(mut self, run_on_startup: bool) -> Self {
        self.run_on_startup = run_on_startup;
        self
    }

    /// Reconcile every stored agent once.
    pub async fn run_once(&self) -> DomainResult<SweepReport> {
        let agents = self.agents.list().await?;
        let mut report = SweepReport {
            agents: agents.len(),
            ..SweepReport::default()
        };

        for agent in agents {
            match self.reconciler.reconcile_agent(agent.id).await {
                Ok(r) if r.in_progress => report.skipped_busy += 1,
                Ok(r) => {
                    report.reconciled += 1;
                    report.turns_created += r.created_count;
                }
                Err(DomainError::TranscriptUnavailable { reason, .. }) => {
                    debug!(agent_id = %agent.id, reason = %reason, "No transcript to reconcile");
                    report.skipped_no_transcript += 1;
                }
                Err(e) => {
                    warn!(agent_id = %agent.id, error = %e, "Periodic reconciliation failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn run_cycle(&self) {
        let result = self.run_once().await;
        let mut status = self.status.write().await;
        status.total_runs += 1;
        status.last_run = Some(Instant::now());
        match result {
            Ok(report) => {
                status.turns_created += report.turns_created as u64;
                if report.turns_created > 0 {
                    info!(
                        run = status.total_runs,
                        agents = report.agents,
                        turns_created = report.turns_created,
                        "Periodic reconciliation recovered turns"
                    );
                }
            }
            Err(e) => {
                status.failed_runs += 1;
                warn!(error = %e, "Periodic reconciliation sweep failed");
            }
        }
    }

    /// Spawn the daemon loop.
    pub fn start(self) -> DaemonHandle {
        let stop_flag = self.stop_flag.clone();
        let wake = self.wake.clone();
        let status = self.status.clone();

        let join = tokio::spawn(async move {
            self.status.write().await.running = true;
            info!(interval_secs = self.interval.as_secs(), "Reconciliation daemon started");

            let mut timer = interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately.
            if !self.run_on_startup {
                timer.tick().await;
            }

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if self.stop_flag.load(Ordering::Acquire) {
                            break;
                        }
                        self.run_cycle().await;
                    }
                    _ = self.wake.notified() => {}
                }

                if self.stop_flag.load(Ordering::Acquire) {
                    break;
                }
            }

            self.status.write().await.running = false;
            info!("Reconciliation daemon stopped");
        });

        DaemonHandle {
            stop_flag,
            wake,
            status,
            join,
        }
    }
}

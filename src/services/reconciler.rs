//! Transcript reconciler.
//!
//! Walks the agent's append-only transcript from its cursor and makes sure
//! every entry has a stored turn. Entries are matched to existing turns by
//! content key (current or legacy format) within a time window, then by time
//! window alone for turns stored before hashing existed. Anything left is
//! classified and captured through the lifecycle manager like a live turn.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    content_key, is_legacy_hash, ContentKeys, ReconcilerConfig, TranscriptEntry, Turn, TurnDraft, TurnSource,
};
use crate::domain::ports::{Classification, IntentClassifier, TranscriptSource};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::lifecycle_manager::{CommandLifecycleManager, TurnCapture};
use crate::services::reconciliation_lock::{ReconciliationGuard, ReconciliationLockRegistry};

pub const IN_PROGRESS_MESSAGE: &str = "reconciliation already in progress";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStatus {
    Ok,
    /// The per-call cap was reached; more entries remain past the cursor.
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub agent_id: Uuid,
    pub status: ReconcileStatus,
    /// Another reconciliation held the lock; nothing was done.
    pub in_progress: bool,
    pub created_count: usize,
    pub matched_count: usize,
    pub backfilled_count: usize,
    /// Matched turns whose legacy-format hash was rewritten to the full-text key.
    pub upgraded_count: usize,
    pub corrected_count: usize,
    /// Created turns whose transition was rejected or failed.
    pub pending_count: usize,
    pub examined_count: usize,
    pub remaining_count: usize,
    pub cursor: u64,
    pub created_turn_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReconcileReport {
    fn empty(agent_id: Uuid, cursor: u64) -> Self {
        Self {
            agent_id,
            status: ReconcileStatus::Ok,
            in_progress: false,
            created_count: 0,
            matched_count: 0,
            backfilled_count: 0,
            upgraded_count: 0,
            corrected_count: 0,
            pending_count: 0,
            examined_count: 0,
            remaining_count: 0,
            cursor,
            created_turn_ids: Vec::new(),
            message: None,
        }
    }

    pub fn in_progress(agent_id: Uuid) -> Self {
        Self {
            in_progress: true,
            message: Some(IN_PROGRESS_MESSAGE.to_string()),
            ..Self::empty(agent_id, 0)
        }
    }
}

fn distance(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

pub struct TranscriptReconciler {
    lifecycle: Arc<CommandLifecycleManager>,
    transcripts: Arc<dyn TranscriptSource>,
    classifier: Arc<dyn IntentClassifier>,
    locks: Arc<ReconciliationLockRegistry>,
    events: Arc<EventBus>,
    config: ReconcilerConfig,
}

impl TranscriptReconciler {
    pub fn new(
        lifecycle: Arc<CommandLifecycleManager>,
        transcripts: Arc<dyn TranscriptSource>,
        classifier: Arc<dyn IntentClassifier>,
        locks: Arc<ReconciliationLockRegistry>,
        events: Arc<EventBus>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            lifecycle,
            transcripts,
            classifier,
            locks,
            events,
            config,
        }
    }

    pub fn locks(&self) -> &Arc<ReconciliationLockRegistry> {
        &self.locks
    }

    /// On-demand entry point. Returns immediately if the agent is already
    /// being reconciled.
    pub async fn reconcile_agent(&self, agent_id: Uuid) -> DomainResult<ReconcileReport> {
        let Some(guard) = self.locks.try_acquire(agent_id) else {
            debug!(agent_id = %agent_id, "Reconciliation skipped, lock held");
            return Ok(ReconcileReport::in_progress(agent_id));
        };
        self.reconcile_with_guard(&guard, agent_id).await
    }

    /// Reconcile under a lock the caller already holds.
    pub async fn reconcile_with_guard(
        &self,
        guard: &ReconciliationGuard,
        agent_id: Uuid,
    ) -> DomainResult<ReconcileReport> {
        if guard.agent_id() != agent_id {
            return Err(DomainError::ValidationFailed(format!(
                "lock for agent {} cannot cover agent {}",
                guard.agent_id(),
                agent_id
            )));
        }

        let agent = self
            .lifecycle
            .agents()
            .get(agent_id)
            .await?
            .ok_or(DomainError::AgentNotFound(agent_id))?;

        let entries = self
            .transcripts
            .read_entries(&agent)
            .await
            .map_err(|e| DomainError::TranscriptUnavailable {
                agent_id,
                reason: e.to_string(),
            })?;

        let total = entries.len();
        let mut cursor = usize::try_from(agent.transcript_cursor).unwrap_or(usize::MAX);
        if cursor > total {
            info!(agent_id = %agent_id, cursor, total, "Transcript shorter than cursor, rescanning from start");
            cursor = 0;
        }
        let end = total.min(cursor.saturating_add(self.config.max_entries_per_call.max(1)));
        let batch = &entries[cursor..end];

        let mut report = ReconcileReport::empty(agent_id, cursor as u64);
        if !batch.is_empty() {
            self.reconcile_batch(agent_id, batch, &mut report).await?;
        }

        report.examined_count = batch.len();
        report.remaining_count = total - end;
        report.cursor = end as u64;
        if report.remaining_count > 0 {
            report.status = ReconcileStatus::Partial;
        }
        if agent.transcript_cursor != report.cursor {
            self.lifecycle
                .agents()
                .update_transcript_cursor(agent_id, report.cursor)
                .await?;
        }

        debug!(
            agent_id = %agent_id,
            examined = report.examined_count,
            created = report.created_count,
            matched = report.matched_count,
            corrected = report.corrected_count,
            remaining = report.remaining_count,
            "Reconciliation finished"
        );
        self.events.emit(EventPayload::ReconciliationCompleted {
            agent_id,
            partial: report.status == ReconcileStatus::Partial,
            created_count: report.created_count,
            corrected_count: report.corrected_count,
            examined_count: report.examined_count,
        });

        Ok(report)
    }

    async fn reconcile_batch(
        &self,
        agent_id: Uuid,
        batch: &[TranscriptEntry],
        report: &mut ReconcileReport,
    ) -> DomainResult<()> {
        let window = self.config.match_window();
        let earliest = batch.iter().map(|e| e.timestamp).min().unwrap_or_else(Utc::now);
        let since = earliest.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let candidates = self.lifecycle.turns().list_for_agent_since(agent_id, since).await?;
        let prefix_chars = self.config.legacy_prefix_chars;
        let legacy: HashSet<Uuid> = candidates
            .iter()
            .filter(|t| {
                t.content_hash
                    .as_deref()
                    .is_some_and(|h| is_legacy_hash(t.actor, &t.text, h, prefix_chars))
            })
            .map(|t| t.id)
            .collect();
        let mut consumed: HashSet<Uuid> = HashSet::new();

        for entry in batch {
            let keys = ContentKeys::compute(entry.actor, &entry.text, prefix_chars);

            let by_key = self.closest(&candidates, &consumed, entry, |t| {
                t.content_hash
                    .as_deref()
                    .is_some_and(|h| keys.matches(h, legacy.contains(&t.id)))
            });
            if let Some(turn) = by_key {
                consumed.insert(turn.id);
                report.matched_count += 1;
                if legacy.contains(&turn.id) {
                    self.upgrade_legacy_hash(turn, report).await?;
                }
                self.correct_timestamp(turn, entry, report).await?;
                continue;
            }

            let by_time = self.closest(&candidates, &consumed, entry, |t| t.content_hash.is_none());
            if let Some(turn) = by_time {
                consumed.insert(turn.id);
                if self.lifecycle.turns().backfill_content_hash(turn.id, &keys.current).await? {
                    report.backfilled_count += 1;
                    debug!(turn_id = %turn.id, agent_id = %agent_id, "Back-filled content hash");
                }
                report.matched_count += 1;
                self.correct_timestamp(turn, entry, report).await?;
                continue;
            }

            self.recover(agent_id, entry, keys.current, report).await?;
        }

        Ok(())
    }

    /// Closest unconsumed same-actor turn within the match window that
    /// satisfies `accept`.
    fn closest<'a>(
        &self,
        candidates: &'a [Turn],
        consumed: &HashSet<Uuid>,
        entry: &TranscriptEntry,
        accept: impl Fn(&Turn) -> bool,
    ) -> Option<&'a Turn> {
        let window = self.config.match_window();
        candidates
            .iter()
            .filter(|t| t.actor == entry.actor && !consumed.contains(&t.id))
            .filter(|t| distance(t.timestamp, entry.timestamp) <= window)
            .filter(|&t| accept(t))
            .min_by_key(|t| distance(t.timestamp, entry.timestamp))
    }

    /// A legacy key only covers a prefix, so once its entry is found the
    /// turn gets its full-text key and cannot claim a later entry that
    /// shares the prefix.
    async fn upgrade_legacy_hash(&self, turn: &Turn, report: &mut ReconcileReport) -> DomainResult<()> {
        let Some(stored) = turn.content_hash.as_deref() else {
            return Ok(());
        };
        let full = content_key(turn.actor, &turn.text);
        if self.lifecycle.turns().upgrade_content_hash(turn.id, stored, &full).await? {
            report.upgraded_count += 1;
            debug!(turn_id = %turn.id, agent_id = %turn.agent_id, "Upgraded legacy content hash");
        }
        Ok(())
    }

    async fn correct_timestamp(
        &self,
        turn: &Turn,
        entry: &TranscriptEntry,
        report: &mut ReconcileReport,
    ) -> DomainResult<()> {
        let drift = distance(turn.timestamp, entry.timestamp);
        if drift <= self.config.timestamp_tolerance() {
            return Ok(());
        }
        self.lifecycle.turns().correct_timestamp(turn.id, entry.timestamp).await?;
        report.corrected_count += 1;
        info!(
            turn_id = %turn.id,
            agent_id = %turn.agent_id,
            intent = %turn.intent,
            drift_ms = drift.num_milliseconds(),
            outcome = "timestamp_corrected",
            "Corrected turn timestamp from transcript"
        );
        Ok(())
    }

    async fn recover(
        &self,
        agent_id: Uuid,
        entry: &TranscriptEntry,
        content_hash: String,
        report: &mut ReconcileReport,
    ) -> DomainResult<()> {
        let classification = self
            .classifier
            .classify(&entry.text, entry.actor)
            .unwrap_or_else(|e| {
                warn!(agent_id = %agent_id, actor = %entry.actor, error = %e, "Classification failed, using fallback intent");
                Classification::fallback(entry.actor)
            });

        let draft = TurnDraft::new(entry.actor, classification.intent, entry.text.clone())
            .with_timestamp(entry.timestamp)
            .with_content_hash(content_hash)
            .with_confidence(classification.confidence)
            .with_source(TurnSource::Reconciler);

        let captured = self.lifecycle.capture_turn(TurnCapture::new(agent_id, draft)).await?;
        if captured.outcome.is_pending() {
            report.pending_count += 1;
        }
        report.created_count += 1;
        report.created_turn_ids.push(captured.turn.id);

        info!(
            turn_id = %captured.turn.id,
            agent_id = %agent_id,
            intent = %captured.turn.intent,
            confidence = captured.turn.source_confidence,
            outcome = ?captured.outcome,
            "Recovered missing turn from transcript"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{InMemoryTranscriptSource, ScriptedIntentClassifier};
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteAgentRepository, SqliteCommandRepository, SqliteTurnRepository,
    };
    use crate::domain::models::{Agent, TurnActor, TurnIntent};
    use crate::domain::ports::AgentRepository;

    struct Fixture {
        reconciler: TranscriptReconciler,
        lifecycle: Arc<CommandLifecycleManager>,
        transcripts: InMemoryTranscriptSource,
        agent: Agent,
    }

    async fn setup(config: ReconcilerConfig) -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let bus = Arc::new(EventBus::default());
        let lifecycle = Arc::new(CommandLifecycleManager::new(
            agents.clone(),
            Arc::new(SqliteCommandRepository::new(pool.clone())),
            Arc::new(SqliteTurnRepository::new(pool)),
            bus.clone(),
        ));
        let agent = Agent::new("worker");
        agents.create(&agent).await.unwrap();

        let transcripts = InMemoryTranscriptSource::new();
        let reconciler = TranscriptReconciler::new(
            lifecycle.clone(),
            Arc::new(transcripts.clone()),
            Arc::new(ScriptedIntentClassifier::new()),
            Arc::new(ReconciliationLockRegistry::new()),
            bus,
            config,
        );
        Fixture {
            reconciler,
            lifecycle,
            transcripts,
            agent,
        }
    }

    fn entry(actor: TurnActor, text: &str, secs_ago: i64) -> TranscriptEntry {
        TranscriptEntry::new(actor, text, Utc::now() - Duration::seconds(secs_ago))
    }

    #[tokio::test]
    async fn test_creates_missing_turns_in_order() {
        let fx = setup(ReconcilerConfig::default()).await;
        fx.transcripts
            .set(
                fx.agent.id,
                vec![
                    entry(TurnActor::User, "Add pagination", 30),
                    entry(TurnActor::Agent, "Reading the handler", 20),
                    entry(TurnActor::Agent, "Should I proceed?", 10),
                ],
            )
            .await;

        let report = fx.reconciler.reconcile_agent(fx.agent.id).await.unwrap();
        assert_eq!(report.status, ReconcileStatus::Ok);
        assert_eq!(report.created_count, 3);
        assert_eq!(report.cursor, 3);
        assert_eq!(
            fx.lifecycle.agent_state(fx.agent.id).await.unwrap(),
            crate::domain::models::CommandState::AwaitingInput
        );
    }

    #[tokio::test]
    async fn test_lock_contention_returns_in_progress() {
        let fx = setup(ReconcilerConfig::default()).await;
        let _held = fx.reconciler.locks().try_acquire(fx.agent.id).unwrap();

        let report = fx.reconciler.reconcile_agent(fx.agent.id).await.unwrap();
        assert!(report.in_progress);
        assert_eq!(report.created_count, 0);
        assert_eq!(report.message.as_deref(), Some(IN_PROGRESS_MESSAGE));
        assert_eq!(fx.transcripts.read_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_for_other_agent_is_refused() {
        let fx = setup(ReconcilerConfig::default()).await;
        let guard = fx.reconciler.locks().try_acquire(Uuid::new_v4()).unwrap();
        let err = fx.reconciler.reconcile_with_guard(&guard, fx.agent.id).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_timestamp_correction() {
        let fx = setup(ReconcilerConfig::default()).await;
        let hooked = fx
            .lifecycle
            .capture_turn(TurnCapture::new(
                fx.agent.id,
                TurnDraft::new(TurnActor::User, TurnIntent::Command, "Run the tests"),
            ))
            .await
            .unwrap();

        let authoritative = hooked.turn.timestamp - Duration::seconds(40);
        fx.transcripts
            .set(fx.agent.id, vec![TranscriptEntry::new(TurnActor::User, "Run the tests", authoritative)])
            .await;

        let report = fx.reconciler.reconcile_agent(fx.agent.id).await.unwrap();
        assert_eq!(report.created_count, 0);
        assert_eq!(report.matched_count, 1);
        assert_eq!(report.corrected_count, 1);

        let stored = fx.lifecycle.turns().get(hooked.turn.id).await.unwrap().unwrap();
        assert!(distance(stored.timestamp, authoritative) < Duration::milliseconds(1));
    }

    #[tokio::test]
    async fn test_missing_transcript_is_an_error() {
        let fx = setup(ReconcilerConfig::default()).await;
        let err = fx.reconciler.reconcile_agent(fx.agent.id).await.unwrap_err();
        assert!(matches!(err, DomainError::TranscriptUnavailable { .. }));
        assert!(!fx.reconciler.locks().is_held(fx.agent.id));
    }

    #[tokio::test]
    async fn test_oversized_match_window_does_not_panic() {
        let config = ReconcilerConfig {
            match_window_secs: 100_000_000_000_000_000,
            ..ReconcilerConfig::default()
        };
        let fx = setup(config).await;
        fx.transcripts
            .set(fx.agent.id, vec![entry(TurnActor::User, "Tag the release", 5)])
            .await;

        let report = fx.reconciler.reconcile_agent(fx.agent.id).await.unwrap();
        assert_eq!(report.created_count, 1);

        fx.lifecycle.agents().update_transcript_cursor(fx.agent.id, 0).await.unwrap();
        let again = fx.reconciler.reconcile_agent(fx.agent.id).await.unwrap();
        assert_eq!(again.matched_count, 1);
        assert_eq!(again.created_count, 0);
    }

    #[tokio::test]
    async fn test_rotated_transcript_resets_cursor() {
        let fx = setup(ReconcilerConfig::default()).await;
        fx.lifecycle.agents().update_transcript_cursor(fx.agent.id, 10).await.unwrap();
        fx.transcripts
            .set(fx.agent.id, vec![entry(TurnActor::User, "Start over", 5)])
            .await;

        let report = fx.reconciler.reconcile_agent(fx.agent.id).await.unwrap();
        assert_eq!(report.created_count, 1);
        assert_eq!(report.cursor, 1);
    }
}

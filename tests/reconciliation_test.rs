//! Transcript reconciliation against a real SQLite store.

mod common;

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Notify;

use common::{entry, Harness};
use turnguard::adapters::mock::{InMemoryTranscriptSource, ScriptedIntentClassifier};
use turnguard::domain::models::{
    content_key, legacy_content_key, Agent, CommandState, ReconcilerConfig, TranscriptEntry, TurnActor,
    TurnDraft, TurnIntent, TurnSource,
};
use turnguard::domain::ports::{AgentRepository, TranscriptError, TranscriptSource, TurnRepository};
use turnguard::services::{ReconcileStatus, TurnCapture};
use turnguard::DomainError;

async fn hook_capture(h: &Harness, agent: &Agent, actor: TurnActor, intent: TurnIntent, text: &str) {
    h.lifecycle
        .capture_turn(TurnCapture::new(agent.id, TurnDraft::new(actor, intent, text)))
        .await
        .expect("hook capture");
}

#[tokio::test]
async fn test_recovers_missed_question_and_moves_to_awaiting_input() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    hook_capture(&h, &agent, TurnActor::User, TurnIntent::Command, "run the migration").await;
    assert_eq!(h.state(agent.id).await, CommandState::Commanded);

    let question = entry(TurnActor::Agent, "The schema has drifted. Should I regenerate it?", 0);
    h.transcripts
        .set(agent.id, vec![entry(TurnActor::User, "run the migration", 0), question.clone()])
        .await;

    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.status, ReconcileStatus::Ok);
    assert_eq!(report.matched_count, 1);
    assert_eq!(report.created_count, 1);
    assert_eq!(report.pending_count, 0);
    assert_eq!(report.cursor, 2);
    assert_eq!(h.state(agent.id).await, CommandState::AwaitingInput);

    let recovered = h.turns.get(report.created_turn_ids[0]).await.unwrap().unwrap();
    assert_eq!(recovered.intent, TurnIntent::Question);
    assert_eq!(recovered.source, TurnSource::Reconciler);
    assert_eq!(recovered.timestamp, question.timestamp);
    assert_eq!(
        recovered.content_hash.as_deref(),
        Some(content_key(TurnActor::Agent, &question.text).as_str())
    );
}

#[tokio::test]
async fn test_rescanning_the_same_transcript_creates_nothing() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    h.transcripts
        .set(
            agent.id,
            vec![
                entry(TurnActor::User, "add a changelog entry", 30),
                entry(TurnActor::Agent, "Editing CHANGELOG.md", 20),
                entry(TurnActor::Agent, "All done, the entry is added.", 10),
            ],
        )
        .await;

    let first = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(first.created_count, 3);
    assert_eq!(h.state(agent.id).await, CommandState::Complete);

    h.reset_cursor(agent.id).await;
    let second = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(second.created_count, 0);
    assert_eq!(second.matched_count, 3);
    assert_eq!(second.corrected_count, 0);
    assert_eq!(h.all_turns(agent.id).await.len(), 3);
}

#[tokio::test]
async fn test_advanced_cursor_skips_examined_entries() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    h.transcripts.set(agent.id, vec![entry(TurnActor::User, "lint the crate", 5)]).await;

    h.reconciler.reconcile_agent(agent.id).await.unwrap();
    let again = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(again.examined_count, 0);
    assert_eq!(again.created_count, 0);
    assert_eq!(again.cursor, 1);
}

#[tokio::test]
async fn test_legacy_key_still_matches() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    let command = h.command_in(agent.id, CommandState::Processing).await;

    let long_text = format!("{} and then the summary", "Detailed build log line. ".repeat(12));
    let legacy = legacy_content_key(TurnActor::Agent, &long_text, 200);
    assert_ne!(legacy, content_key(TurnActor::Agent, &long_text));
    h.lifecycle
        .record_turn(
            &command,
            TurnDraft::new(TurnActor::Agent, TurnIntent::Progress, long_text.clone()).with_content_hash(legacy),
        )
        .await
        .unwrap();

    h.transcripts.set(agent.id, vec![entry(TurnActor::Agent, &long_text, 0)]).await;
    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.matched_count, 1);
    assert_eq!(report.created_count, 0);
}

#[tokio::test]
async fn test_legacy_match_is_upgraded_and_cannot_absorb_a_later_entry() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    let command = h.command_in(agent.id, CommandState::Processing).await;

    let prefix = "x".repeat(220);
    let first = format!("{prefix} first ending");
    let second = format!("{prefix} second ending");
    let stored = h
        .lifecycle
        .record_turn(
            &command,
            TurnDraft::new(TurnActor::Agent, TurnIntent::Progress, first.clone())
                .with_content_hash(legacy_content_key(TurnActor::Agent, &first, 200)),
        )
        .await
        .unwrap();

    h.transcripts.set(agent.id, vec![entry(TurnActor::Agent, &first, 0)]).await;
    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.matched_count, 1);
    assert_eq!(report.upgraded_count, 1);
    let upgraded = h.turns.get(stored.id).await.unwrap().unwrap();
    assert_eq!(
        upgraded.content_hash.as_deref(),
        Some(content_key(TurnActor::Agent, &first).as_str())
    );

    h.transcripts
        .set(agent.id, vec![entry(TurnActor::Agent, &first, 0), entry(TurnActor::Agent, &second, 0)])
        .await;
    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.created_count, 1);
    assert_eq!(report.upgraded_count, 0);

    let texts: Vec<String> = h.all_turns(agent.id).await.into_iter().map(|t| t.text).collect();
    assert_eq!(texts.len(), 2);
    assert!(texts.contains(&second));
}

#[tokio::test]
async fn test_prefix_length_turn_does_not_absorb_its_extension() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;

    let exact = "y".repeat(200);
    let extended = format!("{exact} and more");
    h.transcripts.set(agent.id, vec![entry(TurnActor::User, &exact, 0)]).await;
    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.created_count, 1);

    h.transcripts
        .set(agent.id, vec![entry(TurnActor::User, &exact, 0), entry(TurnActor::User, &extended, 0)])
        .await;
    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.created_count, 1);
    assert_eq!(report.upgraded_count, 0);

    let turns = h.all_turns(agent.id).await;
    assert_eq!(turns.len(), 2);
    assert!(turns.iter().any(|t| t.text == extended));
}

#[tokio::test]
async fn test_shared_prefix_does_not_hide_a_distinct_turn() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    let command = h.command_in(agent.id, CommandState::Processing).await;

    let prefix = "x".repeat(220);
    let stored = format!("{prefix} first ending");
    let missing = format!("{prefix} second ending");
    h.lifecycle
        .record_turn(
            &command,
            TurnDraft::new(TurnActor::Agent, TurnIntent::Progress, stored.clone())
                .with_content_hash(content_key(TurnActor::Agent, &stored)),
        )
        .await
        .unwrap();

    h.transcripts
        .set(agent.id, vec![entry(TurnActor::Agent, &stored, 0), entry(TurnActor::Agent, &missing, 0)])
        .await;
    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.matched_count, 1);
    assert_eq!(report.created_count, 1);
    let texts: Vec<String> = h.all_turns(agent.id).await.into_iter().map(|t| t.text).collect();
    assert!(texts.contains(&missing));
}

#[tokio::test]
async fn test_same_text_outside_window_is_a_new_turn() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    let command = h.command_in(agent.id, CommandState::AwaitingInput).await;

    let old = chrono::Utc::now() - Duration::minutes(10);
    h.lifecycle
        .record_turn(
            &command,
            TurnDraft::new(TurnActor::User, TurnIntent::Answer, "yes")
                .with_timestamp(old)
                .with_content_hash(content_key(TurnActor::User, "yes")),
        )
        .await
        .unwrap();

    h.transcripts.set(agent.id, vec![entry(TurnActor::User, "yes", 0)]).await;
    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.matched_count, 0);
    assert_eq!(report.created_count, 1);
    assert_eq!(h.state(agent.id).await, CommandState::Processing);
}

#[tokio::test]
async fn test_unhashed_turn_is_matched_by_time_and_backfilled() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    let command = h.command_in(agent.id, CommandState::Processing).await;

    let turn = h
        .lifecycle
        .record_turn(&command, TurnDraft::new(TurnActor::Agent, TurnIntent::Progress, "Running cargo fmt"))
        .await
        .unwrap();
    assert!(turn.content_hash.is_none());

    h.transcripts.set(agent.id, vec![entry(TurnActor::Agent, "Running cargo fmt", 0)]).await;
    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.matched_count, 1);
    assert_eq!(report.backfilled_count, 1);
    assert_eq!(report.created_count, 0);

    let stored = h.turns.get(turn.id).await.unwrap().unwrap();
    assert_eq!(
        stored.content_hash.as_deref(),
        Some(content_key(TurnActor::Agent, "Running cargo fmt").as_str())
    );
}

#[tokio::test]
async fn test_drifted_timestamp_is_corrected_from_transcript() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    hook_capture(&h, &agent, TurnActor::User, TurnIntent::Command, "bump the version").await;

    let authoritative = entry(TurnActor::User, "bump the version", 45);
    h.transcripts.set(agent.id, vec![authoritative.clone()]).await;
    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.matched_count, 1);
    assert_eq!(report.corrected_count, 1);

    let turns = h.all_turns(agent.id).await;
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].timestamp, authoritative.timestamp);
}

#[tokio::test]
async fn test_cap_returns_partial_and_resumes_from_cursor() {
    let h = Harness::builder()
        .config(ReconcilerConfig {
            max_entries_per_call: 2,
            ..ReconcilerConfig::default()
        })
        .build()
        .await;
    let agent = h.agent("worker", None).await;
    let entries: Vec<TranscriptEntry> = (0..5)
        .map(|i| entry(TurnActor::Agent, &format!("step {i} of the build"), 50 - i * 5))
        .collect();
    h.transcripts.set(agent.id, entries).await;

    let first = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(first.status, ReconcileStatus::Partial);
    assert_eq!((first.examined_count, first.remaining_count, first.cursor), (2, 3, 2));

    let second = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(second.status, ReconcileStatus::Partial);
    assert_eq!((second.examined_count, second.remaining_count, second.cursor), (2, 1, 4));

    let third = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(third.status, ReconcileStatus::Ok);
    assert_eq!((third.examined_count, third.remaining_count, third.cursor), (1, 0, 5));
    assert_eq!(h.all_turns(agent.id).await.len(), 5);
}

#[tokio::test]
async fn test_shrunken_transcript_is_rescanned_from_start() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    h.agents.update_transcript_cursor(agent.id, 40).await.unwrap();
    h.transcripts.set(agent.id, vec![entry(TurnActor::User, "start over", 1)]).await;

    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.examined_count, 1);
    assert_eq!(report.created_count, 1);
    assert_eq!(report.cursor, 1);
}

#[tokio::test]
async fn test_agent_output_without_instruction_is_stored_as_pending() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    h.transcripts.set(agent.id, vec![entry(TurnActor::Agent, "Compiling turnguard v0.1.0", 0)]).await;

    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.created_count, 1);
    assert_eq!(report.pending_count, 1);
    assert_eq!(h.state(agent.id).await, CommandState::Idle);
    assert_eq!(h.all_turns(agent.id).await.len(), 1);
}

#[tokio::test]
async fn test_classifier_failure_falls_back_to_neutral_intent() {
    let h = Harness::builder()
        .classifier(ScriptedIntentClassifier::new().failing())
        .build()
        .await;
    let agent = h.agent("worker", None).await;
    hook_capture(&h, &agent, TurnActor::User, TurnIntent::Command, "tidy the imports").await;
    h.transcripts
        .set(agent.id, vec![entry(TurnActor::Agent, "Should I also sort the modules?", 0)])
        .await;

    let report = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert_eq!(report.created_count, 1);
    let recovered = h.turns.get(report.created_turn_ids[0]).await.unwrap().unwrap();
    assert_eq!(recovered.intent, TurnIntent::Progress);
    assert!(recovered.source_confidence.abs() < f64::EPSILON);
    assert_eq!(h.state(agent.id).await, CommandState::Processing);
}

#[tokio::test]
async fn test_missing_transcript_is_reported() {
    let h = Harness::new().await;
    let agent = h.agent("worker", None).await;
    let err = h.reconciler.reconcile_agent(agent.id).await.unwrap_err();
    assert!(matches!(err, DomainError::TranscriptUnavailable { agent_id, .. } if agent_id == agent.id));
    assert!(!h.locks.is_held(agent.id), "lock must be released on error");
}

/// Transcript source that blocks inside `read_entries` until released.
struct GatedTranscripts {
    inner: InMemoryTranscriptSource,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl TranscriptSource for GatedTranscripts {
    async fn read_entries(&self, agent: &Agent) -> Result<Vec<TranscriptEntry>, TranscriptError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.read_entries(agent).await
    }
}

#[tokio::test]
async fn test_second_reconciliation_returns_in_progress() {
    let gated = Arc::new(GatedTranscripts {
        inner: InMemoryTranscriptSource::new(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let h = Harness::builder().transcripts(gated.clone()).build().await;
    let agent = h.agent("worker", None).await;
    gated.inner.set(agent.id, vec![entry(TurnActor::User, "profile the parser", 0)]).await;

    let reconciler = h.reconciler.clone();
    let agent_id = agent.id;
    let first = tokio::spawn(async move { reconciler.reconcile_agent(agent_id).await });
    gated.entered.notified().await;

    let second = h.reconciler.reconcile_agent(agent.id).await.unwrap();
    assert!(second.in_progress);
    assert_eq!(second.message.as_deref(), Some("reconciliation already in progress"));
    assert_eq!(second.created_count, 0);

    gated.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(!first.in_progress);
    assert_eq!(first.created_count, 1);
    assert!(!h.locks.is_held(agent.id));
}

#[tokio::test]
async fn test_agents_reconcile_independently() {
    let h = Harness::new().await;
    let a = h.agent("a", None).await;
    let b = h.agent("b", None).await;
    h.transcripts.set(a.id, vec![entry(TurnActor::User, "fix the flaky test", 0)]).await;
    h.transcripts.set(b.id, vec![entry(TurnActor::User, "write the release notes", 0)]).await;

    let _guard = h.locks.try_acquire(a.id).unwrap();
    assert!(h.reconciler.reconcile_agent(a.id).await.unwrap().in_progress);
    let report = h.reconciler.reconcile_agent(b.id).await.unwrap();
    assert_eq!(report.created_count, 1);
}

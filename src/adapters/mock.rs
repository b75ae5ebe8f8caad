//! In-memory adapters for tests and dry runs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::adapters::classifier::KeywordIntentClassifier;
use crate::domain::models::{normalize, Agent, TranscriptEntry, TurnActor, TurnIntent};
use crate::domain::ports::{
    BridgeError, Classification, ClassifierError, IntentClassifier, TerminalBridge, TranscriptError,
    TranscriptSource,
};

/// Terminal bridge backed by a map of pane id -> screen text.
#[derive(Default, Clone)]
pub struct MockTerminalBridge {
    panes: Arc<RwLock<HashMap<String, String>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    sent: Arc<RwLock<Vec<(String, String)>>>,
    captures: Arc<AtomicUsize>,
}

impl MockTerminalBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the visible content of a pane.
    pub async fn set_pane(&self, pane_id: &str, content: impl Into<String>) {
        self.panes.write().await.insert(pane_id.to_string(), content.into());
    }

    /// Append a line to a pane.
    pub async fn append_line(&self, pane_id: &str, line: &str) {
        let mut panes = self.panes.write().await;
        let screen = panes.entry(pane_id.to_string()).or_default();
        if !screen.is_empty() {
            screen.push('\n');
        }
        screen.push_str(line);
    }

    /// Make every call against `pane_id` fail until cleared.
    pub async fn fail_pane(&self, pane_id: &str, failing: bool) {
        let mut set = self.failing.write().await;
        if failing {
            set.insert(pane_id.to_string());
        } else {
            set.remove(pane_id);
        }
    }

    /// Every `(pane_id, text)` passed to `send_text`.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.read().await.clone()
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TerminalBridge for MockTerminalBridge {
    async fn capture_pane(&self, pane_id: &str, lines: u32, _timeout: Duration) -> Result<String, BridgeError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().await.contains(pane_id) {
            return Err(BridgeError::Unavailable(format!("pane {pane_id} is failing")));
        }
        let panes = self.panes.read().await;
        let screen = panes
            .get(pane_id)
            .ok_or_else(|| BridgeError::Unavailable(format!("no such pane {pane_id}")))?;

        let all: Vec<&str> = screen.lines().collect();
        let start = all.len().saturating_sub(lines as usize);
        Ok(all[start..].join("\n"))
    }

    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), BridgeError> {
        if self.failing.read().await.contains(pane_id) {
            return Err(BridgeError::CommandFailed {
                status: 1,
                stderr: format!("can't find pane: {pane_id}"),
            });
        }
        self.sent.write().await.push((pane_id.to_string(), text.to_string()));
        self.append_line(pane_id, text).await;
        Ok(())
    }
}

/// Transcript source holding per-agent entries in memory.
#[derive(Default, Clone)]
pub struct InMemoryTranscriptSource {
    entries: Arc<RwLock<HashMap<Uuid, Vec<TranscriptEntry>>>>,
    reads: Arc<AtomicUsize>,
}

impl InMemoryTranscriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, agent_id: Uuid, entry: TranscriptEntry) {
        self.entries.write().await.entry(agent_id).or_default().push(entry);
    }

    pub async fn set(&self, agent_id: Uuid, entries: Vec<TranscriptEntry>) {
        self.entries.write().await.insert(agent_id, entries);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptSource for InMemoryTranscriptSource {
    async fn read_entries(&self, agent: &Agent) -> Result<Vec<TranscriptEntry>, TranscriptError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.entries
            .read()
            .await
            .get(&agent.id)
            .cloned()
            .ok_or(TranscriptError::NotConfigured)
    }
}

/// Classifier with fixed answers per normalized text; everything else goes
/// to the keyword heuristic, or fails when `failing()` is set.
#[derive(Default)]
pub struct ScriptedIntentClassifier {
    answers: HashMap<String, Classification>,
    fail_unknown: bool,
    calls: AtomicUsize,
}

impl ScriptedIntentClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, intent: TurnIntent, confidence: f64) -> Self {
        self.answers.insert(normalize(text), Classification::new(intent, confidence));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_unknown = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IntentClassifier for ScriptedIntentClassifier {
    fn classify(&self, text: &str, actor: TurnActor) -> Result<Classification, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(answer) = self.answers.get(&normalize(text)) {
            return Ok(*answer);
        }
        if self.fail_unknown {
            return Err(ClassifierError("scripted failure".to_string()));
        }
        KeywordIntentClassifier::new().classify(text, actor)
    }
}

//! JSONL transcript reader for Claude-style session logs.
//!
//! Each line is one JSON object:
//! `{"type":"user"|"assistant","message":{"content":...},"timestamp":"..."}`.
//! Content is either a plain string or an array of typed blocks; only `text`
//! blocks count. Tool-result-only lines, meta lines, other line types and
//! empty text are skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::models::{Agent, TranscriptEntry, TurnActor};
use crate::domain::ports::{TranscriptError, TranscriptSource};

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<RawMessage>,
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, rename = "isMeta")]
    is_meta: bool,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Value,
}

/// Reads `agent.transcript_path` from disk on every call.
#[derive(Debug, Clone, Default)]
pub struct JsonlTranscriptSource;

impl JsonlTranscriptSource {
    pub fn new() -> Self {
        Self
    }
}

/// Concatenate the text blocks of a message body.
fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.trim().to_string(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Parse a whole transcript. An unparseable final line is a write in progress;
/// any other unusable line is logged and skipped so one bad record cannot
/// stall reconciliation of the rest.
pub fn parse_transcript(raw: &str) -> Vec<TranscriptEntry> {
    let lines: Vec<&str> = raw.lines().collect();
    let last = lines.len().saturating_sub(1);
    let mut entries = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed: RawLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) if idx == last => {
                debug!(line = idx + 1, error = %e, "Skipping incomplete trailing transcript line");
                continue;
            }
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Skipping malformed transcript line");
                continue;
            }
        };

        let actor = match parsed.kind.as_deref().and_then(TurnActor::from_str) {
            Some(actor) if !parsed.is_meta => actor,
            _ => continue,
        };
        let Some(message) = parsed.message else {
            continue;
        };
        let text = extract_text(&message.content);
        if text.is_empty() {
            continue;
        }
        let Some(timestamp) = parsed.timestamp else {
            warn!(line = idx + 1, "Skipping transcript line without a timestamp");
            continue;
        };

        entries.push(TranscriptEntry::new(actor, text, timestamp));
    }

    entries
}

#[async_trait]
impl TranscriptSource for JsonlTranscriptSource {
    async fn read_entries(&self, agent: &Agent) -> Result<Vec<TranscriptEntry>, TranscriptError> {
        let path = agent
            .transcript_path
            .as_deref()
            .ok_or(TranscriptError::NotConfigured)?;

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TranscriptError::Io {
                path: path.to_string(),
                source,
            })?;

        Ok(parse_transcript(&raw))
    }
}

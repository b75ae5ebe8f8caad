//! Keyword heuristic intent classifier.
//!
//! No model, no I/O. Good enough to tell a question from progress output so a
//! recovered turn drives the state machine the right way.

use crate::domain::models::{normalize, TurnActor, TurnIntent};
use crate::domain::ports::{Classification, ClassifierError, IntentClassifier};

const QUESTION_PHRASES: &[&str] = &[
    "should i",
    "shall i",
    "would you like",
    "do you want",
    "can you confirm",
    "please confirm",
    "which option",
    "let me know if",
    "how would you like",
];

const COMPLETION_PHRASES: &[&str] = &[
    "all done",
    "task complete",
    "task is complete",
    "i've completed",
    "i have completed",
    "successfully completed",
    "changes are complete",
    "work is done",
    "finished the",
];

const ANSWER_WORDS: &[&str] = &[
    "y", "n", "yes", "no", "ok", "okay", "sure", "proceed", "go ahead", "continue", "approve",
    "approved", "do it", "skip", "cancel", "stop",
];

#[derive(Debug, Clone, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    fn classify_agent(text: &str) -> Classification {
        let lower = text.to_lowercase();
        let tail = lower.rsplit(['\n', '.', '!']).find(|s| !s.trim().is_empty()).unwrap_or("");

        if tail.trim_end().ends_with('?') || QUESTION_PHRASES.iter().any(|p| tail.contains(p)) {
            return Classification::new(TurnIntent::Question, 0.8);
        }
        if COMPLETION_PHRASES.iter().any(|p| lower.contains(p)) {
            return Classification::new(TurnIntent::Completion, 0.6);
        }
        Classification::new(TurnIntent::Progress, 0.5)
    }

    fn classify_user(text: &str) -> Classification {
        let lower = text.to_lowercase();
        let trimmed = lower.trim_end_matches(['.', '!']);
        let is_choice = trimmed.len() <= 2 && trimmed.chars().all(|c| c.is_ascii_digit());

        if is_choice || ANSWER_WORDS.contains(&trimmed) {
            Classification::new(TurnIntent::Answer, 0.7)
        } else {
            Classification::new(TurnIntent::Command, 0.6)
        }
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, text: &str, actor: TurnActor) -> Result<Classification, ClassifierError> {
        let text = normalize(text);
        if text.is_empty() {
            return Err(ClassifierError("empty text".to_string()));
        }
        Ok(match actor {
            TurnActor::Agent => Self::classify_agent(&text),
            TurnActor::User => Self::classify_user(&text),
        })
    }
}

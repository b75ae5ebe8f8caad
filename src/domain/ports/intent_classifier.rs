//! Intent classification port.

use thiserror::Error;

use crate::domain::models::{TurnActor, TurnIntent};

/// Result of classifying one utterance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub intent: TurnIntent,
    pub confidence: f64,
}

impl Classification {
    pub fn new(intent: TurnIntent, confidence: f64) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Neutral intent used when classification is unavailable.
    pub fn fallback(actor: TurnActor) -> Self {
        let intent = match actor {
            TurnActor::User => TurnIntent::Command,
            TurnActor::Agent => TurnIntent::Progress,
        };
        Self { intent, confidence: 0.0 }
    }
}

#[derive(Debug, Error)]
#[error("classification failed: {0}")]
pub struct ClassifierError(pub String);

/// Stateless, thread-safe text -> intent function.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str, actor: TurnActor) -> Result<Classification, ClassifierError>;
}

//! Content keys used to deduplicate turns against the transcript.
//!
//! The current key hashes the whole normalized text. The legacy key hashed
//! only a fixed-length prefix and is still computed so turns stored before the
//! format change keep matching.

use sha2::{Digest, Sha256};

use super::turn::TurnActor;

/// Prefix length (in chars) used by the legacy key format.
pub const LEGACY_PREFIX_CHARS: usize = 200;

/// Trim and collapse every whitespace run to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn digest(actor: TurnActor, normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(actor.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Current-format key over the full normalized text.
pub fn content_key(actor: TurnActor, text: &str) -> String {
    digest(actor, &normalize(text))
}

/// Legacy-format key over the first `prefix_chars` chars of the normalized text.
pub fn legacy_content_key(actor: TurnActor, text: &str, prefix_chars: usize) -> String {
    let normalized = normalize(text);
    let prefix: String = normalized.chars().take(prefix_chars).collect();
    digest(actor, &prefix)
}

/// Whether `stored`, the hash kept for `text`, is a legacy-format key.
///
/// A text no longer than the legacy prefix has identical keys in both
/// formats; such a hash counts as current.
pub fn is_legacy_hash(actor: TurnActor, text: &str, stored: &str, prefix_chars: usize) -> bool {
    stored != content_key(actor, text) && stored == legacy_content_key(actor, text, prefix_chars)
}

/// Both key formats for one piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKeys {
    pub current: String,
    pub legacy: String,
}

impl ContentKeys {
    pub fn compute(actor: TurnActor, text: &str, legacy_prefix_chars: usize) -> Self {
        Self {
            current: content_key(actor, text),
            legacy: legacy_content_key(actor, text, legacy_prefix_chars),
        }
    }

    /// Whether a stored hash identifies this content. The legacy key is
    /// only compared against hashes that are themselves legacy-format.
    pub fn matches(&self, stored: &str, stored_is_legacy: bool) -> bool {
        if stored_is_legacy {
            self.legacy == stored
        } else {
            self.current == stored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  hello \r\n\t world  "), "hello world");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_key_ignores_formatting_noise() {
        assert_eq!(
            content_key(TurnActor::Agent, "Should I\nproceed?"),
            content_key(TurnActor::Agent, "  Should I proceed?  ")
        );
    }

    #[test]
    fn test_key_depends_on_actor() {
        assert_ne!(
            content_key(TurnActor::Agent, "yes"),
            content_key(TurnActor::User, "yes")
        );
    }

    #[test]
    fn test_shared_prefix_produces_distinct_current_keys() {
        let prefix = "x".repeat(200);
        let a = format!("{prefix} first ending");
        let b = format!("{prefix} second ending");
        assert_ne!(content_key(TurnActor::Agent, &a), content_key(TurnActor::Agent, &b));
        assert_eq!(
            legacy_content_key(TurnActor::Agent, &a, LEGACY_PREFIX_CHARS),
            legacy_content_key(TurnActor::Agent, &b, LEGACY_PREFIX_CHARS)
        );
    }

    #[test]
    fn test_short_text_keys_coincide() {
        let keys = ContentKeys::compute(TurnActor::User, "run the tests", LEGACY_PREFIX_CHARS);
        assert_eq!(keys.current, keys.legacy);
    }

    #[test]
    fn test_full_key_of_prefix_length_text_is_not_legacy() {
        let exact = "y".repeat(LEGACY_PREFIX_CHARS);
        let stored = content_key(TurnActor::Agent, &exact);
        assert!(!is_legacy_hash(TurnActor::Agent, &exact, &stored, LEGACY_PREFIX_CHARS));

        let longer = ContentKeys::compute(TurnActor::Agent, &format!("{exact} and more"), LEGACY_PREFIX_CHARS);
        assert_eq!(longer.legacy, stored);
        assert!(!longer.matches(&stored, false));
    }

    #[test]
    fn test_legacy_hash_detection() {
        let text = format!("{} tail", "z".repeat(250));
        let legacy = legacy_content_key(TurnActor::User, &text, LEGACY_PREFIX_CHARS);
        assert!(is_legacy_hash(TurnActor::User, &text, &legacy, LEGACY_PREFIX_CHARS));
        assert!(!is_legacy_hash(TurnActor::User, &text, &content_key(TurnActor::User, &text), LEGACY_PREFIX_CHARS));

        let keys = ContentKeys::compute(TurnActor::User, &text, LEGACY_PREFIX_CHARS);
        assert!(keys.matches(&legacy, true));
        assert!(!keys.matches(&legacy, false));
    }

    #[test]
    fn test_legacy_prefix_counts_chars_not_bytes() {
        let text = "é".repeat(250);
        let key = legacy_content_key(TurnActor::User, &text, LEGACY_PREFIX_CHARS);
        assert_eq!(key, content_key(TurnActor::User, &"é".repeat(200)));
    }
}

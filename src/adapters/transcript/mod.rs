//! Transcript source adapters.

pub mod jsonl;

pub use jsonl::JsonlTranscriptSource;

//! Intent classifier adapters.

pub mod keyword;

pub use keyword::KeywordIntentClassifier;

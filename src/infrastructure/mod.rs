//! Infrastructure layer module
//!
//! Process-level concerns shared by every entry point:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;

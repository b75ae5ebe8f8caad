//! Domain layer for turn capture
//!
//! Pure models (turns, commands, agents, the lifecycle state machine,
//! content keys) and the port traits adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};

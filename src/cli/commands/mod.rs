//! CLI command implementations.

pub mod agent;
pub mod capture;
pub mod config;
pub mod reconcile;
pub mod send;
pub mod watch;

//! Adapters implementing the domain ports.

pub mod classifier;
pub mod mock;
pub mod sqlite;
pub mod tmux;
pub mod transcript;

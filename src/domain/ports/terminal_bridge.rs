//! Terminal bridge port: synchronous capture and send against a pane.
//!
//! Implementations must not cache; every call goes to the terminal. Any call
//! may fail or time out.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Terminal bridge failures. All of them are recoverable for the caller.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("capture of pane {pane_id} timed out after {timeout:?}")]
    Timeout { pane_id: String, timeout: Duration },

    #[error("terminal unavailable: {0}")]
    Unavailable(String),

    #[error("terminal command failed ({status}): {stderr}")]
    CommandFailed { status: i32, stderr: String },
}

#[async_trait]
pub trait TerminalBridge: Send + Sync {
    /// Capture the last `lines` lines of a pane.
    async fn capture_pane(&self, pane_id: &str, lines: u32, timeout: Duration) -> Result<String, BridgeError>;

    /// Type `text` into a pane and submit it.
    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), BridgeError>;
}

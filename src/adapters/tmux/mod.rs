//! tmux implementation of the terminal bridge.
//!
//! Shells out to `tmux capture-pane` / `tmux send-keys`. Nothing is cached;
//! each call runs a fresh process bounded by a timeout.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::domain::models::BridgeConfig;
use crate::domain::ports::{BridgeError, TerminalBridge};

#[derive(Debug, Clone)]
pub struct TmuxBridge {
    binary: String,
    send_timeout: Duration,
}

impl TmuxBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            binary: config.tmux_binary.clone(),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        }
    }

    async fn run(&self, pane_id: &str, args: &[&str], limit: Duration) -> Result<String, BridgeError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(limit, cmd.output())
            .await
            .map_err(|_| BridgeError::Timeout {
                pane_id: pane_id.to_string(),
                timeout: limit,
            })?
            .map_err(|e| BridgeError::Unavailable(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(BridgeError::CommandFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Arguments for capturing the last `lines` lines of a pane as plain text.
fn capture_args(pane_id: &str, lines: u32) -> Vec<String> {
    vec![
        "capture-pane".to_string(),
        "-p".to_string(),
        "-J".to_string(),
        "-t".to_string(),
        pane_id.to_string(),
        "-S".to_string(),
        format!("-{}", lines.max(1)),
    ]
}

#[async_trait]
impl TerminalBridge for TmuxBridge {
    async fn capture_pane(&self, pane_id: &str, lines: u32, limit: Duration) -> Result<String, BridgeError> {
        let args = capture_args(pane_id, lines);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let raw = self.run(pane_id, &args, limit).await?;
        Ok(raw.trim_end().to_string())
    }

    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), BridgeError> {
        // Literal mode so tmux does not interpret key names inside the text.
        self.run(pane_id, &["send-keys", "-t", pane_id, "-l", text], self.send_timeout)
            .await?;
        self.run(pane_id, &["send-keys", "-t", pane_id, "Enter"], self.send_timeout)
            .await?;
        Ok(())
    }
}

//! Command-line interface.

pub mod commands;
pub mod context;
pub mod id_resolver;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use context::AppContext;

#[derive(Parser, Debug)]
#[command(name = "turnguard")]
#[command(about = "Turn capture and recovery for supervised coding-agent sessions", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to .turnguard/config.yaml plus local overrides)
    #[arg(short, long, global = true, env = "TURNGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile stored turns against an agent's transcript
    Reconcile(commands::reconcile::ReconcileArgs),
    /// Watch agent panes and reconcile periodically until Ctrl-C
    Watch(commands::watch::WatchArgs),
    /// Manage agent sessions
    Agent(commands::agent::AgentArgs),
    /// Record a turn reported by a session hook
    Capture(commands::capture::CaptureArgs),
    /// Type a response into an agent's pane and record it
    Send(commands::send::SendArgs),
    /// Inspect configuration
    Config(commands::config::ConfigArgs),
}

/// Print an error the way the selected output mode expects and exit.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}

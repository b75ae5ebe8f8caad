//! Long-running supervision: pane watchdog plus periodic reconciliation.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::context::AppContext;
use crate::services::{EventSeverity, UnifiedEvent};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Override the watchdog poll interval (milliseconds)
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Override the periodic reconciliation interval (seconds)
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Skip the sweep that normally runs at startup
    #[arg(long)]
    pub no_initial_sweep: bool,
}

fn print_event(event: &UnifiedEvent, json_mode: bool) {
    if json_mode {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
    } else if event.severity >= EventSeverity::Info {
        println!(
            "[{}] {} {} agent={}",
            event.timestamp.format("%H:%M:%S"),
            event.severity,
            event.payload.name(),
            event.agent_id
        );
    }
}

pub async fn execute(args: WatchArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let mut watchdog_config = ctx.config.watchdog.clone();
    if let Some(poll_ms) = args.poll_ms {
        watchdog_config.poll_interval_ms = poll_ms.max(1);
    }
    let interval = args
        .interval_secs
        .map_or_else(|| ctx.config.reconciler.interval(), |secs| Duration::from_secs(secs.max(1)));

    let watchdog = Arc::new(ctx.watchdog(watchdog_config));
    let registered = watchdog.sync_from_store().await?;

    let mut events = ctx.events.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, json_mode),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let daemon = ctx
        .daemon(interval)
        .with_run_on_startup(!args.no_initial_sweep)
        .start();
    let watchdog_handle = watchdog.start();

    info!(agents = registered, interval_secs = interval.as_secs(), "Watching, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    watchdog_handle.shutdown().await;
    daemon.shutdown().await;
    printer.abort();
    Ok(())
}

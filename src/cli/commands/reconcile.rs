//! On-demand transcript reconciliation.

use anyhow::Result;
use clap::Args;

use crate::cli::context::AppContext;
use crate::cli::id_resolver::resolve_agent_id;
use crate::cli::output::{output, CommandOutput};
use crate::services::{ReconcileReport, ReconcileStatus, SweepReport};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Agent id, id prefix, or name
    #[arg(short, long, conflicts_with = "all")]
    pub agent: Option<String>,

    /// Reconcile every agent with a transcript
    #[arg(long)]
    pub all: bool,
}

impl CommandOutput for ReconcileReport {
    fn to_human(&self) -> String {
        if self.in_progress {
            return format!("Agent {}: {}", self.agent_id, self.message.as_deref().unwrap_or_default());
        }

        let mut lines = vec![format!("Reconciled agent {}", self.agent_id)];
        lines.push(format!("  Examined:    {}", self.examined_count));
        lines.push(format!("  Matched:     {}", self.matched_count));
        lines.push(format!("  Created:     {}", self.created_count));
        lines.push(format!("  Back-filled: {}", self.backfilled_count));
        lines.push(format!("  Corrected:   {}", self.corrected_count));
        if self.upgraded_count > 0 {
            lines.push(format!("  Upgraded:    {}", self.upgraded_count));
        }
        if self.pending_count > 0 {
            lines.push(format!("  Pending:     {}", self.pending_count));
        }
        lines.push(format!("  Cursor:      {}", self.cursor));
        if self.status == ReconcileStatus::Partial {
            lines.push(format!(
                "\nPartial: {} entries remain, run again to continue.",
                self.remaining_count
            ));
        }
        lines.join("\n")
    }
}

impl CommandOutput for SweepReport {
    fn to_human(&self) -> String {
        [
            format!("Swept {} agent(s):", self.agents),
            format!("  Reconciled:        {}", self.reconciled),
            format!("  Turns created:     {}", self.turns_created),
            format!("  Busy (skipped):    {}", self.skipped_busy),
            format!("  No transcript:     {}", self.skipped_no_transcript),
            format!("  Failed:            {}", self.failed),
        ]
        .join("\n")
    }
}

pub async fn execute(args: ReconcileArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.agent {
        Some(reference) => {
            let agent_id = resolve_agent_id(&ctx.pool, &reference).await?;
            let report = ctx.reconciler.reconcile_agent(agent_id).await?;
            output(&report, json_mode);
        }
        None if args.all => {
            let report = ctx.daemon(ctx.config.reconciler.interval()).run_once().await?;
            output(&report, json_mode);
        }
        None => anyhow::bail!("Specify --agent <AGENT> or --all"),
    }
    Ok(())
}

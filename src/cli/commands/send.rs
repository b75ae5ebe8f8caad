//! Operator responses typed into an agent's pane.

use anyhow::{anyhow, Result};
use clap::Args;

use crate::cli::commands::capture::CapturedTurnOutput;
use crate::cli::context::AppContext;
use crate::cli::id_resolver::resolve_agent_id;
use crate::cli::output::output;
use crate::domain::models::TurnIntent;

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Agent id, id prefix, or name
    #[arg(short, long)]
    pub agent: String,

    /// Record as this intent (answer or command); inferred from the agent state when omitted
    #[arg(short, long)]
    pub intent: Option<String>,

    /// Text to type into the pane
    pub text: String,
}

pub async fn execute(args: SendArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let intent = args
        .intent
        .as_deref()
        .map(|raw| TurnIntent::from_str(raw).ok_or_else(|| anyhow!("Invalid intent: {raw}")))
        .transpose()?;
    let agent_id = resolve_agent_id(&ctx.pool, &args.agent).await?;

    let captured = ctx.responder().respond(agent_id, &args.text, intent).await?;
    output(&CapturedTurnOutput::from(&captured), json_mode);
    Ok(())
}

//! Fast-path turn capture, invoked by agent session hooks.

use anyhow::{anyhow, Result};
use clap::Args;
use tracing::warn;

use crate::cli::context::AppContext;
use crate::cli::id_resolver::resolve_agent_id;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{TurnActor, TurnDraft, TurnIntent, TurnSource};
use crate::domain::ports::Classification;
use crate::services::{CapturedTurn, TransitionOutcome, TurnCapture};

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Agent id, id prefix, or name
    #[arg(short, long)]
    pub agent: String,

    /// Who produced the text (user or agent)
    #[arg(long)]
    pub actor: String,

    /// Intent reported by the hook; classified from the text when omitted
    #[arg(short, long)]
    pub intent: Option<String>,

    /// Utterance text
    pub text: String,
}

#[derive(Debug, serde::Serialize)]
pub struct CapturedTurnOutput {
    pub turn_id: String,
    pub command_id: String,
    pub opened_command: bool,
    pub actor: String,
    pub intent: String,
    pub source: String,
    pub text: String,
    pub transition: TransitionOutcome,
}

impl From<&CapturedTurn> for CapturedTurnOutput {
    fn from(captured: &CapturedTurn) -> Self {
        Self {
            turn_id: captured.turn.id.to_string(),
            command_id: captured.command_id.to_string(),
            opened_command: captured.opened_command,
            actor: captured.turn.actor.to_string(),
            intent: captured.turn.intent.to_string(),
            source: captured.turn.source.as_str().to_string(),
            text: captured.turn.text.clone(),
            transition: captured.outcome.clone(),
        }
    }
}

impl CommandOutput for CapturedTurnOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Turn {} recorded ({} {}): {}",
            &self.turn_id[..8],
            self.actor,
            self.intent,
            truncate(&self.text.replace('\n', " "), 60)
        )];
        if self.opened_command {
            lines.push(format!("Opened command {}", &self.command_id[..8]));
        }
        lines.push(match &self.transition {
            TransitionOutcome::Transitioned { from, to } => format!("State: {from} -> {to}"),
            TransitionOutcome::Unchanged { state } => format!("State: {state} (unchanged)"),
            TransitionOutcome::Rejected { transition } => {
                format!("State unchanged, transition rejected: {transition}")
            }
            TransitionOutcome::Failed { reason } => {
                format!("State unchanged, transition failed: {reason}")
            }
        });
        lines.join("\n")
    }
}

fn parse_intent(raw: &str) -> Result<TurnIntent> {
    TurnIntent::from_str(raw).ok_or_else(|| anyhow!("Invalid intent: {raw}"))
}

pub async fn execute(args: CaptureArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let actor = TurnActor::from_str(&args.actor).ok_or_else(|| anyhow!("Invalid actor: {}", args.actor))?;
    let agent_id = resolve_agent_id(&ctx.pool, &args.agent).await?;

    let classification = match args.intent.as_deref() {
        Some(raw) => Classification::new(parse_intent(raw)?, 1.0),
        None => ctx.classifier.classify(&args.text, actor).unwrap_or_else(|err| {
            warn!(agent_id = %agent_id, error = %err, "Classification failed, using fallback intent");
            Classification::fallback(actor)
        }),
    };

    let draft = TurnDraft::new(actor, classification.intent, args.text)
        .with_confidence(classification.confidence)
        .with_source(TurnSource::Hook);
    let captured = ctx.lifecycle.capture_turn(TurnCapture::new(agent_id, draft)).await?;

    output(&CapturedTurnOutput::from(&captured), json_mode);
    Ok(())
}

//! Agent CLI commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

use crate::cli::context::AppContext;
use crate::cli::id_resolver::resolve_agent_id;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{Agent, Turn};
use crate::domain::DomainError;

#[derive(Args, Debug)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentCommands,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// Register an agent session
    Add {
        /// Session name
        name: String,
        /// Terminal pane (e.g. tmux %12)
        #[arg(short, long)]
        pane: Option<String>,
        /// Path to the session transcript (JSONL)
        #[arg(short, long)]
        transcript: Option<String>,
    },
    /// List registered agents
    List,
    /// Show an agent's state and recent turns
    Show {
        /// Agent id, id prefix, or name
        agent: String,
        /// Number of recent turns to include
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct AgentOutput {
    pub id: String,
    pub name: String,
    pub pane_id: Option<String>,
    pub transcript_path: Option<String>,
    pub active_command_id: Option<String>,
    pub transcript_cursor: u64,
}

impl From<&Agent> for AgentOutput {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.to_string(),
            name: agent.name.clone(),
            pane_id: agent.pane_id.clone(),
            transcript_path: agent.transcript_path.clone(),
            active_command_id: agent.active_command_id.map(|id| id.to_string()),
            transcript_cursor: agent.transcript_cursor,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct AgentListOutput {
    pub agents: Vec<AgentOutput>,
    pub total: usize,
}

impl CommandOutput for AgentListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "pane", "cursor"]);
        for agent in &self.agents {
            table.add_row(vec![
                agent.id[..8].to_string(),
                truncate(&agent.name, 24),
                agent.pane_id.clone().unwrap_or_else(|| "-".to_string()),
                agent.transcript_cursor.to_string(),
            ]);
        }
        render_list("agent", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TurnOutput {
    pub id: String,
    pub actor: String,
    pub intent: String,
    pub source: String,
    pub timestamp: String,
    pub text: String,
}

impl From<&Turn> for TurnOutput {
    fn from(turn: &Turn) -> Self {
        Self {
            id: turn.id.to_string(),
            actor: turn.actor.to_string(),
            intent: turn.intent.to_string(),
            source: turn.source.as_str().to_string(),
            timestamp: turn.timestamp.to_rfc3339(),
            text: turn.text.clone(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct AgentDetailOutput {
    pub agent: AgentOutput,
    pub state: String,
    pub turn_count: u64,
    pub recent_turns: Vec<TurnOutput>,
}

impl CommandOutput for AgentDetailOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Agent: {}", self.agent.name),
            format!("ID: {}", self.agent.id),
            format!("State: {}", self.state),
            format!("Pane: {}", self.agent.pane_id.as_deref().unwrap_or("-")),
            format!("Transcript: {}", self.agent.transcript_path.as_deref().unwrap_or("-")),
            format!("Transcript cursor: {}", self.agent.transcript_cursor),
            format!("Turns: {}", self.turn_count),
        ];

        if !self.recent_turns.is_empty() {
            let mut table = list_table(&["time", "actor", "intent", "source", "text"]);
            for turn in &self.recent_turns {
                table.add_row(vec![
                    turn.timestamp.clone(),
                    turn.actor.clone(),
                    turn.intent.clone(),
                    turn.source.clone(),
                    truncate(&turn.text.replace('\n', " "), 60),
                ]);
            }
            lines.push(String::new());
            lines.push(render_list("recent turn", &table, self.recent_turns.len()));
        }

        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct AgentActionOutput {
    pub success: bool,
    pub message: String,
    pub agent: Option<AgentOutput>,
}

impl CommandOutput for AgentActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: AgentArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.command {
        AgentCommands::Add { name, pane, transcript } => {
            let mut agent = Agent::new(name);
            agent.pane_id = pane;
            agent.transcript_path = transcript;
            ctx.agents.create(&agent).await?;

            let out = AgentActionOutput {
                success: true,
                message: format!("Agent registered: {} ({})", agent.name, agent.id),
                agent: Some(AgentOutput::from(&agent)),
            };
            output(&out, json_mode);
        }

        AgentCommands::List => {
            let agents = ctx.agents.list().await?;
            let out = AgentListOutput {
                total: agents.len(),
                agents: agents.iter().map(AgentOutput::from).collect(),
            };
            output(&out, json_mode);
        }

        AgentCommands::Show { agent, limit } => {
            let agent_id = resolve_agent_id(&ctx.pool, &agent).await?;
            let agent = ctx
                .agents
                .get(agent_id)
                .await?
                .ok_or(DomainError::AgentNotFound(agent_id))?;
            let state = ctx.lifecycle.agent_state(agent_id).await?;
            let turns = ctx.lifecycle.turns();
            let turn_count = turns.count_for_agent(agent_id).await?;

            // Turns are listed oldest first; keep the tail.
            let all = turns.list_for_agent_since(agent_id, DateTime::<Utc>::UNIX_EPOCH).await?;
            let skip = all.len().saturating_sub(limit);

            let out = AgentDetailOutput {
                agent: AgentOutput::from(&agent),
                state: state.to_string(),
                turn_count,
                recent_turns: all[skip..].iter().map(TurnOutput::from).collect(),
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}

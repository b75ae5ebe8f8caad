//! Command lifecycle state machine.
//!
//! Pure and table-driven: `(state, actor, intent) -> new state | rejection`.
//! Anything not listed in [`TRANSITION_TABLE`] is rejected. Combinations that
//! show up in real sessions (late progress output after completion, a user
//! steering a running agent, repeated questions) have absorbing entries so a
//! caller never has to treat them as failures.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::command::CommandState;
use super::turn::{TurnActor, TurnIntent};

/// One accepted `(from, actor, intent) -> to` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: CommandState,
    pub actor: TurnActor,
    pub intent: TurnIntent,
    pub to: CommandState,
}

const fn rule(
    from: CommandState,
    actor: TurnActor,
    intent: TurnIntent,
    to: CommandState,
) -> TransitionRule {
    TransitionRule { from, actor, intent, to }
}

use CommandState::{AwaitingInput, Commanded, Complete, Idle, Processing};
use TurnActor::{Agent, User};
use TurnIntent::{Answer, Command as Instruction, Completion, EndOfCommand, Progress, Question};

/// Every accepted transition.
pub const TRANSITION_TABLE: &[TransitionRule] = &[
    // User instructions
    rule(Idle, User, Instruction, Commanded),
    rule(Commanded, User, Instruction, Commanded),
    rule(Processing, User, Instruction, Processing),
    rule(AwaitingInput, User, Instruction, Processing),
    rule(Complete, User, Instruction, Commanded),
    // User answers
    rule(Commanded, User, Answer, Commanded),
    rule(Processing, User, Answer, Processing),
    rule(AwaitingInput, User, Answer, Processing),
    rule(Complete, User, Answer, Complete),
    // Agent questions
    rule(Commanded, Agent, Question, AwaitingInput),
    rule(Processing, Agent, Question, AwaitingInput),
    rule(AwaitingInput, Agent, Question, AwaitingInput),
    rule(Complete, Agent, Question, Complete),
    // Agent progress
    rule(Commanded, Agent, Progress, Processing),
    rule(Processing, Agent, Progress, Processing),
    rule(AwaitingInput, Agent, Progress, Processing),
    rule(Complete, Agent, Progress, Complete),
    // Agent completion
    rule(Commanded, Agent, Completion, Complete),
    rule(Processing, Agent, Completion, Complete),
    rule(AwaitingInput, Agent, Completion, Complete),
    rule(Complete, Agent, Completion, Complete),
    rule(Commanded, Agent, EndOfCommand, Complete),
    rule(Processing, Agent, EndOfCommand, Complete),
    rule(AwaitingInput, Agent, EndOfCommand, Complete),
    rule(Complete, Agent, EndOfCommand, Complete),
];

/// A combination the table does not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("rejected transition from {from} on {actor} {intent}: {reason}")]
pub struct RejectedTransition {
    pub from: CommandState,
    pub actor: TurnActor,
    pub intent: TurnIntent,
    pub reason: RejectionReason,
}

/// Why a combination is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The actor never produces this intent (e.g. an agent issuing a command).
    ActorIntentMismatch,
    /// Nothing has been commanded yet, so there is nothing to respond to.
    NoActiveInstruction,
    /// Not listed in the table for another reason.
    NotInTable,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ActorIntentMismatch => "actor never produces this intent",
            Self::NoActiveInstruction => "no instruction has been received",
            Self::NotInTable => "combination not in transition table",
        };
        f.write_str(text)
    }
}

/// Whether `actor` can ever produce `intent`.
pub fn actor_produces(actor: TurnActor, intent: TurnIntent) -> bool {
    match actor {
        TurnActor::User => matches!(intent, TurnIntent::Command | TurnIntent::Answer),
        TurnActor::Agent => !matches!(intent, TurnIntent::Command | TurnIntent::Answer),
    }
}

/// Compute the next state for a turn, or reject it.
pub fn transition(
    state: CommandState,
    actor: TurnActor,
    intent: TurnIntent,
) -> Result<CommandState, RejectedTransition> {
    TRANSITION_TABLE
        .iter()
        .find(|r| r.from == state && r.actor == actor && r.intent == intent)
        .map(|r| r.to)
        .ok_or_else(|| RejectedTransition {
            from: state,
            actor,
            intent,
            reason: rejection_reason(state, actor, intent),
        })
}

fn rejection_reason(state: CommandState, actor: TurnActor, intent: TurnIntent) -> RejectionReason {
    if !actor_produces(actor, intent) {
        RejectionReason::ActorIntentMismatch
    } else if state == CommandState::Idle {
        RejectionReason::NoActiveInstruction
    } else {
        RejectionReason::NotInTable
    }
}

/// Evaluate the full `state x actor x intent` cross product.
pub fn transition_matrix(
) -> impl Iterator<Item = (CommandState, TurnActor, TurnIntent, Result<CommandState, RejectedTransition>)>
{
    CommandState::ALL.into_iter().flat_map(|state| {
        TurnActor::ALL.into_iter().flat_map(move |actor| {
            TurnIntent::ALL
                .into_iter()
                .map(move |intent| (state, actor, intent, transition(state, actor, intent)))
        })
    })
}

//! Conversation governor: turn counting, pass command and auto-mention.
//!
//! The governor mutates an [`Agent`] record in place and never awaits, so a
//! caller holding the agent's lock gets read-and-increment of the turn
//! counter as one step.

use chrono::Utc;

use crate::events::world_event::{MessagePayload, SenderType};
use crate::governance::eligibility::{evaluate, Decision};
use crate::governance::mention::{prepend_mention, starts_with_mention_of, strip_leading_mentions};
use crate::types::Agent;

/// In-band marker an agent emits to hand control back to the human.
pub const PASS_COMMAND: &str = "<world>pass</world>";

/// Participant addressed by hand-back and handoff notices.
pub const HUMAN_HANDLE: &str = "human";

/// Fixed text that replaces a reply containing [`PASS_COMMAND`].
pub fn handoff_text(agent_name: &str) -> String {
    format!("@{HUMAN_HANDLE} {agent_name} is passing control to you")
}

/// Text of the notice published when an agent hits its turn limit.
pub fn turn_limit_text(agent_name: &str, limit: u32) -> String {
    format!(
        "@{HUMAN_HANDLE} {agent_name} has reached the turn limit of {limit} and is handing control back to you"
    )
}

/// Whether `text` carries the pass command anywhere.
pub fn contains_pass_command(text: &str) -> bool {
    text.contains(PASS_COMMAND)
}

/// Per-agent governor state that is not persisted.
#[derive(Debug, Clone, Default)]
pub struct GovernorState {
    /// A hand-back notice was already published for the current breach.
    handback_notified: bool,
}

impl GovernorState {
    pub fn handback_notified(&self) -> bool {
        self.handback_notified
    }

    fn reset(&mut self) {
        self.handback_notified = false;
    }
}

/// What to do with an incoming message after governance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Go ahead: the turn counter has already been incremented to `call_number`.
    Proceed { call_number: u32 },
    /// Publish the single hand-back notice for this breach, then stay silent.
    HandBack { count: u32, limit: u32 },
    /// Stay silent.
    Declined(Decision),
}

/// Outcome of post-processing a generated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalReply {
    /// Persist and publish this text as the agent's reply.
    Message(String),
    /// The agent passed: persist and publish this fixed handoff text.
    Handoff(String),
    /// Nothing left after trimming.
    Empty,
}

impl FinalReply {
    pub fn text(&self) -> Option<&str> {
        match self {
            FinalReply::Message(t) | FinalReply::Handoff(t) => Some(t),
            FinalReply::Empty => None,
        }
    }
}

/// Apply the counter reset rule, evaluate eligibility and, when the agent
/// will reply, count the call before anything can yield.
pub fn admit(
    agent: &mut Agent,
    state: &mut GovernorState,
    message: &MessagePayload,
    turn_limit: u32,
) -> Admission {
    if message.sender_type.resets_turn_counter() && !agent.answers_to(&message.sender) {
        agent.llm_call_count = 0;
        state.reset();
    }

    match evaluate(agent, message, turn_limit) {
        Decision::Respond => {
            agent.llm_call_count += 1;
            agent.last_call_at = Some(Utc::now());
            Admission::Proceed {
                call_number: agent.llm_call_count,
            }
        }
        Decision::TurnLimitReached { count, limit } => {
            if state.handback_notified {
                Admission::Declined(Decision::TurnLimitReached { count, limit })
            } else {
                state.handback_notified = true;
                Admission::HandBack { count, limit }
            }
        }
        other => Admission::Declined(other),
    }
}

/// Post-process raw LLM output: trim, strip leading self-mentions, detect
/// the pass command, then auto-mention the original sender of an
/// agent-to-agent exchange.
pub fn finalize_reply(agent: &Agent, raw: &str, trigger: &MessagePayload) -> FinalReply {
    let trimmed = raw.trim();
    let stripped = strip_leading_mentions(trimmed, |m| agent.answers_to(m));

    if contains_pass_command(&stripped) {
        return FinalReply::Handoff(handoff_text(&agent.name));
    }
    if stripped.is_empty() {
        return FinalReply::Empty;
    }

    let needs_mention = trigger.sender_type == SenderType::Agent
        && !agent.answers_to(&trigger.sender)
        && !starts_with_mention_of(&stripped, &trigger.sender);
    if needs_mention {
        FinalReply::Message(prepend_mention(&stripped, &trigger.sender))
    } else {
        FinalReply::Message(stripped)
    }
}

/// Reset bookkeeping after a pass: the agent yielded voluntarily.
pub fn complete_handoff(agent: &mut Agent, state: &mut GovernorState) {
    agent.llm_call_count = 0;
    state.reset();
}

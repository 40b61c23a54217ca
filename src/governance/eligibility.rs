//! Response-eligibility rules: which agent, if any, replies to a message.
//!
//! | sender            | first mention        | result                 |
//! |-------------------|----------------------|------------------------|
//! | this agent        | any                  | skip                   |
//! | system            | any                  | respond                |
//! | human             | none                 | respond (broadcast)    |
//! | human / agent     | this agent           | respond                |
//! | human / agent     | someone else         | skip                   |
//! | agent             | none                 | skip                   |
//!
//! Reaching the turn limit overrides a `respond` outcome. Inactive agents
//! never respond.

use crate::events::world_event::{MessagePayload, SenderType};
use crate::governance::mention::extract_first_mention;
use crate::types::{Agent, World};

/// Why an agent stays silent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The message was published by this agent.
    OwnMessage,
    /// The agent is not active.
    Inactive,
    /// The first mention names someone else (possibly nobody known).
    MentionsOther(String),
    /// Agent message without a mention; peers do not auto-reply.
    AgentBroadcast,
}

/// Outcome of evaluating one agent against one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Respond,
    Skip(SkipReason),
    /// Would respond, but has used up its consecutive LLM calls.
    TurnLimitReached { count: u32, limit: u32 },
}

impl Decision {
    pub fn is_respond(&self) -> bool {
        matches!(self, Decision::Respond)
    }
}

/// Evaluate `agent` against `message` with an explicit turn limit.
pub fn evaluate(agent: &Agent, message: &MessagePayload, turn_limit: u32) -> Decision {
    if agent.answers_to(&message.sender) {
        return Decision::Skip(SkipReason::OwnMessage);
    }
    if !agent.is_active() {
        return Decision::Skip(SkipReason::Inactive);
    }

    let mention = extract_first_mention(&message.content);
    let base = match (message.sender_type, mention) {
        (SenderType::System, _) => Decision::Respond,
        (SenderType::Human, None) => Decision::Respond,
        (SenderType::Agent, None) => Decision::Skip(SkipReason::AgentBroadcast),
        (SenderType::Human | SenderType::Agent, Some(name)) => {
            if agent.answers_to(&name) {
                Decision::Respond
            } else {
                Decision::Skip(SkipReason::MentionsOther(name))
            }
        }
    };

    match base {
        Decision::Respond if agent.llm_call_count >= turn_limit => Decision::TurnLimitReached {
            count: agent.llm_call_count,
            limit: turn_limit,
        },
        other => other,
    }
}

/// Whether `agent` should reply to `message` in `world`.
pub fn should_respond(agent: &Agent, message: &MessagePayload, world: &World) -> bool {
    evaluate(agent, message, world.turn_limit()).is_respond()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentStatus;

    fn msg(content: &str, sender: &str, sender_type: SenderType) -> MessagePayload {
        MessagePayload {
            content: content.to_string(),
            sender: sender.to_string(),
            sender_type,
            in_response_to: None,
        }
    }

    fn world() -> World {
        World::new("w", "W").with_turn_limit(5)
    }

    fn agents() -> Vec<Agent> {
        vec![Agent::new("a1", "A1"), Agent::new("a2", "A2"), Agent::new("a3", "A3")]
    }

    #[test]
    fn test_human_broadcast_reaches_everyone() {
        let m = msg("hello all", "human", SenderType::Human);
        assert!(agents().iter().all(|a| should_respond(a, &m, &world())));
    }

    #[test]
    fn test_human_mention_selects_only_first_target() {
        let m = msg("hi @A2 then ask @a1", "human", SenderType::Human);
        let answers: Vec<bool> = agents().iter().map(|a| should_respond(a, &m, &world())).collect();
        assert_eq!(answers, vec![false, true, false]);
    }

    #[test]
    fn test_unknown_first_mention_silences_everyone() {
        let m = msg("@unknown @a2 help", "human", SenderType::Human);
        assert!(agents().iter().all(|a| !should_respond(a, &m, &world())));
    }

    #[test]
    fn test_malformed_mentions_are_public() {
        let m = msg("@@ @123 @-invalid", "human", SenderType::Human);
        assert!(agents().iter().all(|a| should_respond(a, &m, &world())));
    }

    #[test]
    fn test_system_reaches_everyone() {
        let m = msg("@a1 maintenance notice", "system", SenderType::System);
        assert!(agents().iter().all(|a| should_respond(a, &m, &world())));
    }

    #[test]
    fn test_never_respond_to_self() {
        let a1 = Agent::new("a1", "A1");
        for st in [SenderType::Agent, SenderType::Human, SenderType::System] {
            let m = msg("@a1 talking to myself", "a1", st);
            assert_eq!(
                evaluate(&a1, &m, 5),
                Decision::Skip(SkipReason::OwnMessage)
            );
        }
    }

    #[test]
    fn test_agent_to_agent() {
        let a2 = Agent::new("a2", "A2");
        assert!(should_respond(&a2, &msg("@a2 your turn", "a1", SenderType::Agent), &world()));
        assert_eq!(
            evaluate(&a2, &msg("thinking out loud", "a1", SenderType::Agent), 5),
            Decision::Skip(SkipReason::AgentBroadcast)
        );
        assert_eq!(
            evaluate(&a2, &msg("@a3 over to you", "a1", SenderType::Agent), 5),
            Decision::Skip(SkipReason::MentionsOther("a3".into()))
        );
    }

    #[test]
    fn test_turn_limit_overrides() {
        let mut a1 = Agent::new("a1", "A1");
        a1.llm_call_count = 5;
        let m = msg("hello", "human", SenderType::Human);
        assert_eq!(
            evaluate(&a1, &m, 5),
            Decision::TurnLimitReached { count: 5, limit: 5 }
        );
        assert!(!should_respond(&a1, &m, &world()));
        // A skip stays a skip, not a limit breach.
        let other = msg("@a2 hi", "human", SenderType::Human);
        assert!(matches!(evaluate(&a1, &other, 5), Decision::Skip(_)));
    }

    #[test]
    fn test_inactive_agent_is_silent() {
        let mut a1 = Agent::new("a1", "A1");
        a1.status = AgentStatus::Inactive;
        let m = msg("@a1 hello", "human", SenderType::Human);
        assert_eq!(evaluate(&a1, &m, 5), Decision::Skip(SkipReason::Inactive));
    }
}

//! Conversational governance.
//!
//! - [`mention`]: the `@name` grammar.
//! - [`eligibility`]: who replies to a message.
//! - [`governor`]: turn limits, pass command and auto-mention.

pub mod eligibility;
pub mod governor;
pub mod mention;

pub use eligibility::{evaluate, should_respond, Decision, SkipReason};
pub use governor::{
    admit, complete_handoff, finalize_reply, handoff_text, Admission, FinalReply,
    GovernorState, PASS_COMMAND,
};
pub use mention::{extract_first_mention, is_mentionable};

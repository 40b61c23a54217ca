//! Agent behavior.
//!
//! [`runtime::AgentRuntime`] wraps the plain [`crate::types::Agent`] record
//! with the bus, storage and LLM references it needs to take part in a
//! world.

pub mod runtime;

pub use runtime::{Accepted, AgentRuntime, RuntimeOptions, Turn, TurnOutcome};

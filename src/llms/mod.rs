//! LLM collaborator.
//!
//! - [`base_llm`] - the [`LlmProvider`] trait, messages, options and
//!   context assembly.
//! - [`providers`] - concrete backends.

pub mod base_llm;
pub mod providers;

pub use base_llm::{build_context, LlmMessage, LlmOptions, LlmProvider, TextStream};

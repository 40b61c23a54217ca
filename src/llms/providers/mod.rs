//! Concrete LLM backends.
//!
//! | Provider | Module |
//! |----------|--------|
//! | OpenAI-compatible chat completions | [`openai`] |

pub mod openai;

pub use openai::OpenAiCompatibleProvider;

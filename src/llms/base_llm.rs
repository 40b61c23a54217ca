//! LLM collaborator interface.
//!
//! Reply generation is delegated to an injected [`LlmProvider`] resolved
//! once at startup. The core never knows which backend it talks to.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::types::{Agent, MessageRole};

// ---------------------------------------------------------------------------
// Messages and options
// ---------------------------------------------------------------------------

/// A single role-tagged message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Per-call parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmOptions {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Caller-supplied deadline for the whole call.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl LlmOptions {
    /// Options derived from an agent's model settings.
    pub fn for_agent(agent: &Agent, timeout: Duration) -> Self {
        Self {
            provider: agent.provider.clone(),
            model: agent.model.clone(),
            temperature: agent.temperature,
            max_tokens: agent.max_tokens,
            timeout: Some(timeout),
        }
    }
}

/// Incremental text deltas, terminated by exhaustion or an error item.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

// ---------------------------------------------------------------------------
// LlmProvider trait
// ---------------------------------------------------------------------------

/// Backend that turns a conversation into a reply.
///
/// Implementations should map transport failures to
/// [`LlmError::Provider`]; deadlines are enforced by the caller.
#[async_trait]
pub trait LlmProvider: Send + Sync + fmt::Debug {
    /// Generate a complete reply.
    async fn generate(
        &self,
        messages: Vec<LlmMessage>,
        options: &LlmOptions,
    ) -> Result<String, LlmError>;

    /// Generate a reply as a stream of text deltas.
    ///
    /// The default implementation yields the whole `generate` result as a
    /// single delta.
    async fn stream(
        &self,
        messages: Vec<LlmMessage>,
        options: &LlmOptions,
    ) -> Result<TextStream, LlmError> {
        let text = self.generate(messages, options).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

// ---------------------------------------------------------------------------
// Context assembly
// ---------------------------------------------------------------------------

/// Full context for an agent's next call: system prompt, then memory.
pub fn build_context(agent: &Agent) -> Vec<LlmMessage> {
    let mut messages = Vec::with_capacity(agent.memory.len() + 1);
    if !agent.system_prompt.trim().is_empty() {
        messages.push(LlmMessage::new(MessageRole::System, agent.system_prompt.clone()));
    }
    messages.extend(
        agent
            .memory
            .iter()
            .map(|entry| LlmMessage::new(entry.role, entry.content.clone())),
    );
    messages
}

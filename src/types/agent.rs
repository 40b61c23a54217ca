//! Agent record: identity, model parameters, turn counter and memory log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utilities::string_utils::same_identifier;

/// Default provider name recorded on new agents.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Default model recorded on new agents.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Whether an agent takes part in conversations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Receives memory and may reply.
    #[default]
    Active,
    /// Receives memory but never replies.
    Inactive,
}

/// Role tag on a memory entry, mirroring chat-completion roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// One line of an agent's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub role: MessageRole,
    pub content: String,
    /// Originating participant; `None` for the agent's own replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Id of the message event this entry mirrors, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl MemoryEntry {
    /// Entry for a message received from someone else.
    pub fn incoming(
        role: MessageRole,
        content: impl Into<String>,
        sender: impl Into<String>,
        message_id: Option<String>,
    ) -> Self {
        Self {
            role,
            content: content.into(),
            sender: Some(sender.into()),
            created_at: Utc::now(),
            message_id,
        }
    }

    /// Entry for the agent's own reply.
    pub fn reply(content: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            sender: None,
            created_at: Utc::now(),
            message_id: Some(message_id.into()),
        }
    }
}

/// A conversational participant as stored.
///
/// This is plain data; reply generation and bus wiring live in
/// [`crate::agents::runtime::AgentRuntime`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub status: AgentStatus,
    /// LLM calls since the last human/system message.
    #[serde(default)]
    pub llm_call_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_call_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub memory: Vec<MemoryEntry>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: String::new(),
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            status: AgentStatus::Active,
            llm_call_count: 0,
            last_call_at: None,
            created_at: Utc::now(),
            last_active: None,
            memory: Vec::new(),
        }
    }

    /// Whether `mention` addresses this agent (id or display name, any case).
    pub fn answers_to(&self, mention: &str) -> bool {
        same_identifier(mention, &self.id) || same_identifier(mention, &self.name)
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

/// Parameters for creating an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentParams {
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl CreateAgentParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

/// Partial update for an agent. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub status: Option<AgentStatus>,
}

impl UpdateAgentParams {
    pub fn apply(&self, agent: &mut Agent) {
        if let Some(name) = &self.name {
            agent.name = name.clone();
        }
        if let Some(prompt) = &self.system_prompt {
            agent.system_prompt = prompt.clone();
        }
        if let Some(provider) = &self.provider {
            agent.provider = provider.clone();
        }
        if let Some(model) = &self.model {
            agent.model = model.clone();
        }
        if self.temperature.is_some() {
            agent.temperature = self.temperature;
        }
        if self.max_tokens.is_some() {
            agent.max_tokens = self.max_tokens;
        }
        if let Some(status) = self.status {
            agent.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_to_id_and_name_case_insensitive() {
        let agent = Agent::new("research-bot", "Research");
        assert!(agent.answers_to("RESEARCH-BOT"));
        assert!(agent.answers_to("research"));
        assert!(!agent.answers_to("writer"));
    }

    #[test]
    fn test_agent_json_shape() {
        let mut agent = Agent::new("a1", "A1");
        agent.memory.push(MemoryEntry::reply("hello", "m1"));
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json["llmCallCount"], 0);
        assert_eq!(json["status"], "active");
        assert_eq!(json["memory"][0]["role"], "assistant");
        assert!(json["memory"][0].get("sender").is_none());
    }

    #[test]
    fn test_update_status() {
        let mut agent = Agent::new("a1", "A1");
        UpdateAgentParams {
            status: Some(AgentStatus::Inactive),
            ..Default::default()
        }
        .apply(&mut agent);
        assert!(!agent.is_active());
        assert_eq!(agent.model, DEFAULT_MODEL);
    }
}

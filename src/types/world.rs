//! World record and its configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TURN_LIMIT;

/// Per-world governance configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldConfig {
    /// Max consecutive LLM calls an agent may make before control is handed
    /// back to a human. `0` means "use the runtime default".
    #[serde(default)]
    pub turn_limit: u32,
}

/// An isolated conversation namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct World {
    /// Kebab-case identifier derived from the name at creation time.
    pub id: String,
    /// Display name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub config: WorldConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl World {
    /// Create a world record with the given id and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            config: WorldConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Configured turn limit, or [`DEFAULT_TURN_LIMIT`] when unset.
    pub fn turn_limit(&self) -> u32 {
        if self.config.turn_limit == 0 {
            DEFAULT_TURN_LIMIT
        } else {
            self.config.turn_limit
        }
    }

    /// Builder-style turn limit override.
    pub fn with_turn_limit(mut self, turn_limit: u32) -> Self {
        self.config.turn_limit = turn_limit;
        self
    }
}

/// Listing entry returned by `list_worlds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub turn_limit: u32,
    pub agent_count: usize,
}

/// Parameters for creating a world.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorldParams {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub turn_limit: Option<u32>,
}

impl CreateWorldParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial update for a world. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorldParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub turn_limit: Option<u32>,
}

impl UpdateWorldParams {
    /// Apply the update to `world`, bumping `updated_at`.
    pub fn apply(&self, world: &mut World) {
        if let Some(name) = &self.name {
            world.name = name.clone();
        }
        if let Some(description) = &self.description {
            world.description = Some(description.clone());
        }
        if let Some(turn_limit) = self.turn_limit {
            world.config.turn_limit = turn_limit;
        }
        world.updated_at = Utc::now();
    }
}

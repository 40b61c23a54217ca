//! Runtime settings shared by the manager, agent runtimes and transports.
//!
//! Values come from serde (embedding in a larger config document) or from
//! `AGENT_WORLDS_*` environment variables via [`RuntimeSettings::from_env`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Turn limit applied when a world does not configure its own.
pub const DEFAULT_TURN_LIMIT: u32 = 5;

/// Default LLM call timeout in seconds.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Default root directory of the file store.
pub const DEFAULT_DATA_PATH: &str = "./data/worlds";

pub const ENV_DATA_PATH: &str = "AGENT_WORLDS_DATA_PATH";
pub const ENV_TURN_LIMIT: &str = "AGENT_WORLDS_TURN_LIMIT";
pub const ENV_LLM_TIMEOUT_SECS: &str = "AGENT_WORLDS_LLM_TIMEOUT_SECS";
pub const ENV_STREAMING: &str = "AGENT_WORLDS_STREAMING";
pub const ENV_RELEASE_IDLE: &str = "AGENT_WORLDS_RELEASE_IDLE";

fn default_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_PATH)
}

fn default_turn_limit() -> u32 {
    DEFAULT_TURN_LIMIT
}

fn default_llm_timeout_secs() -> u64 {
    DEFAULT_LLM_TIMEOUT_SECS
}

fn default_streaming() -> bool {
    true
}

// ---------------------------------------------------------------------------
// RuntimeSettings
// ---------------------------------------------------------------------------

/// Process-wide knobs resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Root directory for the file store.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Turn limit for worlds that leave theirs unset.
    #[serde(default = "default_turn_limit")]
    pub default_turn_limit: u32,

    /// Timeout applied to every LLM invocation, in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Publish `sse` deltas while a reply is generated.
    #[serde(default = "default_streaming")]
    pub streaming: bool,

    /// Destroy a world's bus once its last subscription goes away.
    #[serde(default)]
    pub release_idle_worlds: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            default_turn_limit: DEFAULT_TURN_LIMIT,
            llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            streaming: true,
            release_idle_worlds: false,
        }
    }
}

impl RuntimeSettings {
    /// Build settings from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_path: lookup(ENV_DATA_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            default_turn_limit: parse_or(&lookup, ENV_TURN_LIMIT, defaults.default_turn_limit)
                .max(1),
            llm_timeout_secs: parse_or(&lookup, ENV_LLM_TIMEOUT_SECS, defaults.llm_timeout_secs),
            streaming: parse_flag(&lookup, ENV_STREAMING, defaults.streaming),
            release_idle_worlds: parse_flag(
                &lookup,
                ENV_RELEASE_IDLE,
                defaults.release_idle_worlds,
            ),
        }
    }

    /// LLM timeout as a [`Duration`].
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    /// Effective turn limit for a world-level setting (`0` means unset).
    pub fn effective_turn_limit(&self, world_turn_limit: u32) -> u32 {
        if world_turn_limit == 0 {
            self.default_turn_limit
        } else {
            world_turn_limit
        }
    }
}

fn parse_or<T: FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring malformed setting");
            default
        }),
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            tracing::warn!(key, value = %v, "ignoring malformed flag");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = RuntimeSettings::default();
        assert_eq!(settings.default_turn_limit, 5);
        assert_eq!(settings.llm_timeout(), Duration::from_secs(60));
        assert!(settings.streaming);
        assert!(!settings.release_idle_worlds);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let settings = RuntimeSettings::from_lookup(lookup(&[
            (ENV_TURN_LIMIT, "20"),
            (ENV_LLM_TIMEOUT_SECS, "5"),
            (ENV_STREAMING, "off"),
            (ENV_RELEASE_IDLE, "true"),
            (ENV_DATA_PATH, "/tmp/worlds"),
        ]));
        assert_eq!(settings.default_turn_limit, 20);
        assert_eq!(settings.llm_timeout_secs, 5);
        assert!(!settings.streaming);
        assert!(settings.release_idle_worlds);
        assert_eq!(settings.data_path, PathBuf::from("/tmp/worlds"));
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let settings = RuntimeSettings::from_lookup(lookup(&[
            (ENV_TURN_LIMIT, "many"),
            (ENV_STREAMING, "maybe"),
        ]));
        assert_eq!(settings.default_turn_limit, DEFAULT_TURN_LIMIT);
        assert!(settings.streaming);
    }

    #[test]
    fn test_effective_turn_limit() {
        let settings = RuntimeSettings::default();
        assert_eq!(settings.effective_turn_limit(0), 5);
        assert_eq!(settings.effective_turn_limit(12), 12);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let settings: RuntimeSettings =
            serde_json::from_value(serde_json::json!({ "default_turn_limit": 7 })).unwrap();
        assert_eq!(settings.default_turn_limit, 7);
        assert_eq!(settings.data_path, PathBuf::from(DEFAULT_DATA_PATH));
    }
}

//! Directory-per-world storage backend.
//!
//! ```text
//! <root>/<world-id>/config.json
//! <root>/<world-id>/agents/<agent-id>/config.json
//! <root>/<world-id>/agents/<agent-id>/system-prompt.md
//! <root>/<world-id>/agents/<agent-id>/memory.json
//! ```
//!
//! Every write goes to a sibling temp file that is then renamed over the
//! target, so a failed save never leaves a half-written document behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use super::{sort_agents, WorldStorage};
use crate::error::StorageError;
use crate::types::{Agent, MemoryEntry, World};

const CONFIG_FILE: &str = "config.json";
const PROMPT_FILE: &str = "system-prompt.md";
const MEMORY_FILE: &str = "memory.json";
const AGENTS_DIR: &str = "agents";

/// File-system backed [`WorldStorage`].
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn world_dir(&self, world_id: &str) -> PathBuf {
        self.root.join(world_id)
    }

    fn agent_dir(&self, world_id: &str, agent_id: &str) -> PathBuf {
        self.world_dir(world_id).join(AGENTS_DIR).join(agent_id)
    }

    async fn require_world(&self, world_id: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_id(world_id) {
            return Err(StorageError::world_not_found(world_id));
        }
        let dir = self.world_dir(world_id);
        if fs::try_exists(dir.join(CONFIG_FILE)).await? {
            Ok(dir)
        } else {
            Err(StorageError::world_not_found(world_id))
        }
    }

    async fn read_agent_dir(&self, dir: &Path, agent_id: &str) -> Result<Agent, StorageError> {
        let config = match fs::read(dir.join(CONFIG_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::agent_not_found(agent_id))
            }
            Err(e) => return Err(e.into()),
        };
        let mut agent: Agent = serde_json::from_slice(&config)?;

        agent.system_prompt = match fs::read_to_string(dir.join(PROMPT_FILE)).await {
            Ok(prompt) => prompt,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        agent.memory = match fs::read(dir.join(MEMORY_FILE)).await {
            Ok(bytes) => serde_json::from_slice::<Vec<MemoryEntry>>(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(agent)
    }
}

/// Ids become path components; anything that could escape the root is
/// treated as unknown.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Write `contents` to a temp file next to `path`, then rename it into place.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp, contents).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Agent config document: the record minus prompt and memory, which live
/// in their own files.
fn agent_config_document(agent: &Agent) -> Result<Vec<u8>, StorageError> {
    let mut value = serde_json::to_value(agent)?;
    if let Value::Object(map) = &mut value {
        map.remove("systemPrompt");
        map.remove("memory");
    }
    Ok(serde_json::to_vec_pretty(&value)?)
}

#[async_trait]
impl WorldStorage for FileStorage {
    async fn load_world(&self, world_id: &str) -> Result<World, StorageError> {
        let dir = self.require_world(world_id).await?;
        let bytes = fs::read(dir.join(CONFIG_FILE)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save_world(&self, world: &World) -> Result<(), StorageError> {
        if !is_safe_id(&world.id) {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("unsafe world id '{}'", world.id),
            )));
        }
        let dir = self.world_dir(&world.id);
        fs::create_dir_all(dir.join(AGENTS_DIR)).await?;
        write_atomic(&dir.join(CONFIG_FILE), &serde_json::to_vec_pretty(world)?).await
    }

    async fn delete_world(&self, world_id: &str) -> Result<(), StorageError> {
        let dir = self.require_world(world_id).await?;
        fs::remove_dir_all(dir).await?;
        Ok(())
    }

    async fn list_worlds(&self) -> Result<Vec<World>, StorageError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut worlds = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let config = entry.path().join(CONFIG_FILE);
            match fs::read(&config).await {
                Ok(bytes) => match serde_json::from_slice::<World>(&bytes) {
                    Ok(world) => worlds.push(world),
                    Err(e) => tracing::warn!(path = %config.display(), error = %e, "skipping unreadable world config"),
                },
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        worlds.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(worlds)
    }

    async fn load_agent(&self, world_id: &str, agent_id: &str) -> Result<Agent, StorageError> {
        self.require_world(world_id).await?;
        if !is_safe_id(agent_id) {
            return Err(StorageError::agent_not_found(agent_id));
        }
        self.read_agent_dir(&self.agent_dir(world_id, agent_id), agent_id)
            .await
    }

    async fn save_agent(&self, world_id: &str, agent: &Agent) -> Result<(), StorageError> {
        self.require_world(world_id).await?;
        if !is_safe_id(&agent.id) {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("unsafe agent id '{}'", agent.id),
            )));
        }
        let dir = self.agent_dir(world_id, &agent.id);
        fs::create_dir_all(&dir).await?;

        write_atomic(&dir.join(PROMPT_FILE), agent.system_prompt.as_bytes()).await?;
        write_atomic(&dir.join(MEMORY_FILE), &serde_json::to_vec_pretty(&agent.memory)?).await?;
        // Config last: an agent directory without it is not listed.
        write_atomic(&dir.join(CONFIG_FILE), &agent_config_document(agent)?).await
    }

    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), StorageError> {
        self.require_world(world_id).await?;
        if !is_safe_id(agent_id) {
            return Err(StorageError::agent_not_found(agent_id));
        }
        let dir = self.agent_dir(world_id, agent_id);
        if !fs::try_exists(dir.join(CONFIG_FILE)).await? {
            return Err(StorageError::agent_not_found(agent_id));
        }
        fs::remove_dir_all(dir).await?;
        Ok(())
    }

    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, StorageError> {
        let dir = self.require_world(world_id).await?.join(AGENTS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut agents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let agent_id = entry.file_name().to_string_lossy().to_string();
            match self.read_agent_dir(&entry.path(), &agent_id).await {
                Ok(agent) => agents.push(agent),
                Err(StorageError::NotFound { .. }) => {}
                Err(StorageError::Serialization(e)) => {
                    tracing::warn!(world_id, agent_id = %agent_id, error = %e, "skipping unreadable agent");
                }
                Err(e) => return Err(e),
            }
        }
        sort_agents(&mut agents);
        Ok(agents)
    }
}

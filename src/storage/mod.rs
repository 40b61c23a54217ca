//! Storage collaborator for worlds and agents.
//!
//! The core only sees the [`WorldStorage`] trait; the concrete backend is
//! chosen once at startup and injected into the manager.
//!
//! - [`memory::MemoryStorage`]: in-process, for tests and ephemeral servers.
//! - [`file::FileStorage`]: one directory per world, one subdirectory per
//!   agent.

pub mod file;
pub mod memory;

use std::fmt;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{Agent, World};

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Persistence operations consumed by the manager and agent runtimes.
///
/// Every method fails with [`StorageError::NotFound`] for a missing world or
/// agent (saves create) and with [`StorageError::Io`] for backend failures.
/// A failed save must leave the previously stored state intact.
#[async_trait]
pub trait WorldStorage: Send + Sync + fmt::Debug {
    async fn load_world(&self, world_id: &str) -> Result<World, StorageError>;

    async fn save_world(&self, world: &World) -> Result<(), StorageError>;

    /// Remove a world and all of its agents.
    async fn delete_world(&self, world_id: &str) -> Result<(), StorageError>;

    async fn list_worlds(&self) -> Result<Vec<World>, StorageError>;

    async fn world_exists(&self, world_id: &str) -> Result<bool, StorageError> {
        match self.load_world(world_id).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn load_agent(&self, world_id: &str, agent_id: &str) -> Result<Agent, StorageError>;

    /// Persist an agent, memory included. The world must exist.
    async fn save_agent(&self, world_id: &str, agent: &Agent) -> Result<(), StorageError>;

    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), StorageError>;

    /// Agents of a world, oldest first.
    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, StorageError>;
}

/// Stable listing order: creation time, then id.
pub(crate) fn sort_agents(agents: &mut [Agent]) {
    agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

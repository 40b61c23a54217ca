//! In-process storage backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{sort_agents, WorldStorage};
use crate::error::StorageError;
use crate::types::{Agent, World};

#[derive(Debug, Clone)]
struct WorldEntry {
    world: World,
    agents: HashMap<String, Agent>,
}

/// Map-backed [`WorldStorage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    worlds: RwLock<HashMap<String, WorldEntry>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with an I/O error (or stop doing so).
    /// Used to exercise failure paths without a real disk.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl WorldStorage for MemoryStorage {
    async fn load_world(&self, world_id: &str) -> Result<World, StorageError> {
        self.worlds
            .read()
            .get(world_id)
            .map(|e| e.world.clone())
            .ok_or_else(|| StorageError::world_not_found(world_id))
    }

    async fn save_world(&self, world: &World) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut worlds = self.worlds.write();
        match worlds.get_mut(&world.id) {
            Some(entry) => entry.world = world.clone(),
            None => {
                worlds.insert(
                    world.id.clone(),
                    WorldEntry {
                        world: world.clone(),
                        agents: HashMap::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete_world(&self, world_id: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.worlds
            .write()
            .remove(world_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::world_not_found(world_id))
    }

    async fn list_worlds(&self) -> Result<Vec<World>, StorageError> {
        let mut worlds: Vec<World> = self.worlds.read().values().map(|e| e.world.clone()).collect();
        worlds.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(worlds)
    }

    async fn load_agent(&self, world_id: &str, agent_id: &str) -> Result<Agent, StorageError> {
        let worlds = self.worlds.read();
        let entry = worlds
            .get(world_id)
            .ok_or_else(|| StorageError::world_not_found(world_id))?;
        entry
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StorageError::agent_not_found(agent_id))
    }

    async fn save_agent(&self, world_id: &str, agent: &Agent) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut worlds = self.worlds.write();
        let entry = worlds
            .get_mut(world_id)
            .ok_or_else(|| StorageError::world_not_found(world_id))?;
        entry.agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut worlds = self.worlds.write();
        let entry = worlds
            .get_mut(world_id)
            .ok_or_else(|| StorageError::world_not_found(world_id))?;
        entry
            .agents
            .remove(agent_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::agent_not_found(agent_id))
    }

    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, StorageError> {
        let worlds = self.worlds.read();
        let entry = worlds
            .get(world_id)
            .ok_or_else(|| StorageError::world_not_found(world_id))?;
        let mut agents: Vec<Agent> = entry.agents.values().cloned().collect();
        sort_agents(&mut agents);
        Ok(agents)
    }
}

//! Registry of live worlds, keyed by world id.
//!
//! The registry is an explicit object handed to the manager and the
//! subscription manager; there is no process-wide state. It also keeps the
//! per-world subscription refcount.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::events::WorldEvent;
use crate::world::live::LiveWorld;

struct Entry {
    world: Arc<LiveWorld>,
    subscribers: usize,
}

/// Live worlds plus their subscription refcounts.
#[derive(Default)]
pub struct WorldRuntimeRegistry {
    worlds: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for WorldRuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldRuntimeRegistry")
            .field("worlds", &self.ids())
            .finish()
    }
}

impl WorldRuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, world_id: &str) -> Option<Arc<LiveWorld>> {
        self.worlds.read().get(world_id).map(|e| e.world.clone())
    }

    pub fn contains(&self, world_id: &str) -> bool {
        self.worlds.read().contains_key(world_id)
    }

    /// Ids of all live worlds, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.worlds.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.worlds.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.read().is_empty()
    }

    /// Register `world` unless one with the same id is already live, and
    /// return whichever handle ends up registered.
    pub fn get_or_insert(&self, world: Arc<LiveWorld>) -> Arc<LiveWorld> {
        let mut worlds = self.worlds.write();
        let entry = worlds.entry(world.id().to_string()).or_insert_with(|| {
            tracing::debug!(world_id = %world.id(), "world registered");
            Entry {
                world: world.clone(),
                subscribers: 0,
            }
        });
        entry.world.clone()
    }

    /// Publish on the world's bus. Unknown worlds are a no-op returning 0.
    pub fn publish(&self, world_id: &str, event: &WorldEvent) -> usize {
        match self.get(world_id) {
            Some(world) => world.publish(event),
            None => {
                tracing::trace!(world_id, event_id = %event.id, "publish to unknown world ignored");
                0
            }
        }
    }

    /// Remove and shut down a world. Returns whether it was live.
    pub fn destroy(&self, world_id: &str) -> bool {
        let removed = self.worlds.write().remove(world_id);
        match removed {
            Some(entry) => {
                entry.world.shutdown();
                true
            }
            None => false,
        }
    }

    /// Shut down every live world.
    pub fn destroy_all(&self) -> usize {
        let drained: Vec<Entry> = self.worlds.write().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.world.shutdown();
        }
        drained.len()
    }

    // -----------------------------------------------------------------------
    // Subscription refcount
    // -----------------------------------------------------------------------

    /// Count one more subscriber on exactly this handle. Fails if the
    /// handle is no longer the registered one (it was destroyed meanwhile).
    pub fn retain(&self, world: &Arc<LiveWorld>) -> Option<usize> {
        let mut worlds = self.worlds.write();
        let entry = worlds.get_mut(world.id())?;
        if !Arc::ptr_eq(&entry.world, world) {
            return None;
        }
        entry.subscribers += 1;
        Some(entry.subscribers)
    }

    /// Drop one subscriber from this handle. When the count reaches zero and
    /// `evict_when_idle` is set the world is removed and shut down.
    /// Returns the remaining count; a stale handle returns 0.
    pub fn release(&self, world: &Arc<LiveWorld>, evict_when_idle: bool) -> usize {
        let evicted = {
            let mut worlds = self.worlds.write();
            let Some(entry) = worlds.get_mut(world.id()) else {
                return 0;
            };
            if !Arc::ptr_eq(&entry.world, world) {
                return 0;
            }
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers > 0 || !evict_when_idle {
                return entry.subscribers;
            }
            worlds.remove(world.id())
        };
        if let Some(entry) = evicted {
            tracing::debug!(world_id = %world.id(), "last subscriber left, releasing world");
            entry.world.shutdown();
        }
        0
    }

    pub fn subscriber_count(&self, world_id: &str) -> usize {
        self.worlds
            .read()
            .get(world_id)
            .map(|e| e.subscribers)
            .unwrap_or(0)
    }
}

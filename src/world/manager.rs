//! World and agent management.
//!
//! [`WorldManager`] is the entry point transports talk to: CRUD for worlds
//! and agents against the storage collaborator, plus materialization of
//! live worlds into the [`WorldRuntimeRegistry`]. When a world is live,
//! agent changes are applied to the running [`AgentRuntime`] as well, so
//! subscribers never see stale agent state.

use std::sync::Arc;

use crate::agents::runtime::AgentRuntime;
use crate::config::RuntimeSettings;
use crate::error::{Result, StorageError, WorldError};
use crate::events::{SenderType, WorldEvent};
use crate::governance::mention::is_mentionable;
use crate::llms::LlmProvider;
use crate::storage::WorldStorage;
use crate::types::{
    Agent, CreateAgentParams, CreateWorldParams, UpdateAgentParams, UpdateWorldParams, World,
    WorldSummary,
};
use crate::utilities::string_utils::to_kebab_case;
use crate::world::live::LiveWorld;
use crate::world::registry::WorldRuntimeRegistry;

/// Manager for worlds, agents and their live handles.
#[derive(Debug)]
pub struct WorldManager {
    storage: Arc<dyn WorldStorage>,
    llm: Arc<dyn LlmProvider>,
    registry: Arc<WorldRuntimeRegistry>,
    settings: Arc<RuntimeSettings>,
    /// Serializes materialization so a world is loaded at most once.
    materialize_lock: tokio::sync::Mutex<()>,
}

impl WorldManager {
    pub fn new(
        storage: Arc<dyn WorldStorage>,
        llm: Arc<dyn LlmProvider>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            storage,
            llm,
            registry: Arc::new(WorldRuntimeRegistry::new()),
            settings: Arc::new(settings),
            materialize_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<WorldRuntimeRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<dyn WorldStorage> {
        &self.storage
    }

    // -----------------------------------------------------------------------
    // Worlds
    // -----------------------------------------------------------------------

    /// Create a world whose id is the kebab-cased name.
    pub async fn create_world(&self, params: CreateWorldParams) -> Result<World> {
        let name = params.name.trim();
        let id = to_kebab_case(name);
        if id.is_empty() {
            return Err(WorldError::InvalidInput(format!(
                "world name '{}' does not yield a usable id",
                params.name
            )));
        }
        if self.storage.world_exists(&id).await? {
            return Err(WorldError::AlreadyExists { entity: "world", id });
        }

        let mut world = World::new(id, name);
        world.description = params.description;
        if let Some(turn_limit) = params.turn_limit {
            world.config.turn_limit = turn_limit;
        }
        self.storage.save_world(&world).await?;
        tracing::info!(world_id = %world.id, "world created");
        Ok(world)
    }

    /// Look a world up by id, falling back to its kebab-cased name.
    pub async fn get_world(&self, identifier: &str) -> Result<World> {
        match self.storage.load_world(identifier).await {
            Ok(world) => Ok(world),
            Err(StorageError::NotFound { .. }) => {
                let id = to_kebab_case(identifier);
                if id.is_empty() || id == identifier {
                    return Err(WorldError::world_not_found(identifier));
                }
                match self.storage.load_world(&id).await {
                    Ok(world) => Ok(world),
                    Err(StorageError::NotFound { .. }) => {
                        Err(WorldError::world_not_found(identifier))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `params`, persist, and refresh the live handle if any. The id
    /// never changes.
    pub async fn update_world(&self, identifier: &str, params: UpdateWorldParams) -> Result<World> {
        let mut world = self.get_world(identifier).await?;
        if let Some(name) = &params.name {
            if name.trim().is_empty() {
                return Err(WorldError::InvalidInput("world name must not be empty".into()));
            }
        }
        params.apply(&mut world);
        self.storage.save_world(&world).await?;
        if let Some(live) = self.registry.get(&world.id) {
            live.set_world(world.clone());
        }
        tracing::info!(world_id = %world.id, "world updated");
        Ok(world)
    }

    /// Delete a world. Its bus is destroyed first, regardless of how many
    /// subscriptions still reference it. The materialize lock is held until
    /// storage is gone so no new handle can be built for the dying world.
    pub async fn delete_world(&self, identifier: &str) -> Result<()> {
        let world = self.get_world(identifier).await?;
        let _guard = self.materialize_lock.lock().await;
        self.registry.destroy(&world.id);
        self.storage.delete_world(&world.id).await?;
        tracing::info!(world_id = %world.id, "world deleted");
        Ok(())
    }

    pub async fn list_worlds(&self) -> Result<Vec<WorldSummary>> {
        let worlds = self.storage.list_worlds().await?;
        let mut summaries = Vec::with_capacity(worlds.len());
        for world in worlds {
            let agent_count = match self.registry.get(&world.id) {
                Some(live) => live.agent_count(),
                None => self.storage.list_agents(&world.id).await?.len(),
            };
            summaries.push(WorldSummary {
                turn_limit: self.settings.effective_turn_limit(world.config.turn_limit),
                id: world.id,
                name: world.name,
                description: world.description,
                agent_count,
            });
        }
        Ok(summaries)
    }

    // -----------------------------------------------------------------------
    // Materialization
    // -----------------------------------------------------------------------

    /// Return the live handle for a world, loading it and its agents on
    /// first use.
    pub async fn materialize_world(&self, identifier: &str) -> Result<Arc<LiveWorld>> {
        if let Some(live) = self.registry.get(identifier) {
            return Ok(live);
        }

        let _guard = self.materialize_lock.lock().await;
        let world = self.get_world(identifier).await?;
        if let Some(live) = self.registry.get(&world.id) {
            return Ok(live);
        }

        let agents = self.storage.list_agents(&world.id).await?;
        let live = Arc::new(LiveWorld::new(
            world,
            self.storage.clone(),
            self.llm.clone(),
            self.settings.clone(),
        ));
        for agent in agents {
            live.attach_agent(agent);
        }
        tracing::info!(world_id = %live.id(), agents = live.agent_count(), "world materialized");
        Ok(self.registry.get_or_insert(live))
    }

    /// Inject a message (typically human input) into a world.
    pub async fn publish_message(
        &self,
        identifier: &str,
        content: &str,
        sender: &str,
        sender_type: SenderType,
    ) -> Result<WorldEvent> {
        if content.trim().is_empty() {
            return Err(WorldError::InvalidInput("message content must not be empty".into()));
        }
        let live = self.materialize_world(identifier).await?;
        Ok(live.publish_message(content, sender, sender_type))
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Create an agent whose id is the kebab-cased name.
    pub async fn create_agent(&self, world: &str, params: CreateAgentParams) -> Result<Agent> {
        let world = self.get_world(world).await?;
        let name = params.name.trim();
        let id = to_kebab_case(name);
        if !is_mentionable(&id) {
            return Err(WorldError::InvalidInput(format!(
                "agent name '{}' does not yield an addressable id",
                params.name
            )));
        }
        if self.find_agent(&world.id, &id).await?.is_some() {
            return Err(WorldError::AlreadyExists { entity: "agent", id });
        }

        let mut agent = Agent::new(id, name);
        agent.system_prompt = params.system_prompt;
        if let Some(provider) = params.provider {
            agent.provider = provider;
        }
        if let Some(model) = params.model {
            agent.model = model;
        }
        agent.temperature = params.temperature;
        agent.max_tokens = params.max_tokens;

        self.storage.save_agent(&world.id, &agent).await?;
        if let Some(live) = self.registry.get(&world.id) {
            live.attach_agent(agent.clone());
        }
        tracing::info!(world_id = %world.id, agent_id = %agent.id, "agent created");
        Ok(agent)
    }

    /// Look an agent up by id or name. Live state wins over storage.
    pub async fn get_agent(&self, world: &str, agent: &str) -> Result<Agent> {
        let world = self.get_world(world).await?;
        self.find_agent(&world.id, agent)
            .await?
            .ok_or_else(|| WorldError::agent_not_found(agent))
    }

    pub async fn update_agent(
        &self,
        world: &str,
        agent: &str,
        params: UpdateAgentParams,
    ) -> Result<Agent> {
        if let Some(name) = &params.name {
            if name.trim().is_empty() {
                return Err(WorldError::InvalidInput("agent name must not be empty".into()));
            }
        }
        let world = self.get_world(world).await?;
        let mut updated = self
            .find_agent(&world.id, agent)
            .await?
            .ok_or_else(|| WorldError::agent_not_found(agent))?;
        params.apply(&mut updated);
        self.storage.save_agent(&world.id, &updated).await?;

        if let Some(runtime) = self.live_runtime(&world.id, &updated.id) {
            runtime.update(|live| params.apply(live));
            updated = runtime.snapshot();
        }
        tracing::info!(world_id = %world.id, agent_id = %updated.id, "agent updated");
        Ok(updated)
    }

    /// Delete an agent. A live agent is detached from the bus only once the
    /// storage removal succeeded; on failure it keeps running unchanged.
    pub async fn delete_agent(&self, world: &str, agent: &str) -> Result<()> {
        let world = self.get_world(world).await?;
        let found = self
            .find_agent(&world.id, agent)
            .await?
            .ok_or_else(|| WorldError::agent_not_found(agent))?;
        match self.registry.get(&world.id) {
            Some(live) => {
                if let Some(runtime) = live.runtime(&found.id) {
                    runtime
                        .retire_after(self.storage.delete_agent(&world.id, &found.id))
                        .await?;
                } else {
                    self.storage.delete_agent(&world.id, &found.id).await?;
                }
                live.detach_agent(&found.id);
            }
            None => self.storage.delete_agent(&world.id, &found.id).await?,
        }
        tracing::info!(world_id = %world.id, agent_id = %found.id, "agent deleted");
        Ok(())
    }

    pub async fn list_agents(&self, world: &str) -> Result<Vec<Agent>> {
        let world = self.get_world(world).await?;
        match self.registry.get(&world.id) {
            Some(live) => Ok(live.agents()),
            None => Ok(self.storage.list_agents(&world.id).await?),
        }
    }

    /// Empty an agent's memory and reset its turn counter.
    pub async fn clear_agent_memory(&self, world: &str, agent: &str) -> Result<Agent> {
        let world = self.get_world(world).await?;
        if let Some(runtime) = self
            .registry
            .get(&world.id)
            .and_then(|live| live.runtime(agent))
        {
            runtime.clear_memory();
            runtime.persist().await?;
            tracing::info!(world_id = %world.id, agent_id = %runtime.agent_id(), "agent memory cleared");
            return Ok(runtime.snapshot());
        }

        let mut found = self
            .find_agent(&world.id, agent)
            .await?
            .ok_or_else(|| WorldError::agent_not_found(agent))?;
        found.memory.clear();
        found.llm_call_count = 0;
        found.last_call_at = None;
        self.storage.save_agent(&world.id, &found).await?;
        tracing::info!(world_id = %world.id, agent_id = %found.id, "agent memory cleared");
        Ok(found)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn live_runtime(&self, world_id: &str, agent_id: &str) -> Option<Arc<AgentRuntime>> {
        self.registry.get(world_id)?.runtime(agent_id)
    }

    /// Resolve `identifier` (id or display name) within a world.
    async fn find_agent(&self, world_id: &str, identifier: &str) -> Result<Option<Agent>> {
        if let Some(live) = self.registry.get(world_id) {
            return Ok(live
                .runtime(identifier)
                .or_else(|| live.runtime(&to_kebab_case(identifier)))
                .map(|rt| rt.snapshot()));
        }
        let agents = self.storage.list_agents(world_id).await?;
        let kebab = to_kebab_case(identifier);
        Ok(agents
            .into_iter()
            .find(|a| a.answers_to(identifier) || a.answers_to(&kebab)))
    }
}

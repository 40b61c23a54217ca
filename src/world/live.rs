//! Live handle for a materialized world.
//!
//! A [`LiveWorld`] owns the world's bus, one [`AgentRuntime`] per agent and
//! the bus registrations that wire them together. Agent handlers run the
//! synchronous half of message handling inside dispatch and spawn the rest
//! onto the tokio runtime; [`LiveWorld::flush`] waits for those tasks.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::agents::runtime::{Accepted, AgentRuntime, RuntimeOptions};
use crate::config::RuntimeSettings;
use crate::events::{EventFilter, EventKind, HandlerId, SenderType, WorldEvent, WorldEventBus};
use crate::llms::LlmProvider;
use crate::storage::WorldStorage;
use crate::types::{Agent, World};

struct AttachedAgent {
    runtime: Arc<AgentRuntime>,
    handler: HandlerId,
}

/// A world with its bus instantiated and agents listening.
pub struct LiveWorld {
    world: RwLock<World>,
    bus: Arc<WorldEventBus>,
    turn_limit: Arc<AtomicU32>,
    agents: RwLock<Vec<AttachedAgent>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
    storage: Arc<dyn WorldStorage>,
    llm: Arc<dyn LlmProvider>,
    settings: Arc<RuntimeSettings>,
}

impl fmt::Debug for LiveWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveWorld")
            .field("world_id", &self.bus.world_id())
            .field("agents", &self.agents.read().len())
            .field("bus", &self.bus)
            .finish()
    }
}

impl LiveWorld {
    pub fn new(
        world: World,
        storage: Arc<dyn WorldStorage>,
        llm: Arc<dyn LlmProvider>,
        settings: Arc<RuntimeSettings>,
    ) -> Self {
        let turn_limit = settings.effective_turn_limit(world.config.turn_limit);
        Self {
            bus: Arc::new(WorldEventBus::new(world.id.clone())),
            world: RwLock::new(world),
            turn_limit: Arc::new(AtomicU32::new(turn_limit)),
            agents: RwLock::new(Vec::new()),
            pending: Arc::new(Mutex::new(Vec::new())),
            storage,
            llm,
            settings,
        }
    }

    pub fn id(&self) -> &str {
        self.bus.world_id()
    }

    pub fn world(&self) -> World {
        self.world.read().clone()
    }

    /// Replace the world record (e.g. after an update). The id must match.
    pub fn set_world(&self, world: World) {
        let limit = self.settings.effective_turn_limit(world.config.turn_limit);
        self.turn_limit.store(limit, Ordering::SeqCst);
        *self.world.write() = world;
    }

    /// Turn limit currently enforced for this world's agents.
    pub fn turn_limit(&self) -> u32 {
        self.turn_limit.load(Ordering::SeqCst)
    }

    pub fn bus(&self) -> &Arc<WorldEventBus> {
        &self.bus
    }

    pub fn is_closed(&self) -> bool {
        self.bus.is_destroyed()
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Snapshots of every attached agent, in attach order.
    pub fn agents(&self) -> Vec<Agent> {
        self.agents.read().iter().map(|a| a.runtime.snapshot()).collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().len()
    }

    /// Runtime for the agent answering to `identifier` (id or name).
    pub fn runtime(&self, identifier: &str) -> Option<Arc<AgentRuntime>> {
        self.agents
            .read()
            .iter()
            .find(|a| a.runtime.answers_to(identifier))
            .map(|a| a.runtime.clone())
    }

    /// Build a runtime for `agent` and register its message handler.
    pub fn attach_agent(&self, agent: Agent) -> Arc<AgentRuntime> {
        let agent_id = agent.id.clone();
        let runtime = Arc::new(AgentRuntime::new(
            agent,
            self.bus.clone(),
            self.turn_limit.clone(),
            self.storage.clone(),
            self.llm.clone(),
            RuntimeOptions {
                llm_timeout: self.settings.llm_timeout(),
                streaming: self.settings.streaming,
            },
        ));

        let handler_runtime = runtime.clone();
        let pending = self.pending.clone();
        let handler = self.bus.subscribe(
            format!("agent:{}", agent_id),
            EventFilter::only(EventKind::Message),
            move |event: &WorldEvent| {
                let accepted = handler_runtime.accept(event);
                if accepted == Accepted::Ignored {
                    return;
                }
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let rt = handler_runtime.clone();
                        let task = handle.spawn(async move {
                            rt.complete(accepted).await;
                        });
                        let mut pending = pending.lock();
                        pending.retain(|t| !t.is_finished());
                        pending.push(task);
                    }
                    Err(_) => tracing::warn!(
                        world_id = %handler_runtime.world_id(),
                        event_id = %event.id,
                        "no async runtime available, reply dropped"
                    ),
                }
            },
        );

        tracing::debug!(world_id = %self.id(), agent_id = %agent_id, "agent attached");
        self.agents.write().push(AttachedAgent {
            runtime: runtime.clone(),
            handler,
        });
        runtime
    }

    /// Unregister and retire the agent with the given id.
    pub fn detach_agent(&self, agent_id: &str) -> Option<Arc<AgentRuntime>> {
        let detached = {
            let mut agents = self.agents.write();
            let pos = agents.iter().position(|a| a.runtime.agent_id() == agent_id)?;
            agents.remove(pos)
        };
        self.bus.unsubscribe(&detached.handler);
        detached.runtime.retire();
        tracing::debug!(world_id = %self.id(), agent_id, "agent detached");
        Some(detached.runtime)
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Publish a chat message into the world and return the event.
    ///
    /// On a closed world this is a no-op apart from building the event.
    pub fn publish_message(
        &self,
        content: impl Into<String>,
        sender: impl Into<String>,
        sender_type: SenderType,
    ) -> WorldEvent {
        let event = WorldEvent::message(content, sender, sender_type);
        tracing::debug!(world_id = %self.id(), event_id = %event.id, "publishing message");
        self.bus.publish(&event);
        event
    }

    pub fn publish(&self, event: &WorldEvent) -> usize {
        self.bus.publish(event)
    }

    /// Wait until every reply task spawned so far, and any they spawned in
    /// turn, has finished.
    pub async fn flush(&self) {
        loop {
            let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock());
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!(world_id = %self.id(), error = %e, "reply task failed");
                }
            }
        }
    }

    /// Retire every agent and destroy the bus. Idempotent.
    pub fn shutdown(&self) {
        let detached: Vec<AttachedAgent> = std::mem::take(&mut *self.agents.write());
        for attached in &detached {
            attached.runtime.retire();
        }
        let handlers = self.bus.destroy();
        if !detached.is_empty() || handlers > 0 {
            tracing::info!(world_id = %self.id(), agents = detached.len(), "world shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::actions;
    use crate::governance::governor::PASS_COMMAND;
    use crate::storage::MemoryStorage;
    use crate::testing::{EventLog, ScriptedLlm};

    async fn live_world(llm: ScriptedLlm, agents: &[(&str, &str)]) -> (Arc<LiveWorld>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let world = World::new("w1", "W1");
        storage.save_world(&world).await.unwrap();
        let settings = RuntimeSettings {
            streaming: false,
            ..RuntimeSettings::default()
        };
        let live = Arc::new(LiveWorld::new(world, storage.clone(), Arc::new(llm), Arc::new(settings)));
        for (id, name) in agents {
            let agent = Agent::new(*id, *name);
            storage.save_agent("w1", &agent).await.unwrap();
            live.attach_agent(agent);
        }
        (live, storage)
    }

    #[tokio::test]
    async fn test_human_broadcast_gets_one_reply_per_agent() {
        let llm = ScriptedLlm::new().with_fallback("hello human");
        let (live, _) = live_world(llm.clone(), &[("a1", "A1"), ("a2", "A2")]).await;
        let log = EventLog::attach(live.bus());

        live.publish_message("hi everyone", "human", SenderType::Human);
        live.flush().await;

        let senders: Vec<String> = log
            .messages()
            .iter()
            .map(|e| e.as_message().unwrap().sender.clone())
            .collect();
        assert_eq!(senders.len(), 3);
        assert!(senders.contains(&"a1".to_string()));
        assert!(senders.contains(&"a2".to_string()));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_first_mention_triggers_single_agent() {
        let llm = ScriptedLlm::new().with_fallback("on it");
        let (live, _) = live_world(llm.clone(), &[("a1", "A1"), ("a2", "A2")]).await;

        live.publish_message("hi @a1 say hi to @a2", "human", SenderType::Human);
        live.flush().await;

        assert_eq!(llm.call_count(), 1);
        // Passive memory: the bystander saw the human message and a1's reply.
        let a2 = live.runtime("a2").unwrap().snapshot();
        assert_eq!(a2.memory.len(), 2);
        assert_eq!(a2.llm_call_count, 0);
    }

    #[tokio::test]
    async fn test_agent_ping_pong_stops_at_turn_limit() {
        // a1 always addresses a2; a2's replies are auto-mentioned back to a1.
        let llm = ScriptedLlm::new().with_fallback("@a2 your turn");
        let (live, _) = live_world(llm.clone(), &[("a1", "A1"), ("a2", "A2")]).await;
        let log = EventLog::attach(live.bus());

        live.publish_message("@a1 start", "human", SenderType::Human);
        live.flush().await;

        let notices: Vec<_> = log
            .events()
            .into_iter()
            .filter(|e| e.as_system().map(|s| s.action == actions::TURN_LIMIT_REACHED).unwrap_or(false))
            .collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].as_system().unwrap().detail.as_ref().unwrap()["agentId"], "a1");

        assert_eq!(live.runtime("a1").unwrap().snapshot().llm_call_count, 5);
        assert_eq!(live.runtime("a2").unwrap().snapshot().llm_call_count, 5);
        assert_eq!(llm.call_count(), 10);

        // A human message resets the counters and a1 answers again.
        live.publish_message("@a1 one more", "human", SenderType::Human);
        assert_eq!(live.runtime("a1").unwrap().snapshot().llm_call_count, 1);
        live.flush().await;
    }

    #[tokio::test]
    async fn test_pass_returns_control_and_stops_exchange() {
        let llm = ScriptedLlm::new()
            .with_reply("@a2 can you check?")
            .with_reply(format!("I have nothing {}", PASS_COMMAND));
        let (live, _) = live_world(llm.clone(), &[("a1", "A1"), ("a2", "A2")]).await;
        let log = EventLog::attach(live.bus());

        live.publish_message("@a1 begin", "human", SenderType::Human);
        live.flush().await;

        let texts: Vec<String> = log
            .messages()
            .iter()
            .map(|e| e.as_message().unwrap().content.clone())
            .collect();
        assert_eq!(
            texts,
            vec![
                "@a1 begin".to_string(),
                "@a2 can you check?".to_string(),
                "@human A2 is passing control to you".to_string(),
            ]
        );
        assert_eq!(live.runtime("a2").unwrap().snapshot().llm_call_count, 0);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_detached_agent_stops_listening() {
        let llm = ScriptedLlm::new().with_fallback("hi");
        let (live, _) = live_world(llm.clone(), &[("a1", "A1")]).await;
        let runtime = live.detach_agent("a1").unwrap();
        assert!(runtime.is_retired());
        assert!(live.detach_agent("a1").is_none());

        live.publish_message("hello", "human", SenderType::Human);
        live.flush().await;
        assert_eq!(llm.call_count(), 0);
        assert!(runtime.snapshot().memory.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_makes_publish_noop() {
        let llm = ScriptedLlm::new().with_fallback("hi");
        let (live, _) = live_world(llm.clone(), &[("a1", "A1")]).await;
        live.shutdown();
        live.shutdown();
        assert!(live.is_closed());
        assert_eq!(live.publish(&WorldEvent::message("x", "human", SenderType::Human)), 0);
        live.flush().await;
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_turn_limit_follows_world_updates() {
        let (live, _) = live_world(ScriptedLlm::new(), &[]).await;
        assert_eq!(live.turn_limit(), 5);
        live.set_world(live.world().with_turn_limit(2));
        assert_eq!(live.turn_limit(), 2);
    }

    #[tokio::test]
    async fn test_passive_memory_is_persisted() {
        let (live, storage) = live_world(ScriptedLlm::new(), &[("a1", "A1"), ("a2", "A2")]).await;
        live.publish_message("@a2 hi", "human", SenderType::Human);
        live.flush().await;
        let stored = storage.load_agent("w1", "a1").await.unwrap();
        assert_eq!(stored.memory.len(), 1);
        assert_eq!(stored.memory[0].content, "@a2 hi");
    }
}

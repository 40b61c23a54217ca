//! Agent runtime: the behavior object wrapped around a plain [`Agent`].
//!
//! A runtime owns the live copy of one agent record and references to the
//! world's bus and the storage/LLM collaborators. Handling a message is
//! split in two:
//!
//! 1. [`AgentRuntime::accept`] runs synchronously inside the bus handler:
//!    passive memory append, counter reset, eligibility and counter
//!    increment happen under the agent lock with no yield point.
//! 2. [`AgentRuntime::complete`] runs afterwards on the async runtime:
//!    persistence, the LLM call, reply post-processing and publication.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;

use crate::error::{LlmError, StorageError};
use crate::events::{actions, new_event_id, MessagePayload, SenderType, SsePhase, WorldEvent, WorldEventBus};
use crate::governance::governor::{turn_limit_text, HUMAN_HANDLE};
use crate::governance::{admit, complete_handoff, finalize_reply, Admission, FinalReply, GovernorState};
use crate::llms::{build_context, LlmMessage, LlmOptions, LlmProvider};
use crate::storage::WorldStorage;
use crate::types::{Agent, MemoryEntry, MessageRole};

// ---------------------------------------------------------------------------
// Turn bookkeeping
// ---------------------------------------------------------------------------

/// An admitted reply: the counter has already been incremented.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Id of the message event being answered.
    pub trigger_id: String,
    pub trigger: MessagePayload,
    /// Value of `llm_call_count` after the increment.
    pub call_number: u32,
}

/// Result of the synchronous half of message handling.
#[derive(Debug, Clone, PartialEq)]
pub enum Accepted {
    /// The agent's own message: nothing changed.
    Ignored,
    /// Memory (and possibly the counter) changed; no reply.
    Remembered,
    /// Memory changed and a reply was admitted.
    Respond(Turn),
}

/// How a completed turn ended, for callers that drive turns directly.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A reply was published.
    Replied(WorldEvent),
    /// The agent passed; the handoff text was published.
    HandedOff(WorldEvent),
    /// The model produced nothing usable.
    Empty,
    /// The LLM call failed or timed out; an error event was published.
    Failed(LlmError),
    /// The world was torn down before the call was made.
    Cancelled,
}

/// Knobs the runtime reads on every turn.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub llm_timeout: Duration,
    pub streaming: bool,
}

// ---------------------------------------------------------------------------
// AgentRuntime
// ---------------------------------------------------------------------------

/// Live agent bound to one world's bus.
pub struct AgentRuntime {
    world_id: String,
    agent: Mutex<Agent>,
    governor: Mutex<GovernorState>,
    bus: Arc<WorldEventBus>,
    turn_limit: Arc<AtomicU32>,
    storage: Arc<dyn WorldStorage>,
    llm: Arc<dyn LlmProvider>,
    options: RuntimeOptions,
    /// Serializes saves so an older snapshot never overwrites a newer one.
    save_lock: tokio::sync::Mutex<()>,
    /// Set once the agent is detached; later saves are skipped.
    retired: AtomicBool,
}

impl fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("world_id", &self.world_id)
            .field("agent_id", &self.agent_id())
            .field("retired", &self.is_retired())
            .finish()
    }
}

impl AgentRuntime {
    pub fn new(
        agent: Agent,
        bus: Arc<WorldEventBus>,
        turn_limit: Arc<AtomicU32>,
        storage: Arc<dyn WorldStorage>,
        llm: Arc<dyn LlmProvider>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            world_id: bus.world_id().to_string(),
            agent: Mutex::new(agent),
            governor: Mutex::new(GovernorState::default()),
            bus,
            turn_limit,
            storage,
            llm,
            options,
            save_lock: tokio::sync::Mutex::new(()),
            retired: AtomicBool::new(false),
        }
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    pub fn agent_id(&self) -> String {
        self.agent.lock().id.clone()
    }

    /// Copy of the live record.
    pub fn snapshot(&self) -> Agent {
        self.agent.lock().clone()
    }

    /// Whether `mention` addresses this agent.
    pub fn answers_to(&self, mention: &str) -> bool {
        self.agent.lock().answers_to(mention)
    }

    /// Mutate the live record in place. Does not persist.
    pub fn update<R>(&self, f: impl FnOnce(&mut Agent) -> R) -> R {
        f(&mut self.agent.lock())
    }

    /// Reset memory and turn bookkeeping.
    pub fn clear_memory(&self) {
        let mut agent = self.agent.lock();
        agent.memory.clear();
        agent.llm_call_count = 0;
        agent.last_call_at = None;
        *self.governor.lock() = GovernorState::default();
    }

    /// Stop persisting: the agent was removed from its world.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    /// Run `removal` under the save lock and retire only if it succeeds, so
    /// an in-flight reply can neither write the agent back after a delete
    /// nor be lost when the delete fails.
    pub async fn retire_after<T, E>(
        &self,
        removal: impl std::future::Future<Output = Result<T, E>>,
    ) -> Result<T, E> {
        let _guard = self.save_lock.lock().await;
        let out = removal.await?;
        self.retire();
        Ok(out)
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Save the current record.
    pub async fn persist(&self) -> Result<(), StorageError> {
        let _guard = self.save_lock.lock().await;
        if self.is_retired() {
            tracing::debug!(world_id = %self.world_id, "skipping save for retired agent");
            return Ok(());
        }
        let snapshot = self.snapshot();
        self.storage.save_agent(&self.world_id, &snapshot).await
    }

    // -----------------------------------------------------------------------
    // Synchronous half
    // -----------------------------------------------------------------------

    /// Record `event` and decide whether to reply.
    ///
    /// Non-message events are ignored. Must not be called with the agent
    /// lock held.
    pub fn accept(&self, event: &WorldEvent) -> Accepted {
        let Some(message) = event.as_message() else {
            return Accepted::Ignored;
        };
        let turn_limit = self.turn_limit.load(Ordering::SeqCst);

        let (admission, agent_id, agent_name) = {
            let mut agent = self.agent.lock();
            if agent.answers_to(&message.sender) {
                return Accepted::Ignored;
            }
            let role = match message.sender_type {
                SenderType::System => MessageRole::System,
                SenderType::Human | SenderType::Agent => MessageRole::User,
            };
            agent.memory.push(MemoryEntry::incoming(
                role,
                message.content.clone(),
                message.sender.clone(),
                Some(event.id.clone()),
            ));

            let mut governor = self.governor.lock();
            let admission = admit(&mut agent, &mut governor, message, turn_limit);
            (admission, agent.id.clone(), agent.name.clone())
        };

        tracing::debug!(
            world_id = %self.world_id,
            agent_id = %agent_id,
            event_id = %event.id,
            admission = ?admission,
            "message evaluated"
        );

        match admission {
            Admission::Proceed { call_number } => Accepted::Respond(Turn {
                trigger_id: event.id.clone(),
                trigger: message.clone(),
                call_number,
            }),
            Admission::HandBack { count, limit } => {
                tracing::info!(
                    world_id = %self.world_id,
                    agent_id = %agent_id,
                    count,
                    limit,
                    "turn limit reached, handing control back"
                );
                let notice = WorldEvent::system(
                    actions::TURN_LIMIT_REACHED,
                    Some(json!({
                        "agentId": agent_id,
                        "count": count,
                        "limit": limit,
                        "target": HUMAN_HANDLE,
                        "message": turn_limit_text(&agent_name, limit),
                    })),
                );
                self.bus.publish(&notice);
                Accepted::Remembered
            }
            Admission::Declined(_) => Accepted::Remembered,
        }
    }

    // -----------------------------------------------------------------------
    // Asynchronous half
    // -----------------------------------------------------------------------

    /// Persist what `accept` recorded and, if admitted, produce the reply.
    pub async fn complete(&self, accepted: Accepted) -> Option<TurnOutcome> {
        match accepted {
            Accepted::Ignored => None,
            Accepted::Remembered => {
                self.persist_logged().await;
                None
            }
            Accepted::Respond(turn) => {
                self.persist_logged().await;
                Some(self.respond(turn).await)
            }
        }
    }

    /// `accept` followed by `complete`.
    pub async fn process_message(&self, event: &WorldEvent) -> Option<TurnOutcome> {
        let accepted = self.accept(event);
        self.complete(accepted).await
    }

    /// Generate, post-process, persist and publish the reply to `turn`.
    pub async fn respond(&self, turn: Turn) -> TurnOutcome {
        if self.bus.is_destroyed() {
            tracing::debug!(world_id = %self.world_id, "world closed before reply, skipping LLM call");
            return TurnOutcome::Cancelled;
        }

        let (messages, llm_options, agent_id) = {
            let agent = self.agent.lock();
            (
                build_context(&agent),
                LlmOptions::for_agent(&agent, self.options.llm_timeout),
                agent.id.clone(),
            )
        };
        let message_id = new_event_id();

        tracing::debug!(
            world_id = %self.world_id,
            agent_id = %agent_id,
            message_id = %message_id,
            call_number = turn.call_number,
            "calling LLM"
        );

        let raw = match self.call_llm(messages, &llm_options, &agent_id, &message_id).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(
                    world_id = %self.world_id,
                    agent_id = %agent_id,
                    error = %err,
                    "LLM call failed"
                );
                if self.options.streaming {
                    self.bus.publish(&WorldEvent::sse(
                        &agent_id,
                        &message_id,
                        SsePhase::Error,
                        Some(err.to_string()),
                    ));
                }
                self.bus.publish(&WorldEvent::system(
                    actions::ERROR,
                    Some(json!({
                        "agentId": agent_id,
                        "messageId": message_id,
                        "error": err.to_string(),
                    })),
                ));
                return TurnOutcome::Failed(err);
            }
        };

        let final_reply = {
            let mut agent = self.agent.lock();
            let final_reply = finalize_reply(&agent, &raw, &turn.trigger);
            if let Some(text) = final_reply.text() {
                if matches!(final_reply, FinalReply::Handoff(_)) {
                    complete_handoff(&mut agent, &mut self.governor.lock());
                }
                agent.memory.push(MemoryEntry::reply(text, message_id.clone()));
                agent.last_active = Some(Utc::now());
            }
            final_reply
        };

        if self.options.streaming {
            self.bus.publish(&WorldEvent::sse(
                &agent_id,
                &message_id,
                SsePhase::End,
                final_reply.text().map(str::to_string),
            ));
        }

        let Some(text) = final_reply.text() else {
            tracing::debug!(world_id = %self.world_id, agent_id = %agent_id, "empty reply, nothing published");
            return TurnOutcome::Empty;
        };

        self.persist_logged().await;

        let event = WorldEvent::message_with_id(
            message_id,
            text,
            agent_id.clone(),
            SenderType::Agent,
            Some(turn.trigger_id),
        );
        self.bus.publish(&event);

        match final_reply {
            FinalReply::Handoff(_) => {
                tracing::info!(world_id = %self.world_id, agent_id = %agent_id, "agent passed control to human");
                TurnOutcome::HandedOff(event)
            }
            _ => TurnOutcome::Replied(event),
        }
    }

    /// Run the LLM call under the configured deadline, publishing `sse`
    /// start and chunk events when streaming.
    async fn call_llm(
        &self,
        messages: Vec<LlmMessage>,
        options: &LlmOptions,
        agent_id: &str,
        message_id: &str,
    ) -> Result<String, LlmError> {
        let timeout = self.options.llm_timeout;
        let call = async {
            if !self.options.streaming {
                return self.llm.generate(messages, options).await;
            }

            self.bus
                .publish(&WorldEvent::sse(agent_id, message_id, SsePhase::Start, None));
            let mut deltas = self.llm.stream(messages, options).await?;
            let mut text = String::new();
            while let Some(delta) = deltas.next().await {
                let delta = delta?;
                if delta.is_empty() {
                    continue;
                }
                self.bus.publish(&WorldEvent::sse(
                    agent_id,
                    message_id,
                    SsePhase::Chunk,
                    Some(delta.clone()),
                ));
                text.push_str(&delta);
            }
            Ok::<String, LlmError>(text)
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            tracing::error!(world_id = %self.world_id, error = %e, "failed to persist agent");
        }
    }
}

//! # agent-worlds
//!
//! Multi-world orchestration for LLM-backed conversational agents.
//!
//! A *world* is an isolated conversation namespace with its own agents,
//! event bus and turn-limit configuration. Humans and agents exchange
//! messages on the world's bus; `@mentions` decide which single agent (if
//! any) replies, and a conversation governor keeps agent-to-agent exchanges
//! from running away.
//!
//! - [`world::WorldManager`]: CRUD and materialization of live worlds.
//! - [`events::WorldEventBus`]: per-world synchronous fan-out.
//! - [`governance`]: mention grammar, eligibility and the governor.
//! - [`subscription::SubscriptionManager`]: transport attach/detach.
//! - [`agents::AgentRuntime`]: memory plus reply generation for one agent.
//! - [`storage`] and [`llms`]: the injected collaborators.

pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod governance;
pub mod llms;
pub mod server;
pub mod storage;
pub mod subscription;
pub mod types;
pub mod utilities;
pub mod world;

#[cfg(test)]
pub(crate) mod testing;

pub use agents::AgentRuntime;
pub use config::RuntimeSettings;
pub use error::{Result, WorldError};
pub use events::{SenderType, WorldEvent, WorldEventBus};
pub use storage::{FileStorage, MemoryStorage, WorldStorage};
pub use subscription::{ClientConnection, Subscription, SubscriptionManager};
pub use types::{Agent, World};
pub use world::{LiveWorld, WorldManager, WorldRuntimeRegistry};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Plain data records for worlds and agents.
//!
//! These are the shapes persisted by the storage collaborator. Behavior
//! lives elsewhere: see [`crate::agents::runtime::AgentRuntime`] and
//! [`crate::world::live::LiveWorld`].

pub mod agent;
pub mod world;

pub use agent::{
    Agent, AgentStatus, CreateAgentParams, MemoryEntry, MessageRole, UpdateAgentParams,
};
pub use world::{CreateWorldParams, UpdateWorldParams, World, WorldConfig, WorldSummary};

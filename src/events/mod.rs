//! World event model and the per-world bus.
//!
//! - [`world_event`]: the `{id, type, timestamp, payload}` envelope.
//! - [`event_bus`]: synchronous, isolated fan-out for one world.

pub mod event_bus;
pub mod world_event;

pub use event_bus::{EventFilter, EventHandler, HandlerId, WorldEventBus};
pub use world_event::{
    actions, new_event_id, EventKind, EventPayload, MessagePayload, SenderType, SsePayload,
    SsePhase, SystemPayload, WorldEvent,
};

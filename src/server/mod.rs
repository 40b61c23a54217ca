//! HTTP/WebSocket transport for live worlds.
//!
//! A thin adapter over [`crate::world::WorldManager`] and
//! [`crate::subscription::SubscriptionManager`]: the core never depends on
//! anything in here.
//!
//! # Endpoints
//!
//! - `GET /health`           - Liveness probe
//! - `GET /worlds`           - World summaries
//! - `GET /worlds/:world`    - World with materialized agents
//! - `GET /worlds/:world/ws` - Event stream and human input

pub mod routes;

pub use routes::{app_router, AppState};

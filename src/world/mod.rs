//! Worlds at runtime.
//!
//! - [`manager`]: CRUD and materialization entry point.
//! - [`registry`]: live worlds keyed by id, with subscription refcounts.
//! - [`live`]: the live handle (bus plus agent runtimes).

pub mod live;
pub mod manager;
pub mod registry;

pub use live::LiveWorld;
pub use manager::WorldManager;
pub use registry::WorldRuntimeRegistry;

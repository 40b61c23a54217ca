//! Subscription lifecycle: how a transport attaches to and detaches from a
//! live world.
//!
//! Subscribing always materializes the world fully and immediately sends
//! the connection a `subscribed` system event carrying the world record and
//! every agent, so a client needs no second round trip. From then on every
//! bus event is forwarded to the connection as JSON.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;

use crate::error::{Result, WorldError};
use crate::events::{actions, new_event_id, EventFilter, HandlerId, WorldEvent};
use crate::subscription::connection::ClientConnection;
use crate::world::{LiveWorld, WorldManager, WorldRuntimeRegistry};

/// Attempts to obtain a handle that is not torn down between
/// materialization and registration.
const MATERIALIZE_ATTEMPTS: usize = 3;

/// Hands out [`Subscription`]s for worlds owned by a [`WorldManager`].
#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    manager: Arc<WorldManager>,
}

impl SubscriptionManager {
    pub fn new(manager: Arc<WorldManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<WorldManager> {
        &self.manager
    }

    /// Attach `connection` to the world named by `world_identifier`.
    ///
    /// Fails with [`WorldError::AlreadyClosed`] if the connection is not
    /// open and with [`WorldError::NotFound`] if the world does not exist.
    pub async fn subscribe(
        &self,
        world_identifier: &str,
        connection: Arc<dyn ClientConnection>,
    ) -> Result<Subscription> {
        if !connection.is_open() {
            return Err(WorldError::AlreadyClosed);
        }

        let world = self.retained_world(world_identifier).await?;
        let registry = self.manager.registry().clone();
        let release_when_idle = self.manager.settings().release_idle_worlds;

        if !connection.is_open() {
            registry.release(&world, release_when_idle);
            return Err(WorldError::AlreadyClosed);
        }

        let id = new_event_id();
        let forward_to = connection.clone();
        let world_id = world.id().to_string();
        let handler = world.bus().subscribe(
            format!("client:{}", id),
            EventFilter::All,
            move |event: &WorldEvent| match event.to_json() {
                Ok(frame) => {
                    if let Err(e) = forward_to.send(frame) {
                        forward_to.on_error(&e);
                    }
                }
                Err(e) => tracing::error!(
                    world_id = %world_id,
                    event_id = %event.id,
                    error = %e,
                    "failed to serialize event"
                ),
            },
        );

        let ack = WorldEvent::system(
            actions::SUBSCRIBED,
            Some(json!({
                "subscriptionId": id,
                "world": world.world(),
                "agents": world.agents(),
            })),
        );
        match ack.to_json() {
            Ok(frame) => {
                if let Err(e) = connection.send(frame) {
                    connection.on_error(&e);
                }
            }
            Err(e) => tracing::error!(world_id = %world.id(), error = %e, "failed to serialize ack"),
        }

        tracing::info!(
            world_id = %world.id(),
            subscription_id = %id,
            subscribers = registry.subscriber_count(world.id()),
            "client subscribed"
        );

        Ok(Subscription {
            id,
            world,
            handler,
            registry,
            release_when_idle,
            active: AtomicBool::new(true),
        })
    }

    async fn retained_world(&self, identifier: &str) -> Result<Arc<LiveWorld>> {
        for _ in 0..MATERIALIZE_ATTEMPTS {
            let world = self.manager.materialize_world(identifier).await?;
            if self.manager.registry().retain(&world).is_some() {
                return Ok(world);
            }
            tracing::debug!(world_id = %world.id(), "world torn down during subscribe, retrying");
        }
        Err(WorldError::world_not_found(identifier))
    }
}

/// A transport's live attachment to one world.
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: String,
    world: Arc<LiveWorld>,
    handler: HandlerId,
    registry: Arc<WorldRuntimeRegistry>,
    release_when_idle: bool,
    active: AtomicBool,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("world_id", &self.world.id())
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The materialized world this subscription is attached to.
    pub fn world(&self) -> &Arc<LiveWorld> {
        &self.world
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Detach this subscription's listener and drop its refcount. Returns
    /// `false` if it was already unsubscribed.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.world.bus().unsubscribe(&self.handler);
        let remaining = self.registry.release(&self.world, self.release_when_idle);
        tracing::info!(
            world_id = %self.world.id(),
            subscription_id = %self.id,
            remaining,
            "client unsubscribed"
        );
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

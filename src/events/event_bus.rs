//! Per-world event bus.
//!
//! Each world owns exactly one [`WorldEventBus`]. Buses share nothing, so a
//! handler registered on world A can never observe world B's events.
//!
//! Dispatch is synchronous: `publish` invokes every matching handler in
//! registration order before returning. Publishes on the same bus are
//! serialized by a re-entrant dispatch lock, so two concurrent publishes
//! never interleave while a handler may still publish from inside its own
//! callback (nested delivery happens depth-first). After [`destroy`]
//! every operation is a silent no-op.
//!
//! [`destroy`]: WorldEventBus::destroy

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};

use crate::events::world_event::{EventKind, WorldEvent};

// ---------------------------------------------------------------------------
// Handler types
// ---------------------------------------------------------------------------

/// A synchronous event handler.
pub type EventHandler = Arc<dyn Fn(&WorldEvent) + Send + Sync>;

/// Token identifying one registration, returned by `subscribe`.
#[derive(Clone)]
pub struct HandlerId {
    /// Human-readable name, used in logs.
    pub name: String,
    /// Unique numeric ID (monotonically increasing across all buses).
    id: u64,
}

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({}:{})", self.id, self.name)
    }
}

impl PartialEq for HandlerId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for HandlerId {}

impl std::hash::Hash for HandlerId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

static HANDLER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl HandlerId {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: HANDLER_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Which event categories a handler wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Kinds(Vec<EventKind>),
}

impl EventFilter {
    pub fn only(kind: EventKind) -> Self {
        EventFilter::Kinds(vec![kind])
    }

    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal handler entry
// ---------------------------------------------------------------------------

struct HandlerEntry {
    id: HandlerId,
    filter: EventFilter,
    handler: EventHandler,
    /// Cleared on unsubscribe so an in-progress dispatch skips it.
    active: AtomicBool,
}

// ---------------------------------------------------------------------------
// WorldEventBus
// ---------------------------------------------------------------------------

/// Isolated publish/subscribe channel for one world.
pub struct WorldEventBus {
    world_id: String,
    handlers: RwLock<Vec<Arc<HandlerEntry>>>,
    dispatch: ReentrantMutex<()>,
    destroyed: AtomicBool,
}

impl fmt::Debug for WorldEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldEventBus")
            .field("world_id", &self.world_id)
            .field("handlers", &self.handler_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl WorldEventBus {
    /// Create the bus for `world_id`.
    pub fn new(world_id: impl Into<String>) -> Self {
        let world_id = world_id.into();
        tracing::debug!(world_id = %world_id, "event bus created");
        Self {
            world_id,
            handlers: RwLock::new(Vec::new()),
            dispatch: ReentrantMutex::new(()),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register `handler` for events matching `filter`.
    ///
    /// On a destroyed bus the returned token is inert: nothing is registered
    /// and unsubscribing it is a no-op.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        filter: EventFilter,
        handler: impl Fn(&WorldEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = HandlerId::new(name);
        if self.is_destroyed() {
            tracing::debug!(world_id = %self.world_id, handler = ?id, "subscribe on destroyed bus ignored");
            return id;
        }
        let entry = Arc::new(HandlerEntry {
            id: id.clone(),
            filter,
            handler: Arc::new(handler),
            active: AtomicBool::new(true),
        });
        self.handlers.write().push(entry);
        tracing::trace!(world_id = %self.world_id, handler = ?id, "handler subscribed");
        id
    }

    /// Remove a registration. Returns `true` if something was removed;
    /// repeated calls are harmless.
    pub fn unsubscribe(&self, handler_id: &HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(pos) = handlers.iter().position(|e| e.id == *handler_id) else {
            return false;
        };
        let entry = handlers.remove(pos);
        entry.active.store(false, Ordering::Release);
        tracing::trace!(world_id = %self.world_id, handler = ?handler_id, "handler unsubscribed");
        true
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    /// Deliver `event` to every matching handler in registration order.
    ///
    /// Returns how many handlers were invoked (0 on a destroyed bus). A
    /// panicking handler is logged and does not stop delivery to the rest.
    pub fn publish(&self, event: &WorldEvent) -> usize {
        if self.is_destroyed() {
            tracing::trace!(world_id = %self.world_id, event_id = %event.id, "publish on destroyed bus ignored");
            return 0;
        }

        let _guard = self.dispatch.lock();

        let kind = event.kind();
        let entries: Vec<Arc<HandlerEntry>> = self
            .handlers
            .read()
            .iter()
            .filter(|e| e.filter.matches(kind))
            .cloned()
            .collect();

        let mut delivered = 0;
        for entry in entries {
            if self.is_destroyed() {
                break;
            }
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            let handler = entry.handler.clone();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(event);
            }));
            if result.is_err() {
                tracing::error!(
                    world_id = %self.world_id,
                    handler = ?entry.id,
                    event_id = %event.id,
                    "event handler panicked"
                );
            }
            delivered += 1;
        }
        delivered
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Force-unsubscribe every handler and refuse all further delivery.
    ///
    /// Returns the number of handlers detached. Idempotent.
    pub fn destroy(&self) -> usize {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let drained: Vec<Arc<HandlerEntry>> = std::mem::take(&mut *self.handlers.write());
        for entry in &drained {
            entry.active.store(false, Ordering::Release);
        }
        tracing::debug!(world_id = %self.world_id, detached = drained.len(), "event bus destroyed");
        drained.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::world_event::SenderType;
    use parking_lot::Mutex;

    fn human(content: &str) -> WorldEvent {
        WorldEvent::message(content, "human", SenderType::Human)
    }

    #[test]
    fn test_handlers_invoked_in_registration_order() {
        let bus = WorldEventBus::new("w1");
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let log = log.clone();
            bus.subscribe(name, EventFilter::All, move |_| log.lock().push(name));
        }
        assert_eq!(bus.publish(&human("hi")), 3);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_filter_by_kind() {
        let bus = WorldEventBus::new("w1");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe("messages", EventFilter::only(EventKind::Message), move |e| {
            s.lock().push(e.kind())
        });
        bus.publish(&WorldEvent::system("noop", None));
        bus.publish(&human("hello"));
        assert_eq!(*seen.lock(), vec![EventKind::Message]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = WorldEventBus::new("w1");
        let id = bus.subscribe("h", EventFilter::All, |_| {});
        assert!(bus.unsubscribe(&id));
        assert!(!bus.unsubscribe(&id));
        assert_eq!(bus.handler_count(), 0);
        assert_eq!(bus.publish(&human("x")), 0);
    }

    #[test]
    fn test_destroy_detaches_and_blocks_delivery() {
        let bus = WorldEventBus::new("w1");
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let id = bus.subscribe("h", EventFilter::All, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.destroy(), 1);
        assert_eq!(bus.destroy(), 0);
        assert_eq!(bus.publish(&human("late")), 0);
        assert!(!bus.unsubscribe(&id));
        bus.subscribe("after", EventFilter::All, |_| panic!("must not run"));
        assert_eq!(bus.publish(&human("later")), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_nested_publish_from_handler() {
        let bus = Arc::new(WorldEventBus::new("w1"));
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        bus.subscribe("echo", EventFilter::only(EventKind::Message), move |e| {
            if e.as_message().map(|m| m.content.as_str()) == Some("ping") {
                inner_bus.publish(&WorldEvent::system("pong", None));
            }
        });
        let l = log.clone();
        bus.subscribe("recorder", EventFilter::All, move |e| l.lock().push(e.kind()));

        bus.publish(&human("ping"));
        // The nested system event is delivered before the recorder sees the
        // outer message, because the echo handler runs first.
        assert_eq!(*log.lock(), vec![EventKind::System, EventKind::Message]);
    }

    #[test]
    fn test_handler_unsubscribed_mid_dispatch_is_skipped() {
        let bus = Arc::new(WorldEventBus::new("w1"));
        let victim_ran = Arc::new(AtomicBool::new(false));
        let victim_slot: Arc<Mutex<Option<HandlerId>>> = Arc::new(Mutex::new(None));

        let b = bus.clone();
        let slot = victim_slot.clone();
        bus.subscribe("killer", EventFilter::All, move |_| {
            if let Some(id) = slot.lock().take() {
                b.unsubscribe(&id);
            }
        });
        let ran = victim_ran.clone();
        let victim = bus.subscribe("victim", EventFilter::All, move |_| {
            ran.store(true, Ordering::SeqCst);
        });
        *victim_slot.lock() = Some(victim);

        bus.publish(&human("x"));
        assert!(!victim_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_handler_does_not_stop_delivery() {
        let bus = WorldEventBus::new("w1");
        let reached = Arc::new(AtomicBool::new(false));
        bus.subscribe("bad", EventFilter::All, |_| panic!("boom"));
        let r = reached.clone();
        bus.subscribe("good", EventFilter::All, move |_| r.store(true, Ordering::SeqCst));
        assert_eq!(bus.publish(&human("x")), 2);
        assert!(reached.load(Ordering::SeqCst));
    }

    #[test]
    fn test_buses_are_isolated() {
        let a = WorldEventBus::new("a");
        let b = WorldEventBus::new("b");
        let b_hits = Arc::new(AtomicU64::new(0));
        let hits = b_hits.clone();
        b.subscribe("only-b", EventFilter::All, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        a.subscribe("only-a", EventFilter::All, |_| {});
        for _ in 0..10 {
            a.publish(&human("for a"));
        }
        assert_eq!(b_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_publishes_on_two_worlds() {
        let a = Arc::new(WorldEventBus::new("a"));
        let b = Arc::new(WorldEventBus::new("b"));
        let a_seen = Arc::new(Mutex::new(Vec::new()));
        let b_seen = Arc::new(Mutex::new(Vec::new()));
        let s = a_seen.clone();
        a.subscribe("a", EventFilter::All, move |e| {
            s.lock().push(e.as_message().map(|m| m.sender.clone()))
        });
        let s = b_seen.clone();
        b.subscribe("b", EventFilter::All, move |e| {
            s.lock().push(e.as_message().map(|m| m.sender.clone()))
        });

        let threads: Vec<_> = [(a.clone(), "from-a"), (b.clone(), "from-b")]
            .into_iter()
            .map(|(bus, sender)| {
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        bus.publish(&WorldEvent::message("x", sender, SenderType::Human));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let a_seen = a_seen.lock();
        let b_seen = b_seen.lock();
        assert_eq!(a_seen.len(), 200);
        assert_eq!(b_seen.len(), 200);
        assert!(a_seen.iter().all(|s| s.as_deref() == Some("from-a")));
        assert!(b_seen.iter().all(|s| s.as_deref() == Some("from-b")));
    }
}

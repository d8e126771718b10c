//! Scene events
//!
//! Structural notifications ("entity added", "component removed", ...) fired
//! by the scene on the update thread.
//! - Handlers register for one event kind
//! - A handler returns `true` to consume the event (stops forwarding)
//! - Events fired while a dispatch is in progress are queued and delivered
//!   after it, in order
//! - Handlers registered (or a clear requested) from inside a handler take
//!   effect once that handler's event has been delivered

use std::collections::{HashMap, VecDeque};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::component::ComponentId;
use super::entity::EntityId;

/// Event kind used for handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneEventKind {
    /// An entity was created
    EntityAdded,
    /// An entity was destroyed
    EntityDestroyed,
    /// A component was attached and initialized
    ComponentAdded,
    /// A component received `death` and was detached
    ComponentRemoved,
    /// An entity's parent changed
    Reparented,
}

/// Structural change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    /// An entity was created
    EntityAdded {
        /// New entity
        entity: EntityId,
    },
    /// An entity was destroyed
    EntityDestroyed {
        /// Destroyed entity
        entity: EntityId,
    },
    /// A component was attached and initialized
    ComponentAdded {
        /// Owning entity
        entity: EntityId,
        /// New component
        component: ComponentId,
        /// Component type tag
        tag: &'static str,
    },
    /// A component received `death` and was detached
    ComponentRemoved {
        /// Owning entity
        entity: EntityId,
        /// Removed component
        component: ComponentId,
        /// Component type tag
        tag: &'static str,
    },
    /// An entity's parent changed
    Reparented {
        /// Re-parented entity
        entity: EntityId,
        /// New parent, `None` when detached
        parent: Option<EntityId>,
    },
}

impl SceneEvent {
    /// Kind of this event
    pub fn kind(&self) -> SceneEventKind {
        match self {
            Self::EntityAdded { .. } => SceneEventKind::EntityAdded,
            Self::EntityDestroyed { .. } => SceneEventKind::EntityDestroyed,
            Self::ComponentAdded { .. } => SceneEventKind::ComponentAdded,
            Self::ComponentRemoved { .. } => SceneEventKind::ComponentRemoved,
            Self::Reparented { .. } => SceneEventKind::Reparented,
        }
    }
}

/// Receives scene events
///
/// Returns true if the event was consumed (stops forwarding).
pub trait SceneEventHandler: Send {
    /// Handle an event, return true if consumed
    fn on_event(&mut self, event: &SceneEvent) -> bool;
}

impl<F> SceneEventHandler for F
where
    F: FnMut(&SceneEvent) -> bool + Send,
{
    fn on_event(&mut self, event: &SceneEvent) -> bool {
        self(event)
    }
}

enum Deferred {
    Register(SceneEventKind, Box<dyn SceneEventHandler>),
    Clear,
}

/// Handler registry with re-entrant-safe dispatch
///
/// A handler may fire events, register handlers or clear the bus. Those calls
/// are deferred while the dispatch runs: registrations and clears take effect
/// before the next queued event is delivered.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<SceneEventKind, Vec<Box<dyn SceneEventHandler>>>>,
    dispatcher: Mutex<Option<ThreadId>>,
    queued: Mutex<VecDeque<SceneEvent>>,
    deferred: Mutex<Vec<Deferred>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the calling thread is inside a dispatch of this bus
    fn dispatching_here(&self) -> bool {
        *self.dispatcher.lock() == Some(thread::current().id())
    }

    /// Register a handler for one event kind
    pub fn register_handler(&self, kind: SceneEventKind, handler: Box<dyn SceneEventHandler>) {
        if self.dispatching_here() {
            self.deferred.lock().push(Deferred::Register(kind, handler));
            return;
        }
        self.handlers.lock().entry(kind).or_default().push(handler);
    }

    /// Deliver an event to the handlers registered for its kind
    ///
    /// Stops on the first handler that consumes it.
    pub fn dispatch(&self, event: SceneEvent) {
        if self.dispatching_here() {
            self.queued.lock().push_back(event);
            return;
        }

        let mut handlers = self.handlers.lock();
        *self.dispatcher.lock() = Some(thread::current().id());

        let mut next = Some(event);
        while let Some(event) = next {
            if let Some(registered) = handlers.get_mut(&event.kind()) {
                for handler in registered.iter_mut() {
                    if handler.on_event(&event) || self.clear_requested() {
                        break;
                    }
                }
            }
            for deferred in self.deferred.lock().drain(..) {
                match deferred {
                    Deferred::Register(kind, handler) => handlers.entry(kind).or_default().push(handler),
                    Deferred::Clear => handlers.clear(),
                }
            }
            next = self.queued.lock().pop_front();
        }

        *self.dispatcher.lock() = None;
    }

    fn clear_requested(&self) -> bool {
        self.deferred.lock().iter().any(|d| matches!(d, Deferred::Clear))
    }

    /// Drop every handler and every queued event
    pub fn clear(&self) {
        self.queued.lock().clear();
        if self.dispatching_here() {
            self.deferred.lock().push(Deferred::Clear);
            return;
        }
        self.handlers.lock().clear();
    }
}

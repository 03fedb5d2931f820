//! The listener registry and fan-out.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::RwLock;
use tracing::warn;

use cord_proto::{Event, EventKind};

type Listener = Box<dyn Fn(&Event) + Send + Sync>;

/// Delivers typed events to registered listeners.
///
/// Listeners for one event kind run in registration order, synchronously
/// on the dispatching task. Fan-out is best-effort: a panicking listener
/// is logged and the rest still run. Long-running listeners should hand
/// work to their own tasks.
#[derive(Default)]
pub struct EventDispatcher {
    by_kind: RwLock<HashMap<EventKind, Vec<Listener>>>,
    any: RwLock<Vec<Listener>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("kinds", &self.by_kind.read().len())
            .field("any", &self.any.read().len())
            .finish()
    }
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.by_kind
            .write()
            .entry(kind)
            .or_default()
            .push(Box::new(listener));
    }

    /// Register a listener for every event.
    pub fn on_any<F>(&self, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.any.write().push(Box::new(listener));
    }

    /// Number of listeners registered for a kind.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.by_kind.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an event to every matching listener.
    pub fn dispatch(&self, event: &Event) {
        let kind = event.kind();

        {
            let any = self.any.read();
            for listener in any.iter() {
                Self::invoke(listener, event, kind);
            }
        }

        let by_kind = self.by_kind.read();
        if let Some(listeners) = by_kind.get(&kind) {
            for listener in listeners {
                Self::invoke(listener, event, kind);
            }
        }
    }

    fn invoke(listener: &Listener, event: &Event, kind: EventKind) {
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            warn!(?kind, "listener panicked; continuing with remaining listeners");
        }
    }
}

//! In-process event bus
//!
//! ```text
//! BatchFlusher ──publish("audit", view)──▶ EventBus ──▶ handler₁ (RealtimeGateway)
//!                                                   └─▶ handler₂ ...
//! ```
//!
//! Delivery is synchronous, in registration order, to the handlers registered
//! at the time of the call. Nothing is persisted or retried; topics are
//! independent of each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Callback invoked with `(topic, payload)`
pub type BusHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<String, Vec<BusHandler>>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("EventBus")
            .field("topics", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `topic`
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(topic.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Deliver `payload` to every handler of `topic`.
    ///
    /// Returns the number of handlers invoked. Handlers run after the lock is
    /// released, so a handler may itself subscribe or publish.
    pub fn publish(&self, topic: &str, payload: &Value) -> usize {
        let handlers: Vec<BusHandler> = match self.handlers.read().get(topic) {
            Some(list) => list.clone(),
            None => return 0,
        };
        for handler in &handlers {
            handler(topic, payload);
        }
        handlers.len()
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers.read().get(topic).map_or(0, Vec::len)
    }
}

//! The event bus: ordered listener chains per event name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use orbit_core::{DEFAULT_PRIORITY, Priority};
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::EventError;
use crate::listener::{EventListener, Subscription};

#[derive(Clone)]
struct Registered {
    priority: Priority,
    listener: Arc<dyn EventListener>,
}

/// Named events with ordered listener chains.
///
/// Listeners of one event run one at a time, ascending by priority; equal
/// priorities keep registration order. Each listener transforms the payload
/// for the next, and the first failure ends the chain.
pub struct EventBus {
    listeners: RwLock<HashMap<String, Vec<Registered>>>,
    default_priority: Priority,
    frozen: AtomicBool,
}

impl EventBus {
    /// Create an empty bus using [`DEFAULT_PRIORITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_priority(DEFAULT_PRIORITY)
    }

    /// Create an empty bus with a custom default priority.
    #[must_use]
    pub fn with_default_priority(default_priority: Priority) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            default_priority,
            frozen: AtomicBool::new(false),
        }
    }

    /// Priority given to listeners registered without one.
    pub const fn default_priority(&self) -> Priority {
        self.default_priority
    }

    /// Add `listener` to `event`.
    ///
    /// # Errors
    ///
    /// [`EventError::InvalidName`] for a blank event name, [`EventError::Frozen`]
    /// after [`freeze`](Self::freeze).
    pub fn listener(
        &self,
        event: &str,
        listener: Arc<dyn EventListener>,
        priority: Option<Priority>,
    ) -> Result<(), EventError> {
        self.listener_many(std::slice::from_ref(&event), listener, priority)
    }

    /// Add one listener to several events.
    ///
    /// Nothing is registered when any name is invalid.
    ///
    /// # Errors
    ///
    /// See [`listener`](Self::listener).
    pub fn listener_many<S: AsRef<str>>(
        &self,
        events: &[S],
        listener: Arc<dyn EventListener>,
        priority: Option<Priority>,
    ) -> Result<(), EventError> {
        if self.is_frozen() {
            return Err(EventError::Frozen);
        }
        if let Some(bad) = events.iter().find(|e| e.as_ref().trim().is_empty()) {
            return Err(EventError::InvalidName(bad.as_ref().to_string()));
        }

        let priority = priority.unwrap_or(self.default_priority);
        let mut map = self.listeners.write();
        for event in events {
            let chain = map.entry(event.as_ref().to_string()).or_default();
            let at = chain
                .iter()
                .position(|r| r.priority > priority)
                .unwrap_or(chain.len());
            chain.insert(
                at,
                Registered {
                    priority,
                    listener: Arc::clone(&listener),
                },
            );
            tracing::debug!(
                event = event.as_ref(),
                listener = listener.name(),
                priority,
                "registered listener"
            );
        }
        Ok(())
    }

    /// Register a module subscription.
    ///
    /// # Errors
    ///
    /// See [`listener`](Self::listener).
    pub fn subscribe(&self, subscription: &Subscription) -> Result<(), EventError> {
        self.listener_many(
            subscription.events.as_slice(),
            Arc::clone(&subscription.listener),
            subscription.priority,
        )
    }

    /// Run the chain for `event` and return the final payload.
    ///
    /// Without listeners the payload comes back unchanged.
    ///
    /// # Errors
    ///
    /// [`EventError::Listener`] from the first failing listener.
    pub async fn fire(&self, event: &str, payload: Value) -> Result<Value, EventError> {
        // Snapshot so registrations never wait on a running chain.
        let chain: Vec<Registered> = self
            .listeners
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();

        tracing::trace!(event, listeners = chain.len(), "firing event");

        let mut payload = payload;
        for registered in &chain {
            let listener = &registered.listener;
            payload = listener.handle(event, payload).await.map_err(|failure| {
                tracing::warn!(
                    event,
                    listener = listener.name(),
                    error = %failure,
                    "listener failed"
                );
                EventError::listener(event, listener.name(), failure.0)
            })?;
        }
        Ok(payload)
    }

    /// Number of listeners on `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Events with at least one listener, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.listeners.read().keys().cloned().collect();
        events.sort_unstable();
        events
    }

    /// Refuse further registrations.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Whether [`freeze`](Self::freeze) was called.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.events())
            .field("default_priority", &self.default_priority)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

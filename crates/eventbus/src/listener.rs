use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use orbit_core::Priority;
use serde_json::Value;

use crate::error::ListenerResult;

/// Reacts to a fired event.
///
/// Each listener receives the payload returned by the one before it and
/// returns the payload for the next.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handle `event`.
    async fn handle(&self, event: &str, payload: Value) -> ListenerResult;
}

/// [`EventListener`] backed by an async closure.
pub struct FnListener<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventListener for FnListener<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = ListenerResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &str, payload: Value) -> ListenerResult {
        (self.f)(event.to_string(), payload).await
    }
}

/// Wrap an async closure as a named [`EventListener`].
pub fn listener_fn<F, Fut>(name: impl Into<String>, f: F) -> FnListener<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = ListenerResult> + Send + 'static,
{
    FnListener {
        name: name.into(),
        f,
    }
}

/// A listener together with the events it subscribes to, as modules
/// declare them.
#[derive(Clone)]
pub struct Subscription {
    /// Event names.
    pub events: Vec<String>,
    /// Explicit priority; the bus default when absent.
    pub priority: Option<Priority>,
    /// The body.
    pub listener: Arc<dyn EventListener>,
}

impl Subscription {
    /// Subscribe `listener` to one event at the default priority.
    pub fn new(event: impl Into<String>, listener: impl EventListener + 'static) -> Self {
        Self {
            events: vec![event.into()],
            priority: None,
            listener: Arc::new(listener),
        }
    }

    /// Subscribe `listener` to several events.
    pub fn many<I, S>(events: I, listener: impl EventListener + 'static) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            priority: None,
            listener: Arc::new(listener),
        }
    }

    /// Set an explicit priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("events", &self.events)
            .field("priority", &self.priority)
            .field("listener", &self.listener.name())
            .finish()
    }
}

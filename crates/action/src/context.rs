use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use orbit_core::Services;

use crate::connection::Connection;
use crate::definition::ActionDefinition;

/// Per-invocation context handed to an action body.
///
/// Carries the resolved definition (group mods already applied), the calling
/// connection and the shared [`Services`].
#[derive(Clone)]
pub struct ActionContext {
    action: Arc<ActionDefinition>,
    connection: Connection,
    services: Services,
    render: Arc<AtomicBool>,
}

impl ActionContext {
    /// Create a context.
    pub fn new(action: Arc<ActionDefinition>, connection: Connection, services: Services) -> Self {
        Self {
            action,
            connection,
            services,
            render: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The resolved action definition.
    pub fn action(&self) -> &ActionDefinition {
        &self.action
    }

    /// The calling connection.
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Shared services.
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Shortcut for `services().get::<T>()`.
    pub fn service<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services.get::<T>()
    }

    /// Tell the transport not to render a response for this call, e.g. when
    /// the action already streamed a file.
    pub fn skip_render(&self) {
        self.render.store(false, Ordering::Release);
    }

    /// Whether the transport should render the response.
    pub fn to_render(&self) -> bool {
        self.render.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("action", &self.action.name)
            .field("version", &self.action.version)
            .field("connection", &self.connection.id())
            .finish_non_exhaustive()
    }
}

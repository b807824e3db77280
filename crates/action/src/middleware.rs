//! Action middleware.
//!
//! Global middleware wraps every action; other middleware runs only for
//! actions that list it by name. Within each set lower priorities run
//! first, ties in registration (or listing) order.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use indexmap::IndexMap;
use orbit_core::{DEFAULT_PRIORITY, Params, Priority, sort_by_priority};
use parking_lot::RwLock;
use serde_json::Value;

use crate::context::ActionContext;
use crate::definition::ActionDefinition;
use crate::error::{ActionFailure, RegistryError};

/// Hooks run around an action body.
#[async_trait]
pub trait ActionMiddleware: Send + Sync {
    /// Unique name; actions reference middleware by it.
    fn name(&self) -> &str;

    /// Ordering key, lower first.
    fn priority(&self) -> Priority {
        DEFAULT_PRIORITY
    }

    /// Run for every action.
    fn global(&self) -> bool {
        false
    }

    /// Before validation. May rewrite params or reject the call.
    async fn pre_process(
        &self,
        _params: &mut Params,
        _ctx: &ActionContext,
    ) -> Result<(), ActionFailure> {
        Ok(())
    }

    /// After a successful body. May rewrite the response or reject it.
    async fn post_process(
        &self,
        _response: &mut Value,
        _ctx: &ActionContext,
    ) -> Result<(), ActionFailure> {
        Ok(())
    }
}

/// Registered middleware by name.
pub struct MiddlewareRegistry {
    entries: RwLock<IndexMap<String, Arc<dyn ActionMiddleware>>>,
    frozen: AtomicBool,
}

impl MiddlewareRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Register middleware. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&self, middleware: Arc<dyn ActionMiddleware>) -> Result<(), RegistryError> {
        if self.is_frozen() {
            return Err(RegistryError::Frozen {
                registry: "middleware",
            });
        }
        let name = middleware.name().to_string();
        if name.trim().is_empty() {
            return Err(RegistryError::invalid(name, "middleware name must not be blank"));
        }
        tracing::debug!(
            middleware = %name,
            priority = middleware.priority(),
            global = middleware.global(),
            "registered middleware"
        );
        self.entries.write().insert(name, middleware);
        Ok(())
    }

    /// Look up middleware by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionMiddleware>> {
        self.entries.read().get(name).cloned()
    }

    /// Middleware to run for `action`: global ones first, then the ones the
    /// action lists, each set sorted by priority.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownMiddleware`] when the action lists a name
    /// that is not registered.
    pub fn chain_for(
        &self,
        action: &ActionDefinition,
    ) -> Result<Vec<Arc<dyn ActionMiddleware>>, RegistryError> {
        let entries = self.entries.read();

        let mut global: Vec<Arc<dyn ActionMiddleware>> =
            entries.values().filter(|m| m.global()).cloned().collect();
        sort_by_priority(&mut global, |m| m.priority());

        let mut listed: Vec<Arc<dyn ActionMiddleware>> =
            Vec::with_capacity(action.middleware.len());
        for name in &action.middleware {
            let middleware = entries
                .get(name)
                .ok_or_else(|| RegistryError::UnknownMiddleware { name: name.clone() })?;
            let already = middleware.global() || listed.iter().any(|m| m.name() == name);
            if !already {
                listed.push(Arc::clone(middleware));
            }
        }
        sort_by_priority(&mut listed, |m| m.priority());

        global.extend(listed);
        Ok(global)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Number of registered middleware.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
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

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("names", &self.names())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

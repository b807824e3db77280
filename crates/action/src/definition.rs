//! Action definitions and the builder that validates them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use orbit_core::Params;
use orbit_log::Level;
use serde_json::{Map, Value};

use crate::context::ActionContext;
use crate::error::{ActionFailure, RegistryError};
use crate::input::{InputSpec, Inputs};

/// Body of an action.
///
/// Runs on its own task. If it outlives the processor's timeout the caller
/// is answered with a timeout error and the eventual result is dropped; the
/// body itself is not cancelled.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Execute with validated params.
    async fn run(&self, params: Params, ctx: ActionContext) -> Result<Value, ActionFailure>;
}

/// [`ActionHandler`] backed by an async closure.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(Params, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ActionFailure>> + Send + 'static,
{
    async fn run(&self, params: Params, ctx: ActionContext) -> Result<Value, ActionFailure> {
        (self.f)(params, ctx).await
    }
}

/// Wrap an async closure as an [`ActionHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Params, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ActionFailure>> + Send + 'static,
{
    FnHandler { f }
}

/// A named, versioned action.
///
/// Identity is `(name, version)`. Registered definitions are never mutated;
/// group mods produce a patched copy at resolution time.
#[derive(Clone)]
pub struct ActionDefinition {
    /// Action name.
    pub name: String,
    /// Version chosen by the registrant.
    pub version: u32,
    /// Human readable summary.
    pub description: String,
    /// Declared inputs.
    pub inputs: Inputs,
    /// Group this action declares itself a member of.
    pub group: Option<String>,
    /// Module that contributed the action; set by the engine.
    pub module: Option<String>,
    /// Middleware names, run in priority order.
    pub middleware: Vec<String>,
    /// Only callable from internal connections.
    pub private: bool,
    /// Later registrations of the same version are refused.
    pub protected: bool,
    /// Connection types that may not call this action.
    pub blocked_connection_types: Vec<String>,
    /// Level for success log lines, overriding the configured one.
    pub log_level: Option<Level>,
    /// Free-form metadata; unknown group patch keys land here.
    pub metadata: Map<String, Value>,
    handler: Arc<dyn ActionHandler>,
}

impl ActionDefinition {
    /// Start building an action called `name` (version 1).
    pub fn builder(name: impl Into<String>) -> ActionBuilder {
        ActionBuilder::new(name)
    }

    /// The body.
    pub fn handler(&self) -> Arc<dyn ActionHandler> {
        Arc::clone(&self.handler)
    }

    /// Copy with the owning module set.
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Whether `kind` connections are refused.
    pub fn blocks(&self, kind: &str) -> bool {
        self.blocked_connection_types.iter().any(|b| b == kind)
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("description", &self.description)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("group", &self.group)
            .field("module", &self.module)
            .field("middleware", &self.middleware)
            .field("private", &self.private)
            .field("protected", &self.protected)
            .field("blocked_connection_types", &self.blocked_connection_types)
            .field("log_level", &self.log_level)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ActionDefinition`].
pub struct ActionBuilder {
    name: String,
    version: u32,
    description: String,
    inputs: Inputs,
    group: Option<String>,
    middleware: Vec<String>,
    private: bool,
    protected: bool,
    blocked_connection_types: Vec<String>,
    log_level: Option<Level>,
    metadata: Map<String, Value>,
    handler: Option<Arc<dyn ActionHandler>>,
}

impl ActionBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            description: String::new(),
            inputs: Inputs::new(),
            group: None,
            middleware: Vec::new(),
            private: false,
            protected: false,
            blocked_connection_types: Vec::new(),
            log_level: None,
            metadata: Map::new(),
            handler: None,
        }
    }

    /// Set the version.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare an input.
    #[must_use]
    pub fn input(mut self, name: impl Into<String>, spec: InputSpec) -> Self {
        self.inputs.insert(name.into(), spec);
        self
    }

    /// Join a group.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Add middleware by name.
    #[must_use]
    pub fn middleware(mut self, name: impl Into<String>) -> Self {
        self.middleware.push(name.into());
        self
    }

    /// Restrict to internal connections.
    #[must_use]
    pub const fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Refuse later registrations of the same version.
    #[must_use]
    pub const fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    /// Refuse calls from `kind` connections.
    #[must_use]
    pub fn block_connection_type(mut self, kind: impl Into<String>) -> Self {
        self.blocked_connection_types.push(kind.into());
        self
    }

    /// Override the success log level.
    #[must_use]
    pub const fn log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the body.
    #[must_use]
    pub fn handler(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set the body from an async closure.
    #[must_use]
    pub fn run<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Params, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionFailure>> + Send + 'static,
    {
        self.handler(handler_fn(f))
    }

    /// Finish the definition.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidDefinition`] when the name is blank or no body
    /// was set.
    pub fn build(self) -> Result<ActionDefinition, RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::invalid(&self.name, "name must not be blank"));
        }
        let Some(handler) = self.handler else {
            return Err(RegistryError::invalid(&self.name, "no run function"));
        };
        Ok(ActionDefinition {
            name: self.name,
            version: self.version,
            description: self.description,
            inputs: self.inputs,
            group: self.group,
            module: None,
            middleware: self.middleware,
            private: self.private,
            protected: self.protected,
            blocked_connection_types: self.blocked_connection_types,
            log_level: self.log_level,
            metadata: self.metadata,
            handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use orbit_core::Services;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn builder_defaults() {
        let def = ActionDefinition::builder("status")
            .run(|_, _| async { Ok(json!("ok")) })
            .build()
            .unwrap();
        assert_eq!(def.version, 1);
        assert!(!def.private);
        assert!(!def.protected);
        assert!(def.module.is_none());
        assert!(def.inputs.is_empty());
    }

    #[test]
    fn build_requires_body_and_name() {
        let err = ActionDefinition::builder("status").build().unwrap_err();
        assert_eq!(err, RegistryError::invalid("status", "no run function"));

        let err = ActionDefinition::builder(" ")
            .run(|_, _| async { Ok(Value::Null) })
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDefinition { .. }));
    }

    #[test]
    fn blocks_listed_connection_types() {
        let def = ActionDefinition::builder("upload")
            .block_connection_type("websocket")
            .run(|_, _| async { Ok(Value::Null) })
            .build()
            .unwrap();
        assert!(def.blocks("websocket"));
        assert!(!def.blocks("web"));
    }

    #[tokio::test]
    async fn closure_handler_receives_params() {
        let def = ActionDefinition::builder("echo")
            .input("word", InputSpec::required())
            .run(|params, _ctx| async move { Ok(json!({ "echo": params["word"] })) })
            .build()
            .unwrap();
        let def = Arc::new(def);

        let mut params = Params::new();
        params.insert("word".into(), json!("hi"));
        let ctx = ActionContext::new(Arc::clone(&def), Connection::internal(), Services::new());

        let out = def.handler().run(params, ctx).await.unwrap();
        assert_eq!(out, json!({"echo": "hi"}));
    }
}

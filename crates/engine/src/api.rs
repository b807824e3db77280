//! The object satellites, actions and tasks share.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use orbit_action::{
    ActionComplete, ActionContext, ActionProcessor, ActionRegistry, Connection,
    MiddlewareRegistry, ProcessorOptions,
};
use orbit_config::{GeneralConfig, LoadedConfig, OrbitConfig};
use orbit_core::params::ACTION_PARAM;
use orbit_core::{Params, Services};
use orbit_eventbus::EventBus;
use orbit_task::{MemoryQueue, TaskContext, TaskManager, TaskRegistry};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::EngineError;
use crate::state::EngineState;

/// Who this engine is. Added by the utils bootstrap satellite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineIdentity {
    /// `general.id`, or `orbit-<pid>` when unset.
    pub id: String,
    /// Process id.
    pub pid: u32,
}

impl EngineIdentity {
    /// Identity for the current process.
    pub fn from_config(general: &GeneralConfig) -> Self {
        let pid = std::process::id();
        let id = general.id.clone().unwrap_or_else(|| format!("orbit-{pid}"));
        Self { id, pid }
    }
}

type Extension = (&'static str, Arc<dyn Any + Send + Sync>);

/// Typed objects satellites contribute to the [`Api`], one per type.
///
/// Open during bootstrap and Stage1, frozen afterwards.
#[derive(Default)]
pub struct Extensions {
    entries: RwLock<HashMap<TypeId, Extension>>,
    frozen: AtomicBool,
}

impl Extensions {
    /// Add `value`, replacing an earlier value of the same type.
    ///
    /// # Errors
    ///
    /// [`EngineError::ExtensionsFrozen`] after Stage1.
    pub fn insert<T: Any + Send + Sync>(&self, value: T) -> Result<(), EngineError> {
        if self.is_frozen() {
            return Err(EngineError::ExtensionsFrozen {
                extension: type_name::<T>(),
            });
        }
        self.entries
            .write()
            .insert(TypeId::of::<T>(), (type_name::<T>(), Arc::new(value)));
        Ok(())
    }

    /// The extension of type `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let entries = self.entries.read();
        let (_, value) = entries.get(&TypeId::of::<T>())?;
        Arc::clone(value).downcast::<T>().ok()
    }

    /// Whether an extension of type `T` is present.
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.entries.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of extensions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether there are none.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Refuse further inserts.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Whether [`freeze`](Self::freeze) was called.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.read().values().map(|(n, _)| *n).collect();
        names.sort_unstable();
        f.debug_struct("Extensions")
            .field("entries", &names)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// Shared engine state: configuration, registries, the processor and
/// extensions.
///
/// A fresh Api is built by every `initialize`; a restart keeps it.
pub struct Api {
    config: Arc<LoadedConfig>,
    state: Arc<Mutex<EngineState>>,
    boot_time: RwLock<Option<DateTime<Utc>>>,
    actions: Arc<ActionRegistry>,
    middleware: Arc<MiddlewareRegistry>,
    events: Arc<EventBus>,
    tasks: Arc<TaskManager>,
    processor: Arc<ActionProcessor>,
    extensions: Extensions,
}

impl Api {
    pub(crate) fn build(config: Arc<LoadedConfig>, state: Arc<Mutex<EngineState>>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let services = Services::new().with(Arc::new(ApiHandle(weak.clone())));
            let general = &config.config().general;

            let actions = Arc::new(ActionRegistry::new());
            let middleware = Arc::new(MiddlewareRegistry::new());
            let processor = ActionProcessor::new(
                Arc::clone(&actions),
                Arc::clone(&middleware),
                ProcessorOptions::from(general),
            )
            .with_services(services.clone());
            // Opened once the engine reaches Running.
            processor.set_accepting(false);

            let tasks = TaskManager::new(
                Arc::new(TaskRegistry::new()),
                Arc::new(MemoryQueue::new()),
            );
            tasks.set_services(services);

            Self {
                events: Arc::new(EventBus::with_default_priority(
                    general.default_listener_priority,
                )),
                config,
                state,
                boot_time: RwLock::new(None),
                actions,
                middleware,
                tasks: Arc::new(tasks),
                processor: Arc::new(processor),
                extensions: Extensions::default(),
            }
        })
    }

    /// The typed configuration.
    pub fn config(&self) -> &OrbitConfig {
        self.config.config()
    }

    /// The configuration with its sources, for module sections.
    pub fn loaded_config(&self) -> &LoadedConfig {
        &self.config
    }

    /// Current engine state.
    pub fn status(&self) -> EngineState {
        *self.state.lock()
    }

    /// When the engine last reached Running.
    pub fn boot_time(&self) -> Option<DateTime<Utc>> {
        *self.boot_time.read()
    }

    pub(crate) fn set_boot_time(&self, at: DateTime<Utc>) {
        *self.boot_time.write() = Some(at);
    }

    /// Registered actions.
    pub const fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    /// Registered middleware.
    pub const fn middleware(&self) -> &Arc<MiddlewareRegistry> {
        &self.middleware
    }

    /// Event listeners.
    pub const fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Tasks and their queue.
    pub const fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// The action processor transports hand connections to.
    pub const fn processor(&self) -> &Arc<ActionProcessor> {
        &self.processor
    }

    /// Satellite-contributed extensions.
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// The [`EngineIdentity`], once bootstrap has run.
    pub fn identity(&self) -> Option<Arc<EngineIdentity>> {
        self.extensions.get::<EngineIdentity>()
    }

    /// Run `action` on a fresh internal connection.
    pub async fn run_action(&self, action: &str, mut params: Params) -> ActionComplete {
        params.insert(ACTION_PARAM.to_string(), Value::from(action));
        self.processor
            .process(Connection::internal().with_params(params))
            .await
    }

    /// Fire `event` through the listener chain.
    pub async fn fire(
        &self,
        event: &str,
        payload: Value,
    ) -> Result<Value, orbit_eventbus::EventError> {
        self.events.fire(event, payload).await
    }

    pub(crate) fn freeze(&self) {
        self.actions.freeze();
        self.middleware.freeze();
        self.events.freeze();
        self.tasks.registry().freeze();
        self.extensions.freeze();
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("status", &self.status())
            .field("boot_time", &self.boot_time())
            .field("actions", &self.actions)
            .field("tasks", &self.tasks)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Service entry through which contexts reach the [`Api`].
///
/// Holds a weak reference: the Api owns the processor and task manager,
/// which own the services.
#[derive(Debug, Clone)]
pub struct ApiHandle(Weak<Api>);

impl ApiHandle {
    /// The Api, unless it was dropped.
    pub fn upgrade(&self) -> Option<Arc<Api>> {
        self.0.upgrade()
    }
}

/// Access to the [`Api`] from action and task contexts.
pub trait ApiExt {
    /// The Api that is running this call.
    fn api(&self) -> Option<Arc<Api>>;
}

impl ApiExt for ActionContext {
    fn api(&self) -> Option<Arc<Api>> {
        self.service::<ApiHandle>()?.upgrade()
    }
}

impl ApiExt for TaskContext {
    fn api(&self) -> Option<Arc<Api>> {
        self.service::<ApiHandle>()?.upgrade()
    }
}

//! Built-in satellites.
//!
//! `utils` and `config` are bootstrap satellites the engine runs during
//! `initialize`. `actions`, `events` and `tasks` load the content of the
//! enabled modules and run ahead of module satellites with equal priority.

use std::sync::Arc;

use async_trait::async_trait;
use orbit_action::RegistryError;
use orbit_config::ConfigWatcher;
use orbit_core::Priority;
use orbit_task::Scheduler;
use parking_lot::Mutex;

use crate::api::{Api, EngineIdentity};
use crate::error::SatelliteError;
use crate::module::Module;
use crate::satellite::{Priorities, Satellite};

/// Stage2 priority of the task scheduler, after application satellites.
pub const TASKS_START_PRIORITY: Priority = 900;

/// Adds the [`EngineIdentity`] extension.
#[derive(Debug, Default)]
pub struct UtilsSatellite;

#[async_trait]
impl Satellite for UtilsSatellite {
    fn name(&self) -> &str {
        "utils"
    }

    fn priorities(&self) -> Priorities {
        Priorities::none()
    }

    async fn load(&self, api: &Api) -> Result<(), SatelliteError> {
        let identity = EngineIdentity::from_config(&api.config().general);
        tracing::info!(id = %identity.id, pid = identity.pid, "engine identity");
        api.extensions()
            .insert(identity)
            .map_err(|e| SatelliteError::failed(e.to_string()))
    }
}

/// Watches the loaded config files in development mode.
///
/// Changes are reported, not applied; the watcher is released on stop.
#[derive(Debug, Default)]
pub struct ConfigSatellite {
    watcher: Mutex<Option<ConfigWatcher>>,
}

impl ConfigSatellite {
    /// Whether config files are being watched.
    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(ConfigWatcher::is_watching)
    }
}

#[async_trait]
impl Satellite for ConfigSatellite {
    fn name(&self) -> &str {
        "config"
    }

    fn priorities(&self) -> Priorities {
        Priorities::none()
    }

    async fn load(&self, api: &Api) -> Result<(), SatelliteError> {
        let loaded = api.loaded_config();
        tracing::debug!(files = ?loaded.files(), "configuration in use");
        if !api.config().general.development_mode || loaded.files().is_empty() {
            return Ok(());
        }

        let watcher = ConfigWatcher::new(|change| {
            tracing::warn!(
                path = %change.path.display(),
                kind = ?change.kind,
                "config file changed; restart to apply"
            );
        });
        watcher.start_watching(loaded.files())?;
        tracing::info!(files = loaded.files().len(), "watching config files");

        if let Some(previous) = self.watcher.lock().replace(watcher) {
            previous.stop_watching();
        }
        Ok(())
    }

    async fn stop(&self, _api: &Api) -> Result<(), SatelliteError> {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop_watching();
            tracing::debug!("config watcher released");
        }
        Ok(())
    }
}

/// Registers module middleware, groups and actions.
#[derive(Debug)]
pub struct ActionsSatellite {
    modules: Arc<[Module]>,
}

impl ActionsSatellite {
    /// Load the content of `modules`.
    pub fn new(modules: Arc<[Module]>) -> Self {
        Self { modules }
    }
}

#[async_trait]
impl Satellite for ActionsSatellite {
    fn name(&self) -> &str {
        "actions"
    }

    fn priorities(&self) -> Priorities {
        Priorities::load_only(orbit_core::DEFAULT_PRIORITY)
    }

    async fn load(&self, api: &Api) -> Result<(), SatelliteError> {
        for module in self.modules.iter() {
            for middleware in module.middleware_list() {
                api.middleware().register(Arc::clone(middleware))?;
            }
            for group in module.groups() {
                api.actions().register_group(group.clone())?;
            }
            for action in module.actions() {
                let action = action.clone().with_module(module.name());
                match api.actions().register(action) {
                    Ok(()) => {}
                    // The protected definition stays; boot goes on.
                    Err(RegistryError::DuplicateVersion { name, version }) => {
                        tracing::warn!(
                            module = module.name(),
                            action = %name,
                            version,
                            "skipped action that would override a protected one"
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tracing::info!(
            actions = api.actions().len(),
            middleware = api.middleware().len(),
            "actions loaded"
        );
        Ok(())
    }
}

/// Subscribes module listeners.
#[derive(Debug)]
pub struct EventsSatellite {
    modules: Arc<[Module]>,
}

impl EventsSatellite {
    /// Load the listeners of `modules`.
    pub fn new(modules: Arc<[Module]>) -> Self {
        Self { modules }
    }
}

#[async_trait]
impl Satellite for EventsSatellite {
    fn name(&self) -> &str {
        "events"
    }

    fn priorities(&self) -> Priorities {
        Priorities::load_only(orbit_core::DEFAULT_PRIORITY)
    }

    async fn load(&self, api: &Api) -> Result<(), SatelliteError> {
        for module in self.modules.iter() {
            for subscription in module.listeners() {
                api.events().subscribe(subscription)?;
            }
        }
        tracing::info!(events = api.events().events().len(), "listeners loaded");
        Ok(())
    }
}

/// Registers module tasks and runs the scheduler while the engine runs.
#[derive(Debug)]
pub struct TasksSatellite {
    modules: Arc<[Module]>,
    scheduler: Mutex<Option<Arc<Scheduler>>>,
}

impl TasksSatellite {
    /// Load the tasks of `modules`.
    pub fn new(modules: Arc<[Module]>) -> Self {
        Self {
            modules,
            scheduler: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Satellite for TasksSatellite {
    fn name(&self) -> &str {
        "tasks"
    }

    fn priorities(&self) -> Priorities {
        Priorities {
            start: Some(TASKS_START_PRIORITY),
            ..Priorities::default()
        }
    }

    async fn load(&self, api: &Api) -> Result<(), SatelliteError> {
        for module in self.modules.iter() {
            for task in module.tasks() {
                api.tasks().registry().register(task.clone())?;
            }
        }
        tracing::info!(tasks = api.tasks().registry().len(), "tasks loaded");
        Ok(())
    }

    async fn start(&self, api: &Api) -> Result<(), SatelliteError> {
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(api.tasks()),
            api.config().tasks.clone(),
        ));
        scheduler.start().await?;
        *self.scheduler.lock() = Some(scheduler);
        Ok(())
    }

    async fn stop(&self, _api: &Api) -> Result<(), SatelliteError> {
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
        Ok(())
    }
}

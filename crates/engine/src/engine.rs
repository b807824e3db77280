//! Engine lifecycle.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use orbit_config::{LoadedConfig, OrbitConfig};
use orbit_core::{Priority, sort_by_priority};
use parking_lot::{Mutex, RwLock};

use crate::api::Api;
use crate::error::EngineError;
use crate::module::Module;
use crate::satellite::Satellite;
use crate::satellites::{
    ActionsSatellite, ConfigSatellite, EventsSatellite, TasksSatellite, UtilsSatellite,
};
use crate::state::{EngineState, Phase};

/// Boots, runs, restarts and stops an application.
///
/// ```text
/// Stopped --initialize--> Stage0 --load--> Stage1 --start--> Running
///    ^                                                          |
///    +------------------------- Stopping <-------stop-----------+
/// ```
///
/// Lifecycle calls are serialized; satellites run one at a time.
pub struct Engine {
    config: Arc<LoadedConfig>,
    modules: Arc<[Module]>,
    state: Arc<Mutex<EngineState>>,
    api: RwLock<Option<Arc<Api>>>,
    satellites: RwLock<Vec<Arc<dyn Satellite>>>,
    /// Indices into `satellites` whose load or start finished since the
    /// last initialize.
    booted: Mutex<HashSet<usize>>,
    utils: UtilsSatellite,
    config_satellite: ConfigSatellite,
    lifecycle: tokio::sync::Mutex<()>,
    starts: AtomicU64,
}

impl Engine {
    /// An engine for `modules`. Modules missing from a non-empty
    /// `modules.enabled` are dropped here.
    pub fn new(config: LoadedConfig, modules: Vec<Module>) -> Self {
        let (enabled, skipped): (Vec<Module>, Vec<Module>) = modules
            .into_iter()
            .partition(|m| config.config().modules.is_enabled(m.name()));
        for module in &skipped {
            tracing::info!(module = module.name(), "module not enabled");
        }

        Self {
            config: Arc::new(config),
            modules: enabled.into(),
            state: Arc::new(Mutex::new(EngineState::Stopped)),
            api: RwLock::new(None),
            satellites: RwLock::new(Vec::new()),
            booted: Mutex::new(HashSet::new()),
            utils: UtilsSatellite,
            config_satellite: ConfigSatellite::default(),
            lifecycle: tokio::sync::Mutex::new(()),
            starts: AtomicU64::new(0),
        }
    }

    /// An engine over an in-code configuration.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] when `config` fails validation.
    pub fn from_config(config: OrbitConfig, modules: Vec<Module>) -> Result<Self, EngineError> {
        Ok(Self::new(LoadedConfig::from_config(config)?, modules))
    }

    /// Current state.
    pub fn status(&self) -> EngineState {
        *self.state.lock()
    }

    /// The current Api, once initialized.
    pub fn api(&self) -> Option<Arc<Api>> {
        self.api.read().clone()
    }

    /// How many times the engine reached Running.
    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::Acquire)
    }

    /// Names of the enabled modules, in boot order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(Module::name).collect()
    }

    /// Whether config files are being watched.
    pub fn is_watching_config(&self) -> bool {
        self.config_satellite.is_watching()
    }

    /// Run the bootstrap satellites and build a fresh [`Api`].
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] unless stopped, or a fatal bootstrap
    /// failure.
    pub async fn initialize(&self) -> Result<Arc<Api>, EngineError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.initialize_locked().await
    }

    /// Load and start every satellite, initializing first when stopped.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] when already running, or a fatal
    /// satellite failure.
    pub async fn start(&self) -> Result<Arc<Api>, EngineError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.status() == EngineState::Stopped {
            self.initialize_locked().await?;
        }
        let api = self.expect_state("start", EngineState::Stage0)?;

        let started = Instant::now();
        self.set_state(EngineState::Stage1);
        if let Err(e) = self.run_phase(&api, Phase::Load).await {
            return Err(self.fatal(e).await);
        }
        api.freeze();
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage1 complete"
        );

        self.stage2(&api).await?;
        Ok(api)
    }

    /// Stop the satellites and start them again on the same [`Api`].
    /// Load is not repeated.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] unless running, or a fatal satellite
    /// failure.
    pub async fn restart(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle.lock().await;
        let api = self.expect_state("restart", EngineState::Running)?;

        tracing::info!("restarting engine");
        if let Err(e) = self.shutdown(&api, false, StopScope::All).await {
            return Err(self.fatal(e).await);
        }
        self.set_state(EngineState::Stage1);
        self.stage2(&api).await
    }

    /// Stop a running engine.
    ///
    /// A call while another stop is in progress returns at once; a call on
    /// an engine that is not running only logs. The engine ends up
    /// Stopped even when a satellite fails to stop.
    ///
    /// # Errors
    ///
    /// The first satellite stop failure, as a fatal error.
    pub async fn stop(&self) -> Result<(), EngineError> {
        if self.status() == EngineState::Stopping {
            return Ok(());
        }
        let _lifecycle = self.lifecycle.lock().await;
        let state = self.status();
        if state != EngineState::Running {
            tracing::error!(%state, "cannot stop: engine is not running");
            return Ok(());
        }
        let Some(api) = self.api() else {
            return Ok(());
        };
        if let Err(e) = self.shutdown(&api, true, StopScope::All).await {
            return Err(self.fatal(e).await);
        }
        Ok(())
    }

    async fn initialize_locked(&self) -> Result<Arc<Api>, EngineError> {
        let state = self.status();
        if state != EngineState::Stopped {
            return Err(EngineError::InvalidState {
                operation: "initialize",
                state,
            });
        }

        self.booted.lock().clear();
        let api = Api::build(Arc::clone(&self.config), Arc::clone(&self.state));
        let bootstrap: [&dyn Satellite; 2] = [&self.utils, &self.config_satellite];
        for satellite in bootstrap {
            if let Err(e) = satellite.load(&api).await {
                let error = EngineError::satellite(Phase::Load, satellite.name(), e);
                return Err(self.fatal(error).await);
            }
        }

        *self.satellites.write() = self.discover();
        *self.api.write() = Some(Arc::clone(&api));
        self.set_state(EngineState::Stage0);
        tracing::info!(modules = ?self.module_names(), "engine initialized");
        Ok(api)
    }

    async fn stage2(&self, api: &Api) -> Result<(), EngineError> {
        if let Err(e) = self.run_phase(api, Phase::Start).await {
            return Err(self.fatal(e).await);
        }
        api.processor().set_accepting(true);
        api.set_boot_time(Utc::now());
        let starts = self.starts.fetch_add(1, Ordering::AcqRel) + 1;
        self.set_state(EngineState::Running);
        tracing::info!(starts, "engine running");
        Ok(())
    }

    /// Core satellites first, then module satellites in module order.
    fn discover(&self) -> Vec<Arc<dyn Satellite>> {
        let mut satellites: Vec<Arc<dyn Satellite>> = vec![
            Arc::new(ActionsSatellite::new(Arc::clone(&self.modules))),
            Arc::new(EventsSatellite::new(Arc::clone(&self.modules))),
            Arc::new(TasksSatellite::new(Arc::clone(&self.modules))),
        ];
        for module in self.modules.iter() {
            satellites.extend(module.satellites().iter().cloned());
        }
        satellites
    }

    /// Satellites taking part in `phase`, with their index, by priority.
    fn in_phase(&self, phase: Phase) -> Vec<(Priority, usize, Arc<dyn Satellite>)> {
        let mut satellites: Vec<_> = self
            .satellites
            .read()
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.priorities().get(phase).map(|p| (p, i, Arc::clone(s))))
            .collect();
        sort_by_priority(&mut satellites, |(priority, _, _)| *priority);
        satellites
    }

    /// Load or start every satellite of `phase`, stopping at the first
    /// failure.
    async fn run_phase(&self, api: &Api, phase: Phase) -> Result<(), EngineError> {
        for (priority, index, satellite) in self.in_phase(phase) {
            tracing::debug!(satellite = satellite.name(), %phase, priority, "running satellite");
            let result = match phase {
                Phase::Load => satellite.load(api).await,
                Phase::Start => satellite.start(api).await,
                Phase::Stop => satellite.stop(api).await,
            };
            result.map_err(|e| EngineError::satellite(phase, satellite.name(), e))?;
            self.booted.lock().insert(index);
        }
        Ok(())
    }

    /// Close the processor gate and stop the satellites in `scope`.
    ///
    /// Every satellite gets its stop call and the engine always ends
    /// Stopped; the first failure is returned.
    async fn shutdown(
        &self,
        api: &Api,
        release_config: bool,
        scope: StopScope,
    ) -> Result<(), EngineError> {
        self.set_state(EngineState::Stopping);
        api.processor().set_accepting(false);

        // A restart keeps the loaded satellites booted.
        let booted = if release_config {
            std::mem::take(&mut *self.booted.lock())
        } else {
            self.booted.lock().clone()
        };
        let mut first_error = None;
        for (_, index, satellite) in self.in_phase(Phase::Stop) {
            if scope == StopScope::Booted && !booted.contains(&index) {
                continue;
            }
            if let Err(e) = satellite.stop(api).await {
                tracing::error!(satellite = satellite.name(), error = %e, "satellite failed to stop");
                first_error.get_or_insert(EngineError::satellite(Phase::Stop, satellite.name(), e));
            }
        }
        if release_config {
            if let Err(e) = self.config_satellite.stop(api).await {
                tracing::error!(error = %e, "config watcher failed to stop");
                first_error.get_or_insert(EngineError::satellite(
                    Phase::Stop,
                    self.config_satellite.name(),
                    e,
                ));
            }
        }

        self.set_state(EngineState::Stopped);
        tracing::info!("engine stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Log a fatal error and stop the satellites that already loaded or
    /// started. Outside test mode the process exits with status 1.
    async fn fatal(&self, error: EngineError) -> EngineError {
        let state = self.status();
        tracing::error!(error = %error, %state, "fatal engine error");

        if let Some(api) = self.api() {
            let cleanup = if state == EngineState::Stopped {
                self.config_satellite
                    .stop(&api)
                    .await
                    .map_err(|e| {
                        EngineError::satellite(Phase::Stop, self.config_satellite.name(), e)
                    })
            } else {
                self.shutdown(&api, true, StopScope::Booted).await
            };
            if let Err(e) = cleanup {
                tracing::error!(error = %e, "cleanup after fatal error failed");
            }
        }
        self.set_state(EngineState::Stopped);

        if self.config.config().general.test_mode {
            return error;
        }
        std::process::exit(1);
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: EngineState,
    ) -> Result<Arc<Api>, EngineError> {
        let state = self.status();
        match self.api() {
            Some(api) if state == expected => Ok(api),
            _ => Err(EngineError::InvalidState { operation, state }),
        }
    }

    fn set_state(&self, state: EngineState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "engine state");
        }
    }
}

/// Which satellites a shutdown stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopScope {
    /// Every satellite with a stop priority.
    All,
    /// Only satellites whose load or start finished.
    Booted,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.status())
            .field("modules", &self.module_names())
            .field("starts", &self.start_count())
            .finish_non_exhaustive()
    }
}

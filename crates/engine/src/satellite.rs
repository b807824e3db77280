//! Satellites: units that take part in the engine lifecycle.

use std::fmt;

use async_trait::async_trait;
use orbit_core::{DEFAULT_PRIORITY, Priority};

use crate::api::Api;
use crate::error::SatelliteError;
use crate::state::Phase;

/// Where a satellite sits in each phase. `None` skips the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priorities {
    /// Stage1 order.
    pub load: Option<Priority>,
    /// Stage2 order.
    pub start: Option<Priority>,
    /// Shutdown order.
    pub stop: Option<Priority>,
}

impl Priorities {
    /// Every phase at `priority`.
    pub const fn all(priority: Priority) -> Self {
        Self {
            load: Some(priority),
            start: Some(priority),
            stop: Some(priority),
        }
    }

    /// No phase at all.
    pub const fn none() -> Self {
        Self {
            load: None,
            start: None,
            stop: None,
        }
    }

    /// Only Stage1.
    pub const fn load_only(priority: Priority) -> Self {
        Self {
            load: Some(priority),
            ..Self::none()
        }
    }

    /// Priority for `phase`.
    pub const fn get(&self, phase: Phase) -> Option<Priority> {
        match phase {
            Phase::Load => self.load,
            Phase::Start => self.start,
            Phase::Stop => self.stop,
        }
    }
}

impl Default for Priorities {
    fn default() -> Self {
        Self::all(DEFAULT_PRIORITY)
    }
}

/// A unit of boot work.
///
/// Satellites run one at a time within a phase, lowest priority first; ties
/// keep discovery order (core satellites, then modules in order). `load`
/// registers content and runs before the registries freeze; `start` opens
/// resources; `stop` releases them.
#[async_trait]
pub trait Satellite: Send + Sync + fmt::Debug {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Phase priorities.
    fn priorities(&self) -> Priorities {
        Priorities::default()
    }

    /// Stage1.
    async fn load(&self, _api: &Api) -> Result<(), SatelliteError> {
        Ok(())
    }

    /// Stage2.
    async fn start(&self, _api: &Api) -> Result<(), SatelliteError> {
        Ok(())
    }

    /// Shutdown.
    async fn stop(&self, _api: &Api) -> Result<(), SatelliteError> {
        Ok(())
    }
}

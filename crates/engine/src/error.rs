//! Engine error types.

use orbit_action::RegistryError;
use orbit_config::ConfigError;
use orbit_eventbus::EventError;
use orbit_task::TaskError;

use crate::state::{EngineState, Phase};

/// Failure reported by a satellite phase.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SatelliteError {
    /// An action, group or middleware could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A listener could not be registered.
    #[error(transparent)]
    Event(#[from] EventError),

    /// A task could not be registered or the scheduler failed.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Configuration could not be read or watched.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Anything else.
    #[error("{0}")]
    Failed(String),
}

impl SatelliteError {
    /// Create a free-form failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors from the engine layer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The operation is not allowed in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// State at the time.
        state: EngineState,
    },

    /// A satellite failed a lifecycle phase.
    #[error("satellite `{satellite}` failed to {phase}: {source}")]
    Satellite {
        /// Phase that failed.
        phase: Phase,
        /// Satellite name.
        satellite: String,
        /// What went wrong.
        #[source]
        source: SatelliteError,
    },

    /// An extension was added after Stage1.
    #[error("api extensions are frozen; cannot add `{extension}`")]
    ExtensionsFrozen {
        /// Type name of the rejected extension.
        extension: &'static str,
    },

    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub(crate) fn satellite(phase: Phase, satellite: &str, source: SatelliteError) -> Self {
        Self::Satellite {
            phase,
            satellite: satellite.to_string(),
            source,
        }
    }
}

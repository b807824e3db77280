//! # Orbit Engine
//!
//! Boots an application out of [`Module`]s and drives it through its
//! lifecycle:
//!
//! - **initialize** runs the bootstrap satellites and builds the [`Api`]
//! - **Stage1** loads every [`Satellite`] by load priority, then freezes the
//!   registries
//! - **Stage2** starts them by start priority and opens the action processor
//! - **stop** closes the processor and stops them by stop priority
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orbit_action::ActionDefinition;
//! use orbit_config::OrbitConfig;
//! use orbit_engine::{Engine, Module};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let hello = Module::new("hello").action(
//!     ActionDefinition::builder("ping")
//!         .run(|_, _| async { Ok(json!("pong")) })
//!         .build()?,
//! );
//!
//! let engine = Engine::from_config(OrbitConfig::default(), vec![hello])?;
//! let api = engine.start().await?;
//!
//! let complete = api.run_action("ping", Default::default()).await;
//! assert_eq!(complete.response.value(), Some(&json!("pong")));
//!
//! engine.stop().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod api;
mod engine;
mod error;
mod module;
mod satellite;
mod satellites;
mod state;

pub use api::{Api, ApiExt, ApiHandle, EngineIdentity, Extensions};
pub use engine::Engine;
pub use error::{EngineError, SatelliteError};
pub use module::Module;
pub use satellite::{Priorities, Satellite};
pub use satellites::{
    ActionsSatellite, ConfigSatellite, EventsSatellite, TASKS_START_PRIORITY, TasksSatellite,
    UtilsSatellite,
};
pub use state::{EngineState, Phase};

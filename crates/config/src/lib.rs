//! Orbit Config - layered configuration for Orbit servers
//!
//! [`ConfigLoader`] merges defaults, TOML files and `ORBIT_*` environment
//! variables into an [`OrbitConfig`]; [`ConfigWatcher`] reports edits to the
//! loaded files.
//!
//! # Example
//!
//! ```rust,no_run
//! use orbit_config::{ConfigLoader, ConfigResult};
//!
//! fn main() -> ConfigResult<()> {
//!     let loaded = ConfigLoader::new().with_file("orbit.toml").load()?;
//!     let timeout = loaded.config().general.action_timeout();
//!     println!("actions time out after {timeout:?}");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(missing_docs)]

mod error;
mod loader;
mod settings;
mod watcher;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX, LoadedConfig};
pub use settings::{
    ALL_QUEUES, GeneralConfig, MissingParamCheck, ModulesConfig, OrbitConfig, TaskConfig,
};
pub use watcher::{ChangeKind, ConfigChange, ConfigWatcher};

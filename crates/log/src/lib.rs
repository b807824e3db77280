//! # Orbit Log
//!
//! Logging bootstrap for Orbit services, built on `tracing-subscriber`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! fn main() -> Result<(), orbit_log::LogError> {
//!     let _guard = orbit_log::auto_init()?;
//!     tracing::info!(port = 8080, "server starting");
//!     Ok(())
//! }
//! ```
//!
//! Initialization never replaces a subscriber that is already installed, so
//! calling [`init_with`] from several tests or from a host application that
//! set up its own subscriber is harmless.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;
mod error;
mod macros;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format, Level};
pub use error::{LogError, LogResult};

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "ORBIT_LOG";

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "ORBIT_LOG_FORMAT";

/// Pick a configuration from the environment and build type.
///
/// `ORBIT_LOG` or `RUST_LOG` set → [`Config::from_env`]; otherwise debug
/// builds use [`Config::development`] and release builds
/// [`Config::production`].
pub fn auto_init() -> LogResult<LoggerGuard> {
    if std::env::var(LOG_ENV).is_ok() || std::env::var("RUST_LOG").is_ok() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with the default configuration.
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with a custom configuration.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

//! Layered configuration loader
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. serialized [`OrbitConfig::default`]
//! 2. each TOML file, in the order added
//! 3. environment variables with the `ORBIT_` prefix, `__` separating
//!    nested keys (`ORBIT_GENERAL__ACTION_TIMEOUT_MS=5000`)

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::de::DeserializeOwned;

use crate::error::{ConfigError, ConfigResult};
use crate::settings::OrbitConfig;

/// Default environment prefix.
pub const ENV_PREFIX: &str = "ORBIT_";

/// Builder for a [`LoadedConfig`].
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    files: Vec<PathBuf>,
    env_prefix: Option<String>,
}

/// The typed configuration plus the merged sources it came from.
///
/// Modules read their own sections through [`LoadedConfig::section`].
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    config: OrbitConfig,
    figment: Figment,
    files: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader with no files and the default env prefix.
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            env_prefix: Some(ENV_PREFIX.to_string()),
        }
    }

    /// Add a TOML file. The file must exist when [`load`](Self::load) runs.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Use a different environment prefix.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Ignore the environment entirely.
    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// The merged provider chain, before extraction.
    pub fn figment(&self) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(OrbitConfig::default()));
        for file in &self.files {
            figment = figment.merge(Toml::file(file));
        }
        if let Some(prefix) = &self.env_prefix {
            figment = figment.merge(Env::prefixed(prefix).split("__"));
        }
        figment
    }

    /// Merge every source, extract and validate.
    pub fn load(self) -> ConfigResult<LoadedConfig> {
        if let Some(missing) = self.files.iter().find(|f| !f.exists()) {
            return Err(ConfigError::FileNotFound {
                path: missing.clone(),
            });
        }

        let figment = self.figment();
        let config: OrbitConfig = figment.extract()?;
        config.validate()?;

        tracing::debug!(files = self.files.len(), "configuration loaded");

        Ok(LoadedConfig {
            config,
            figment,
            files: self.files,
        })
    }
}

impl LoadedConfig {
    /// Validate and wrap an already built configuration (no files, no env).
    pub fn from_config(config: OrbitConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            figment: Figment::from(Serialized::defaults(&config)),
            config,
            files: Vec::new(),
        })
    }

    /// The typed configuration.
    pub const fn config(&self) -> &OrbitConfig {
        &self.config
    }

    /// Files the configuration was read from, in merge order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Whether `path` was one of the loaded files.
    pub fn was_loaded_from(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f == path)
    }

    /// Extract a module's own section, e.g. `[billing]`.
    ///
    /// Returns `Ok(None)` when no source defines the key.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<Option<T>> {
        if self.figment.find_value(key).is_err() {
            return Ok(None);
        }
        self.figment.extract_inner(key).map(Some).map_err(ConfigError::from)
    }
}

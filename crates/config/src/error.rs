//! Configuration error types

use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration error type
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist
    #[error("Configuration file not found: {}", path.display())]
    FileNotFound {
        /// Path to the configuration file
        path: PathBuf,
    },

    /// Merged sources could not be deserialized into the target type
    #[error("Failed to extract configuration: {message}")]
    Extract {
        /// Message from the layered loader, including the offending key
        message: String,
    },

    /// A loaded value is out of range
    #[error("Configuration validation failed for '{field}': {message}")]
    Validation {
        /// Dotted path of the field
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// The file watcher could not be started
    #[error("Configuration watch error: {message}")]
    Watch {
        /// Error message describing the watch failure
        message: String,
    },
}

impl ConfigError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a watch error
    pub fn watch_error(message: impl Into<String>) -> Self {
        Self::Watch {
            message: message.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Extract {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_messages() {
        assert_eq!(
            ConfigError::FileNotFound {
                path: PathBuf::from("orbit.toml")
            }
            .to_string(),
            "Configuration file not found: orbit.toml"
        );
        assert_eq!(
            ConfigError::validation("general.action_timeout_ms", "must be greater than zero")
                .to_string(),
            "Configuration validation failed for 'general.action_timeout_ms': must be greater than zero"
        );
        assert_eq!(
            ConfigError::watch_error("Already watching").to_string(),
            "Configuration watch error: Already watching"
        );
    }
}

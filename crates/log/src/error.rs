//! Logger error types

use thiserror::Error;

/// Result type for logger operations
pub type LogResult<T> = Result<T, LogError>;

/// Error type for logger operations
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("Invalid filter '{filter}': {message}")]
    InvalidFilter {
        /// Directive as supplied
        filter: String,
        /// Parser message
        message: String,
    },

    /// Unrecognized output format name
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),

    /// Installing the global subscriber failed
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

impl LogError {
    /// Create an invalid filter error
    pub fn invalid_filter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            filter: filter.into(),
            message: message.into(),
        }
    }

    /// Create an unknown format error
    pub fn unknown_format(format: impl Into<String>) -> Self {
        Self::UnknownFormat(format.into())
    }
}

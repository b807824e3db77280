use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Field name → message for every input that failed validation.
pub type FieldErrors = BTreeMap<String, String>;

/// Errors raised while registering or resolving actions, groups and
/// middleware.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// No version of the action is registered.
    #[error("unknown action `{name}`")]
    UnknownAction {
        /// Requested action name.
        name: String,
    },

    /// The action exists but not at the requested version.
    #[error("unknown version {version} of action `{name}`")]
    UnknownVersion {
        /// Requested action name.
        name: String,
        /// Requested version.
        version: u32,
    },

    /// A protected action already occupies this name and version.
    #[error("action `{name}` version {version} is protected and cannot be overridden")]
    DuplicateVersion {
        /// Action name.
        name: String,
        /// Version that is already taken.
        version: u32,
    },

    /// An action lists middleware that was never registered.
    #[error("unknown middleware `{name}`")]
    UnknownMiddleware {
        /// Middleware name.
        name: String,
    },

    /// A definition or group is incomplete.
    #[error("invalid definition `{name}`: {reason}")]
    InvalidDefinition {
        /// Name of the action or group.
        name: String,
        /// What is missing or wrong.
        reason: String,
    },

    /// Registration attempted after boot finished loading.
    #[error("{registry} registry is frozen; register during the load stage")]
    Frozen {
        /// Which registry refused the write.
        registry: &'static str,
    },
}

impl RegistryError {
    /// Create an invalid definition error.
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Failure returned by an action body or middleware.
///
/// The payload reaches the caller unchanged under `error`: a string for
/// error types (their message), or any JSON value an action chose to fail
/// with.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", Render(.payload))]
pub struct ActionFailure {
    payload: Value,
}

struct Render<'a>(&'a Value);

impl fmt::Display for Render<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl ActionFailure {
    /// Fail with a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            payload: Value::String(message.into()),
        }
    }

    /// Fail with an arbitrary JSON payload.
    pub const fn payload(payload: Value) -> Self {
        Self { payload }
    }

    /// Fail with the display message of any error.
    pub fn from_error<E: fmt::Display + ?Sized>(error: &E) -> Self {
        Self::message(error.to_string())
    }

    /// Borrow the payload.
    pub const fn as_value(&self) -> &Value {
        &self.payload
    }

    /// Take the payload.
    pub fn into_value(self) -> Value {
        self.payload
    }
}

impl From<String> for ActionFailure {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

impl From<&str> for ActionFailure {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<Value> for ActionFailure {
    fn from(payload: Value) -> Self {
        Self::payload(payload)
    }
}

impl From<anyhow::Error> for ActionFailure {
    fn from(error: anyhow::Error) -> Self {
        Self::message(error.to_string())
    }
}

impl From<RegistryError> for ActionFailure {
    fn from(error: RegistryError) -> Self {
        Self::from_error(&error)
    }
}

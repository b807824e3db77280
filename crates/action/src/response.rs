//! Response envelope returned to transports.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::connection::Connection;
use crate::error::FieldErrors;

/// Fixed error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Unknown action or version, private action or blocked connection type.
    UnknownAction,
    /// The server is shutting down and accepts no new work.
    ServerShuttingDown,
    /// The connection already has too many actions in flight.
    TooManyPendingActions,
    /// The action did not finish within the timeout.
    Timeout,
}

impl ErrorCode {
    /// Wire form of the code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownAction => "004",
            Self::ServerShuttingDown => "020",
            Self::TooManyPendingActions => "021",
            Self::Timeout => "022",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error half of the envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseError {
    /// Framework error with a fixed code.
    Coded {
        /// Wire code, e.g. `"004"`
        code: String,
        /// Human readable message
        message: String,
    },
    /// Validation failures by field.
    Fields(FieldErrors),
    /// Whatever the action or middleware failed with.
    Thrown(Value),
}

impl ResponseError {
    /// A coded error.
    pub fn coded(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Coded {
            code: code.as_str().to_string(),
            message: message.into(),
        }
    }

    /// The fixed code, for coded errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Coded { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// What the caller receives: exactly one of `response` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ResponseError>,
}

impl ActionResponse {
    /// Successful response.
    pub const fn success(value: Value) -> Self {
        Self {
            response: Some(value),
            error: None,
        }
    }

    /// Failed response.
    pub const fn failure(error: ResponseError) -> Self {
        Self {
            response: None,
            error: Some(error),
        }
    }

    /// Whether the call succeeded.
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Successful value.
    pub const fn value(&self) -> Option<&Value> {
        self.response.as_ref()
    }

    /// Error, if any.
    pub const fn error(&self) -> Option<&ResponseError> {
        self.error.as_ref()
    }

    /// Shortcut for the fixed error code.
    pub fn code(&self) -> Option<&str> {
        self.error.as_ref().and_then(ResponseError::code)
    }

    /// Envelope as JSON.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Result of processing one call, handed back to the transport.
#[derive(Debug, Clone)]
pub struct ActionComplete {
    /// The connection, with the params the action actually received.
    pub connection: Connection,
    /// Envelope to serialize.
    pub response: ActionResponse,
    /// Whether the transport should render the envelope.
    pub to_render: bool,
    /// Connection message count after this call.
    pub message_count: u64,
    /// Resolved action name, when resolution succeeded.
    pub action: Option<String>,
    /// Time spent in the processor.
    pub duration: Duration,
}

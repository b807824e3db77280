/// Errors raised by the event bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum EventError {
    /// A listener failed; the rest of the chain did not run.
    #[error("listener `{listener}` failed on `{event}`: {message}")]
    Listener {
        /// Event being fired.
        event: String,
        /// Name of the failing listener.
        listener: String,
        /// What went wrong.
        message: String,
    },

    /// Event names must not be blank.
    #[error("invalid event name `{0}`")]
    InvalidName(String),

    /// Registration attempted after boot finished loading.
    #[error("event registry is frozen; register listeners during the load stage")]
    Frozen,
}

impl EventError {
    /// Create a listener failure.
    pub fn listener(
        event: impl Into<String>,
        listener: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Listener {
            event: event.into(),
            listener: listener.into(),
            message: message.into(),
        }
    }
}

/// Result type for listener bodies.
pub type ListenerResult = Result<serde_json::Value, ListenerFailure>;

/// Failure returned by a listener body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ListenerFailure(pub String);

impl From<String> for ListenerFailure {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ListenerFailure {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display() {
        assert_eq!(
            EventError::listener("user:created", "audit", "disk full").to_string(),
            "listener `audit` failed on `user:created`: disk full"
        );
        assert_eq!(
            EventError::InvalidName(" ".into()).to_string(),
            "invalid event name ` `"
        );
        assert_eq!(ListenerFailure::from("nope").to_string(), "nope");
    }
}

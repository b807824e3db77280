/// Errors raised by task registration, enqueueing and execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TaskError {
    /// No task with this name is registered.
    #[error("unknown task `{name}`")]
    UnknownTask {
        /// Requested task name.
        name: String,
    },

    /// A definition is incomplete.
    #[error("invalid task `{name}`: {reason}")]
    InvalidDefinition {
        /// Task name.
        name: String,
        /// What is missing or wrong.
        reason: String,
    },

    /// Registration attempted after boot finished loading.
    #[error("task registry is frozen; register tasks during the load stage")]
    Frozen,

    /// The task body failed.
    #[error("task `{task}` failed: {message}")]
    Failed {
        /// Task name.
        task: String,
        /// Failure message.
        message: String,
    },

    /// The queue backend failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl TaskError {
    /// Create an invalid definition error.
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown task error.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownTask { name: name.into() }
    }
}

/// Errors raised by a [`TaskQueue`](crate::TaskQueue) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum QueueError {
    /// The backend could not be reached or refused the operation.
    #[error("queue backend error: {0}")]
    Backend(String),

    /// A stored job could not be decoded.
    #[error("corrupt job in queue `{queue}`: {message}")]
    Corrupt {
        /// Queue holding the job.
        queue: String,
        /// Decoder message.
        message: String,
    },
}

/// Failure returned by a task body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TaskFailure(pub String);

impl From<String> for TaskFailure {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for TaskFailure {
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
        assert_eq!(TaskError::unknown("sweep").to_string(), "unknown task `sweep`");
        assert_eq!(
            TaskError::invalid("sweep", "no run function").to_string(),
            "invalid task `sweep`: no run function"
        );
        assert_eq!(
            TaskError::from(QueueError::Backend("connection refused".into())).to_string(),
            "queue backend error: connection refused"
        );
        assert_eq!(TaskFailure::from("disk full").to_string(), "disk full");
    }
}

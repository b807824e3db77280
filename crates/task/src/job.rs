use chrono::{DateTime, Utc};
use orbit_core::{JobId, Params};
use serde::{Deserialize, Serialize};

/// One queued run of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique id.
    pub id: JobId,
    /// Task name.
    pub task: String,
    /// Queue the job waits in.
    pub queue: String,
    /// Params passed to the task body.
    pub params: Params,
    /// When the job was created.
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the job may run; `None` runs as soon as a worker is free.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A job for `task` in `queue`, due now.
    pub fn new(task: impl Into<String>, queue: impl Into<String>, params: Params) -> Self {
        Self {
            id: JobId::v4(),
            task: task.into(),
            queue: queue.into(),
            params,
            enqueued_at: Utc::now(),
            run_at: None,
        }
    }

    /// Delay the job until `run_at`.
    #[must_use]
    pub const fn at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    /// Whether the job may run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_at.is_none_or(|at| at <= now)
    }
}

//! Task manager that queues jobs and runs them.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use orbit_core::{JobId, Params, Services};
use parking_lot::RwLock;
use serde_json::Value;

use crate::definition::{TaskContext, TaskDefinition};
use crate::error::TaskError;
use crate::job::Job;
use crate::queue::TaskQueue;
use crate::registry::TaskRegistry;

/// Enqueues, removes and runs tasks against a [`TaskQueue`].
pub struct TaskManager {
    registry: Arc<TaskRegistry>,
    queue: Arc<dyn TaskQueue>,
    services: RwLock<Services>,
}

impl TaskManager {
    /// Create a manager.
    pub fn new(registry: Arc<TaskRegistry>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            registry,
            queue,
            services: RwLock::new(Services::new()),
        }
    }

    /// Services handed to every [`TaskContext`].
    pub fn set_services(&self, services: Services) {
        *self.services.write() = services;
    }

    /// The task registry.
    pub const fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// The queue backend.
    pub const fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Queue `name` to run as soon as a worker is free.
    ///
    /// # Errors
    ///
    /// [`TaskError::UnknownTask`] or a queue error.
    pub async fn enqueue(&self, name: &str, params: Params) -> Result<JobId, TaskError> {
        let task = self.registry.get(name)?;
        let job = Job::new(&task.name, &task.queue, params);
        let id = job.id;
        self.queue.enqueue(job).await?;
        tracing::debug!(task = name, job = %id, queue = %task.queue, "enqueued task");
        Ok(id)
    }

    /// Queue `name` to run at `at`.
    ///
    /// # Errors
    ///
    /// [`TaskError::UnknownTask`] or a queue error.
    pub async fn enqueue_at(
        &self,
        name: &str,
        params: Params,
        at: DateTime<Utc>,
    ) -> Result<JobId, TaskError> {
        let task = self.registry.get(name)?;
        let job = Job::new(&task.name, &task.queue, params);
        let id = job.id;
        self.queue.enqueue_at(job, at).await?;
        tracing::debug!(task = name, job = %id, run_at = %at, "scheduled task");
        Ok(id)
    }

    /// Queue `name` to run after `delay`.
    ///
    /// # Errors
    ///
    /// [`TaskError::UnknownTask`] or a queue error.
    pub async fn enqueue_in(
        &self,
        name: &str,
        params: Params,
        delay: Duration,
    ) -> Result<JobId, TaskError> {
        let delay = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
        let at = Utc::now()
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.enqueue_at(name, params, at).await
    }

    /// Drop every queued and delayed job of `name`. Returns how many.
    ///
    /// # Errors
    ///
    /// A queue error.
    pub async fn del(&self, name: &str) -> Result<usize, TaskError> {
        let removed = self.queue.remove_task(name).await?;
        tracing::debug!(task = name, removed, "removed queued jobs");
        Ok(removed)
    }

    /// Run `name` now on the calling task, bypassing the queue.
    ///
    /// # Errors
    ///
    /// [`TaskError::UnknownTask`] or [`TaskError::Failed`].
    pub async fn run(&self, name: &str, params: Params) -> Result<Value, TaskError> {
        let task = self.registry.get(name)?;
        let job = Job::new(&task.name, &task.queue, params);
        self.invoke(&task, job).await
    }

    /// Run a dequeued job. Recurrent tasks are queued again after their
    /// frequency, whether or not this run failed.
    ///
    /// # Errors
    ///
    /// [`TaskError::UnknownTask`] when the task is gone, or [`TaskError::Failed`].
    pub async fn execute(&self, job: Job) -> Result<Value, TaskError> {
        let task = self.registry.get(&job.task)?;
        let params = job.params.clone();
        let result = self.invoke(&task, job).await;

        if task.is_recurrent() {
            self.enqueue_in(&task.name, params, task.frequency).await?;
        }
        result
    }

    /// Queue each recurrent task that has no pending job. Returns how many
    /// were queued.
    ///
    /// # Errors
    ///
    /// A queue error.
    pub async fn enqueue_recurrent(&self) -> Result<usize, TaskError> {
        let mut queued = 0;
        for task in self.registry.recurrent() {
            if self.queue.contains_task(&task.name).await? {
                continue;
            }
            self.enqueue(&task.name, Params::new()).await?;
            queued += 1;
        }
        if queued > 0 {
            tracing::info!(queued, "enqueued recurrent tasks");
        }
        Ok(queued)
    }

    async fn invoke(&self, task: &TaskDefinition, job: Job) -> Result<Value, TaskError> {
        let started = Instant::now();
        let id = job.id;
        let params = job.params.clone();
        let ctx = TaskContext::new(job, self.services.read().clone());

        let result = task.handler().run(params, ctx).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(value) => {
                tracing::info!(task = %task.name, job = %id, duration_ms, "task complete");
                Ok(value)
            }
            Err(failure) => {
                tracing::error!(
                    task = %task.name,
                    job = %id,
                    duration_ms,
                    error = %failure,
                    "task failed"
                );
                Err(TaskError::Failed {
                    task: task.name.clone(),
                    message: failure.0,
                })
            }
        }
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

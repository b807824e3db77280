use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orbit_core::{Params, Services};
use serde_json::Value;

use crate::error::{TaskError, TaskFailure};
use crate::job::Job;

/// Queue used when a task does not name one.
pub const DEFAULT_QUEUE: &str = "default";

/// Result type for task bodies.
pub type TaskResult = Result<Value, TaskFailure>;

/// What a task body gets besides its params.
#[derive(Clone)]
pub struct TaskContext {
    job: Job,
    services: Services,
}

impl TaskContext {
    /// Create a context.
    pub const fn new(job: Job, services: Services) -> Self {
        Self { job, services }
    }

    /// The job being run.
    pub const fn job(&self) -> &Job {
        &self.job
    }

    /// Shared services.
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Shortcut for `services().get::<T>()`.
    pub fn service<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services.get::<T>()
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("job", &self.job.id)
            .field("task", &self.job.task)
            .finish_non_exhaustive()
    }
}

/// Body of a task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute one job.
    async fn run(&self, params: Params, ctx: TaskContext) -> TaskResult;
}

/// [`TaskHandler`] backed by an async closure.
pub struct FnTask<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnTask<F>
where
    F: Fn(Params, TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    async fn run(&self, params: Params, ctx: TaskContext) -> TaskResult {
        (self.f)(params, ctx).await
    }
}

/// A named background task.
#[derive(Clone)]
pub struct TaskDefinition {
    /// Task name.
    pub name: String,
    /// Human readable summary.
    pub description: String,
    /// Queue jobs are placed in.
    pub queue: String,
    /// Re-enqueue interval; zero runs only on demand.
    pub frequency: Duration,
    handler: Arc<dyn TaskHandler>,
}

impl TaskDefinition {
    /// Start building a task called `name`.
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            name: name.into(),
            description: String::new(),
            queue: DEFAULT_QUEUE.to_string(),
            frequency: Duration::ZERO,
            handler: None,
        }
    }

    /// Whether the scheduler re-enqueues this task by itself.
    pub fn is_recurrent(&self) -> bool {
        !self.frequency.is_zero()
    }

    /// The body.
    pub fn handler(&self) -> Arc<dyn TaskHandler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .field("frequency", &self.frequency)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TaskDefinition`].
pub struct TaskBuilder {
    name: String,
    description: String,
    queue: String,
    frequency: Duration,
    handler: Option<Arc<dyn TaskHandler>>,
}

impl TaskBuilder {
    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the queue.
    #[must_use]
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Re-enqueue every `frequency`; zero disables.
    #[must_use]
    pub const fn frequency(mut self, frequency: Duration) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set the body.
    #[must_use]
    pub fn handler(mut self, handler: impl TaskHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set the body from an async closure.
    #[must_use]
    pub fn run<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Params, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.handler(FnTask { f })
    }

    /// Finish the definition.
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidDefinition`] for a blank name or queue, or when no
    /// body was set.
    pub fn build(self) -> Result<TaskDefinition, TaskError> {
        if self.name.trim().is_empty() {
            return Err(TaskError::invalid(&self.name, "name must not be blank"));
        }
        if self.queue.trim().is_empty() {
            return Err(TaskError::invalid(&self.name, "queue must not be blank"));
        }
        let Some(handler) = self.handler else {
            return Err(TaskError::invalid(&self.name, "no run function"));
        };
        Ok(TaskDefinition {
            name: self.name,
            description: self.description,
            queue: self.queue,
            frequency: self.frequency,
            handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_to_on_demand_in_default_queue() {
        let task = TaskDefinition::builder("sweep")
            .run(|_, _| async { Ok(Value::Null) })
            .build()
            .unwrap();
        assert_eq!(task.queue, DEFAULT_QUEUE);
        assert!(!task.is_recurrent());
    }

    #[test]
    fn recurrent_when_frequency_set() {
        let task = TaskDefinition::builder("sweep")
            .frequency(Duration::from_secs(60))
            .run(|_, _| async { Ok(Value::Null) })
            .build()
            .unwrap();
        assert!(task.is_recurrent());
    }

    #[test]
    fn build_requires_body() {
        assert_eq!(
            TaskDefinition::builder("sweep").build().unwrap_err(),
            TaskError::invalid("sweep", "no run function")
        );
        assert!(
            TaskDefinition::builder("sweep")
                .queue("")
                .run(|_, _| async { Ok(Value::Null) })
                .build()
                .is_err()
        );
    }
}

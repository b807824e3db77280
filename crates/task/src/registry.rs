use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::definition::TaskDefinition;
use crate::error::TaskError;

/// Registered tasks by name.
pub struct TaskRegistry {
    tasks: DashMap<String, Arc<TaskDefinition>>,
    frozen: AtomicBool,
}

impl TaskRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            frozen: AtomicBool::new(false),
        }
    }

    /// Register a task; a later registration under the same name replaces
    /// the earlier one.
    ///
    /// # Errors
    ///
    /// [`TaskError::Frozen`] after [`freeze`](Self::freeze).
    pub fn register(&self, task: TaskDefinition) -> Result<(), TaskError> {
        if self.is_frozen() {
            return Err(TaskError::Frozen);
        }
        let name = task.name.clone();
        if self.tasks.insert(name.clone(), Arc::new(task)).is_some() {
            tracing::info!(task = %name, "overriding task");
        } else {
            tracing::debug!(task = %name, "registered task");
        }
        Ok(())
    }

    /// Look up a task.
    ///
    /// # Errors
    ///
    /// [`TaskError::UnknownTask`].
    pub fn get(&self, name: &str) -> Result<Arc<TaskDefinition>, TaskError> {
        self.tasks
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| TaskError::unknown(name))
    }

    /// Check if a task is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Tasks with a non-zero frequency, sorted by name.
    #[must_use]
    pub fn recurrent(&self) -> Vec<Arc<TaskDefinition>> {
        let mut tasks: Vec<_> = self
            .tasks
            .iter()
            .filter(|t| t.is_recurrent())
            .map(|t| Arc::clone(t.value()))
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    /// All task names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.iter().map(|t| t.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Refuse further registrations.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Whether [`freeze`](Self::freeze) was called.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

//! # Orbit Task
//!
//! Background tasks for Orbit:
//!
//! - [`TaskRegistry`] holds [`TaskDefinition`]s by name
//! - [`TaskQueue`] is the storage port, [`MemoryQueue`] the in-process driver
//! - [`TaskManager`] enqueues (now, at a time, after a delay), removes and
//!   runs jobs
//! - [`Scheduler`] promotes delayed jobs, keeps recurrent tasks queued and
//!   runs the worker pool

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod definition;
mod error;
mod job;
mod manager;
mod queue;
mod registry;
mod scheduler;

pub use definition::{
    DEFAULT_QUEUE, FnTask, TaskBuilder, TaskContext, TaskDefinition, TaskHandler, TaskResult,
};
pub use error::{QueueError, TaskError, TaskFailure};
pub use job::Job;
pub use manager::TaskManager;
pub use queue::{MemoryQueue, TaskQueue};
pub use registry::TaskRegistry;
pub use scheduler::Scheduler;

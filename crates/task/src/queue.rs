//! Job queue port and the in-process driver.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use orbit_config::ALL_QUEUES;
use parking_lot::Mutex;

use crate::error::QueueError;
use crate::job::Job;

/// Storage for ready and delayed jobs.
///
/// Ready jobs are FIFO per queue. Delayed jobs wait until
/// [`promote_due`](Self::promote_due) moves them to their ready queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a job to its ready queue.
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// Hold a job until `at`.
    async fn enqueue_at(&self, job: Job, at: DateTime<Utc>) -> Result<(), QueueError>;

    /// Move every delayed job due at `now` to its ready queue, earliest
    /// first. Returns how many moved.
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError>;

    /// Take the next ready job from the first non-empty queue in `queues`.
    /// `"*"` matches every queue.
    async fn dequeue(&self, queues: &[String]) -> Result<Option<Job>, QueueError>;

    /// Ready jobs in `queue`.
    async fn len(&self, queue: &str) -> Result<usize, QueueError>;

    /// Jobs waiting for their time.
    async fn delayed_len(&self) -> Result<usize, QueueError>;

    /// Whether a ready or delayed job for `task` exists.
    async fn contains_task(&self, task: &str) -> Result<bool, QueueError>;

    /// Drop every ready and delayed job of `task`. Returns how many.
    async fn remove_task(&self, task: &str) -> Result<usize, QueueError>;
}

#[derive(Default)]
struct Inner {
    ready: IndexMap<String, VecDeque<Job>>,
    delayed: BTreeMap<(DateTime<Utc>, u64), Job>,
    seq: u64,
}

/// In-process [`TaskQueue`]. Jobs do not survive a restart.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let ready: usize = inner.ready.values().map(VecDeque::len).sum();
        f.debug_struct("MemoryQueue")
            .field("ready", &ready)
            .field("delayed", &inner.delayed.len())
            .finish()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        inner.ready.entry(job.queue.clone()).or_default().push_back(job);
        Ok(())
    }

    async fn enqueue_at(&self, job: Job, at: DateTime<Utc>) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        let key = (at, inner.seq);
        inner.delayed.insert(key, job.at(at));
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock();
        let later = inner.delayed.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut inner.delayed, later);
        let moved = due.len();
        for job in due.into_values() {
            inner.ready.entry(job.queue.clone()).or_default().push_back(job);
        }
        Ok(moved)
    }

    async fn dequeue(&self, queues: &[String]) -> Result<Option<Job>, QueueError> {
        let mut inner = self.inner.lock();
        if queues.iter().any(|q| q == ALL_QUEUES) {
            return Ok(inner.ready.values_mut().find_map(VecDeque::pop_front));
        }
        Ok(queues
            .iter()
            .find_map(|q| inner.ready.get_mut(q).and_then(VecDeque::pop_front)))
    }

    async fn len(&self, queue: &str) -> Result<usize, QueueError> {
        Ok(self.inner.lock().ready.get(queue).map_or(0, VecDeque::len))
    }

    async fn delayed_len(&self) -> Result<usize, QueueError> {
        Ok(self.inner.lock().delayed.len())
    }

    async fn contains_task(&self, task: &str) -> Result<bool, QueueError> {
        let inner = self.inner.lock();
        Ok(inner.ready.values().flatten().any(|j| j.task == task)
            || inner.delayed.values().any(|j| j.task == task))
    }

    async fn remove_task(&self, task: &str) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        for jobs in inner.ready.values_mut() {
            let before = jobs.len();
            jobs.retain(|j| j.task != task);
            removed += before - jobs.len();
        }
        let before = inner.delayed.len();
        inner.delayed.retain(|_, j| j.task != task);
        removed += before - inner.delayed.len();
        Ok(removed)
    }
}

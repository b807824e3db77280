//! Background promotion loop and worker pool.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use orbit_config::TaskConfig;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::manager::TaskManager;

/// Runs the delayed-job promotion loop and the workers.
///
/// `tasks.scheduler` enables promotion and recurrent enqueueing;
/// `tasks.workers` workers poll `tasks.queues`. Either may be off.
pub struct Scheduler {
    manager: Arc<TaskManager>,
    config: TaskConfig,
    cancel: Mutex<Option<CancellationToken>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a stopped scheduler.
    pub fn new(manager: Arc<TaskManager>, config: TaskConfig) -> Self {
        Self {
            manager,
            config,
            cancel: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Whether background loops are running.
    pub fn is_running(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// Number of spawned background loops.
    pub fn loop_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Queue recurrent tasks and spawn the loops. Calling it while running
    /// does nothing.
    ///
    /// # Errors
    ///
    /// A queue error while queueing recurrent tasks.
    pub async fn start(&self) -> Result<(), TaskError> {
        if self.is_running() {
            tracing::debug!("scheduler already running");
            return Ok(());
        }

        if self.config.scheduler {
            self.manager.enqueue_recurrent().await?;
        }

        let cancel = CancellationToken::new();
        let mut handles = Vec::new();
        if self.config.scheduler {
            handles.push(self.spawn_promoter(cancel.child_token()));
        }
        for worker in 0..self.config.workers {
            handles.push(self.spawn_worker(worker, cancel.child_token()));
        }

        tracing::info!(
            scheduler = self.config.scheduler,
            workers = self.config.workers,
            queues = ?self.config.queues,
            "task processing started"
        );
        *self.handles.lock() = handles;
        *self.cancel.lock() = Some(cancel);
        Ok(())
    }

    /// Stop the loops and wait for them. A worker in the middle of a job
    /// finishes it first.
    pub async fn stop(&self) {
        let Some(cancel) = self.cancel.lock().take() else {
            return;
        };
        cancel.cancel();

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "task loop ended abnormally");
            }
        }
        tracing::info!("task processing stopped");
    }

    fn spawn_promoter(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(&self.manager);
        let period = self.config.check_timeout();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match manager.queue().promote_due(Utc::now()).await {
                    Ok(0) => {}
                    Ok(moved) => tracing::debug!(moved, "promoted delayed jobs"),
                    Err(e) => tracing::error!(error = %e, "promoting delayed jobs failed"),
                }
            }
        })
    }

    fn spawn_worker(&self, worker: usize, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(&self.manager);
        let queues = self.config.queues.clone();
        let idle = self.config.check_timeout();

        tokio::spawn(async move {
            tracing::debug!(worker, ?queues, "worker started");
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                match manager.queue().dequeue(&queues).await {
                    Ok(Some(job)) => {
                        let task = job.task.clone();
                        // Failures are logged by the manager; keep working.
                        if let Err(e) = manager.execute(job).await {
                            tracing::debug!(worker, task = %task, error = %e, "job ended with error");
                        }
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!(worker, error = %e, "dequeue failed"),
                }
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(idle) => {}
                }
            }
            tracing::debug!(worker, "worker stopped");
        })
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

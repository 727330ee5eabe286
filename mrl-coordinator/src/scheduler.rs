use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_channel::Sender;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::jobs::Task;
use crate::transport::WorkerChannel;
use crate::worker_registry::WorkerRegistry;

/// Dishes out the tasks of one phase to idle workers.
pub struct Scheduler {
    registry: Arc<WorkerRegistry>,
    channel: Arc<dyn WorkerChannel>,
}

/// State shared by every dispatch attempt of one phase.
struct Phase {
    registry: Arc<WorkerRegistry>,
    channel: Arc<dyn WorkerChannel>,

    /// Tasks waiting for a dispatch attempt, retries included.
    pending: Sender<Task>,

    /// Tasks that have not succeeded yet.
    remaining: AtomicUsize,

    /// Fired when `remaining` reaches zero.
    done: Notify,
}

impl Scheduler {
    pub fn new(registry: Arc<WorkerRegistry>, channel: Arc<dyn WorkerChannel>) -> Self {
        Self { registry, channel }
    }

    /// Run every task in `tasks` to completion.
    ///
    /// Each pending task gets its own dispatch attempt, which waits for an
    /// idle worker and calls it. Tasks whose call fails go back into the
    /// pending set, so this returns once every task has succeeded at least
    /// once, and not before. Tasks may run more than once.
    pub async fn schedule(&self, tasks: Vec<Task>) -> Result<()> {
        let total = tasks.len();
        if total == 0 {
            return Ok(());
        }
        info!("Scheduling {total} tasks");

        let (pending, queue) = async_channel::unbounded();
        for task in tasks {
            pending
                .try_send(task)
                .map_err(|e| anyhow!("failed to queue task: {e}"))?;
        }

        let phase = Arc::new(Phase {
            registry: self.registry.clone(),
            channel: self.channel.clone(),
            pending,
            remaining: AtomicUsize::new(total),
            done: Notify::new(),
        });

        let mut attempts = JoinSet::new();
        loop {
            tokio::select! {
                _ = phase.done.notified() => break,
                task = queue.recv() => {
                    // `phase` holds a sender, so the queue cannot close here.
                    let task = task.map_err(|_| anyhow!("task queue closed"))?;
                    attempts.spawn(dispatch(phase.clone(), task));
                }
            }
        }

        // Attempts that are still around have already settled their task
        // and worker; reap them.
        while let Some(joined) = attempts.join_next().await {
            if let Err(e) = joined {
                error!("Dispatch attempt failed: {e}");
            }
        }

        info!("All {total} tasks done");
        Ok(())
    }
}

/// One attempt at running `task`.
async fn dispatch(phase: Arc<Phase>, task: Task) {
    let worker = match phase.registry.checkout().await {
        Ok(worker) => worker,
        Err(e) => {
            error!("Cannot dispatch {task}: {e}");
            return;
        }
    };

    let outcome = phase.channel.run_task(&worker, &task).await;
    phase.registry.check_in(&worker, outcome.is_ok());

    match outcome {
        Ok(()) => {
            let left = phase.remaining.fetch_sub(1, Ordering::SeqCst) - 1;
            info!("{task} done by {worker}, {left} remaining");
            if left == 0 {
                phase.done.notify_one();
            }
        }
        Err(e) => {
            warn!("{task} failed: {e}; rescheduling");
            if phase.pending.try_send(task).is_err() {
                error!("Task queue closed, a task was dropped");
            }
        }
    }
}

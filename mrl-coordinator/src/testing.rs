//! An in-process stand-in for a set of workers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use common::rpc::CallError;

use crate::jobs::Task;
use crate::transport::WorkerChannel;

#[derive(Default)]
pub struct FakeWorkers {
    delay: Duration,

    /// Workers whose every call fails.
    dead: HashSet<String>,

    /// Tasks whose next attempt fails.
    fail_once: Mutex<Vec<Task>>,

    attempts: Mutex<Vec<(String, Task)>>,
    successes: Mutex<Vec<Task>>,
    shutdowns: Mutex<Vec<String>>,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeWorkers {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn dead(mut self, worker: &str) -> Self {
        self.dead.insert(worker.to_string());
        self
    }

    pub fn failing_once(self, task: Task) -> Self {
        self.fail_once.lock().unwrap().push(task);
        self
    }

    pub fn attempts(&self) -> Vec<(String, Task)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn successful_tasks(&self) -> Vec<Task> {
        self.successes.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> Vec<String> {
        self.shutdowns.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn refused(worker: &str) -> CallError {
        CallError::rejected(worker, "Worker.Fake", tonic::Status::unavailable("refused"))
    }
}

#[tonic::async_trait]
impl WorkerChannel for FakeWorkers {
    async fn run_task(&self, worker: &str, task: &Task) -> Result<(), CallError> {
        self.attempts
            .lock()
            .unwrap()
            .push((worker.to_string(), task.clone()));

        if self.dead.contains(worker) {
            return Err(Self::refused(worker));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut fail_once = self.fail_once.lock().unwrap();
            if let Some(pos) = fail_once.iter().position(|t| t == task) {
                fail_once.remove(pos);
                return Err(Self::refused(worker));
            }
        }

        self.successes.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn shutdown(&self, worker: &str) -> Result<(), CallError> {
        self.shutdowns.lock().unwrap().push(worker.to_string());
        if self.dead.contains(worker) {
            return Err(Self::refused(worker));
        }
        Ok(())
    }
}

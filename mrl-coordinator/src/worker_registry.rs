use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Result};
use async_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::worker_info::*;

/// Registry for workers.
///
/// Every worker that ever registered has an entry keyed by its address.
/// Idle workers additionally sit in a queue that [`checkout`] pops from,
/// so dispatchers wait on the queue rather than polling worker states.
///
/// [`checkout`]: WorkerRegistry::checkout
#[derive(Debug)]
pub struct WorkerRegistry {
    idle_tx: Sender<WorkerAddress>,
    idle_rx: Receiver<WorkerAddress>,

    roster: Mutex<Roster>,

    /// Consecutive failed calls after which a worker stays out of the idle
    /// pool. `None` always returns workers to the pool.
    quarantine_after: Option<u32>,
}

#[derive(Debug)]
struct Roster {
    workers: HashMap<WorkerAddress, WorkerInfo>,

    /// Cleared by [`WorkerRegistry::stop_accepting`]; no worker joins after.
    accepting: bool,
}

impl Roster {
    /// Workers that are, or will be once their call returns, in the idle pool.
    fn pooled(&self) -> usize {
        self.workers
            .values()
            .filter(|w| w.state != WorkerState::Quarantined)
            .count()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl WorkerRegistry {
    pub fn new(quarantine_after: Option<u32>) -> Self {
        let (idle_tx, idle_rx) = async_channel::unbounded();
        Self {
            idle_tx,
            idle_rx,
            roster: Mutex::new(Roster {
                workers: HashMap::new(),
                accepting: true,
            }),
            quarantine_after,
        }
    }

    fn roster(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn make_idle(&self, worker: &mut WorkerInfo) {
        worker.set_state(WorkerState::Idle);
        // Unbounded, so this only fails once the pool is closed.
        if self.idle_tx.try_send(worker.address.clone()).is_err() {
            debug!("Pool closed, {} not returned", worker.address);
        }
    }

    /// Add a worker to the registry and make it available for dispatch.
    ///
    /// Returns whether `address` is a new identity. Registering a known
    /// address again lifts its quarantine, if any, and otherwise changes
    /// nothing. Fails once [`stop_accepting`] has been called.
    ///
    /// [`stop_accepting`]: WorkerRegistry::stop_accepting
    pub fn register(&self, address: WorkerAddress) -> Result<bool> {
        let mut roster = self.roster();
        if !roster.accepting {
            bail!("registry no longer accepts workers");
        }

        match roster.workers.get_mut(&address) {
            None => {
                info!("Worker at {address} has registered.");
                let mut worker = WorkerInfo::new(address.clone());
                self.make_idle(&mut worker);
                roster.workers.insert(address, worker);
                Ok(true)
            }
            Some(worker) if worker.state == WorkerState::Quarantined => {
                info!("Worker at {address} registered again, lifting quarantine.");
                worker.consecutive_failures = 0;
                self.make_idle(worker);
                Ok(false)
            }
            Some(_) => {
                debug!("Worker at {address} is already registered.");
                Ok(false)
            }
        }
    }

    /// Take an idle worker out of the pool, waiting for one if none is idle.
    ///
    /// Fails only once the pool has been closed.
    pub async fn checkout(&self) -> Result<WorkerAddress> {
        let address = self
            .idle_rx
            .recv()
            .await
            .map_err(|_| anyhow!("worker pool is closed"))?;

        if let Some(worker) = self.roster().workers.get_mut(&address) {
            worker.set_state(WorkerState::Busy);
        }

        Ok(address)
    }

    /// Hand a checked-out worker back after a call.
    ///
    /// The last worker of the pool is never quarantined, or the phase it
    /// serves could not finish.
    pub fn check_in(&self, address: &str, succeeded: bool) {
        let mut roster = self.roster();
        let others_pooled = roster
            .workers
            .values()
            .any(|w| w.address != address && w.state != WorkerState::Quarantined);

        let Some(worker) = roster.workers.get_mut(address) else {
            warn!("Checking in unknown worker {address}");
            return;
        };

        worker.record(succeeded);

        let over_limit = !succeeded
            && self
                .quarantine_after
                .is_some_and(|limit| worker.consecutive_failures >= limit);

        if over_limit && others_pooled {
            warn!(
                "Worker at {address} failed {} calls in a row, quarantining it.",
                worker.consecutive_failures
            );
            worker.set_state(WorkerState::Quarantined);
            return;
        }
        if over_limit {
            warn!("Worker at {address} keeps failing but is the last one in the pool.");
        }

        self.make_idle(worker);
    }

    /// Number of distinct workers that ever registered.
    pub fn total_registered(&self) -> usize {
        self.roster().workers.len()
    }

    /// Workers that were registered but are not quarantined. Once no call
    /// is in flight, exactly this many sit in the idle pool.
    pub fn pooled(&self) -> usize {
        self.roster().pooled()
    }

    /// Refuse any further registration, and return how many workers are
    /// pooled at that point. Both happen under one lock, so no worker can
    /// join after the count is taken.
    pub fn stop_accepting(&self) -> usize {
        let mut roster = self.roster();
        roster.accepting = false;
        roster.pooled()
    }

    pub fn quarantined(&self) -> Vec<WorkerAddress> {
        let mut quarantined: Vec<_> = self
            .roster()
            .workers
            .values()
            .filter(|w| w.state == WorkerState::Quarantined)
            .map(|w| w.address.clone())
            .collect();
        quarantined.sort();
        quarantined
    }

    pub fn get_worker(&self, address: &str) -> Option<WorkerInfo> {
        self.roster().workers.get(address).cloned()
    }

    /// Stop handing out workers. Pending and future checkouts fail.
    pub fn close(&self) {
        self.idle_tx.close();
    }
}

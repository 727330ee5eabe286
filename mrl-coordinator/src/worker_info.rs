/// Workers are known by the address their RPC server listens on.
pub type WorkerAddress = String;

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum WorkerState {
    /// Sitting in the idle pool, available for dispatch.
    Idle,

    /// Checked out for exactly one in-flight call.
    Busy,

    /// Failed too many calls in a row; kept out of the idle pool until it
    /// registers again.
    Quarantined,
}

#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub address: WorkerAddress,

    /// The state of the worker.
    pub state: WorkerState,

    /// Failed calls since the last successful one.
    pub consecutive_failures: u32,

    /// Calls this worker has completed successfully.
    pub tasks_done: u32,
}

impl WorkerInfo {
    /// Workers start off idle.
    pub fn new(address: WorkerAddress) -> Self {
        Self {
            address,
            state: WorkerState::Idle,
            consecutive_failures: 0,
            tasks_done: 0,
        }
    }

    /// Record the outcome of a call.
    pub fn record(&mut self, succeeded: bool) {
        if succeeded {
            self.consecutive_failures = 0;
            self.tasks_done += 1;
        } else {
            self.consecutive_failures += 1;
        }
    }

    /// Set worker state.
    pub fn set_state(&mut self, new_state: WorkerState) {
        self.state = new_state;
    }
}

//! The MapReduce master: accepts worker registrations, hands out the map
//! and reduce tasks of one job and merges the results.

pub mod core;
pub mod jobs;
pub mod scheduler;
pub mod transport;
pub mod worker_info;
pub mod worker_registry;

#[cfg(test)]
mod testing;

pub use crate::core::{Coordinator, MasterService};
pub use crate::jobs::{Job, Task};
pub use crate::scheduler::Scheduler;
pub use crate::transport::{GrpcWorkerChannel, WorkerChannel};
pub use crate::worker_registry::WorkerRegistry;

use tonic::Request;
use tracing::debug;

use common::rpc::worker::ShutdownArgs;
use common::rpc::{CallError, ChannelConfig};

use crate::jobs::Task;

/// How the master reaches its workers.
///
/// Implementations report only whether a call got a reply. The scheduler
/// does not care why a call failed.
#[tonic::async_trait]
pub trait WorkerChannel: Send + Sync + 'static {
    /// Run `task` on the worker at `worker`, waiting for it to finish.
    async fn run_task(&self, worker: &str, task: &Task) -> Result<(), CallError>;

    /// Tell the worker at `worker` to stop.
    async fn shutdown(&self, worker: &str) -> Result<(), CallError>;
}

/// [`WorkerChannel`] over gRPC. Every call uses a fresh connection.
#[derive(Debug, Clone, Default)]
pub struct GrpcWorkerChannel {
    config: ChannelConfig,
}

impl GrpcWorkerChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }
}

#[tonic::async_trait]
impl WorkerChannel for GrpcWorkerChannel {
    async fn run_task(&self, worker: &str, task: &Task) -> Result<(), CallError> {
        debug!("Calling Worker.{} on {worker}", task.name());
        let mut client = self.config.worker(worker).await?;

        let reply = match task {
            Task::Map(args) => client.do_map(Request::new(args.clone())).await,
            Task::Reduce(args) => client.do_reduce(Request::new(args.clone())).await,
        };

        reply
            .map(|_| ())
            .map_err(|status| CallError::rejected(worker, method_name(task), status))
    }

    async fn shutdown(&self, worker: &str) -> Result<(), CallError> {
        debug!("Calling Worker.Shutdown on {worker}");
        let mut client = self.config.worker(worker).await?;
        client
            .shutdown(Request::new(ShutdownArgs {}))
            .await
            .map(|_| ())
            .map_err(|status| CallError::rejected(worker, "Worker.Shutdown", status))
    }
}

fn method_name(task: &Task) -> &'static str {
    match task {
        Task::Map(_) => "Worker.DoMap",
        Task::Reduce(_) => "Worker.DoReduce",
    }
}

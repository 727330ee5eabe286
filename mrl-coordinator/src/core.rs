use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

pub use common::rpc::master::master_server::{Master, MasterServer};
use common::merge::merge_reduce_outputs;
use common::rpc::master::{RegisterArgs, RegisterReply};

use crate::jobs::Job;
use crate::scheduler::Scheduler;
use crate::transport::WorkerChannel;
use crate::worker_registry::WorkerRegistry;

/// RPC face of the master.
#[derive(Debug, Clone)]
pub struct MasterService {
    registry: Arc<WorkerRegistry>,
    active: Arc<AtomicBool>,
}

#[tonic::async_trait]
impl Master for MasterService {
    /// Worker requests to join the workforce.
    async fn register(
        &self,
        request: Request<RegisterArgs>,
    ) -> Result<Response<RegisterReply>, Status> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(Status::unavailable("master is not running a job"));
        }

        let address = request.into_inner().worker_address;
        if address.is_empty() {
            return Err(Status::invalid_argument("worker address is empty"));
        }

        self.registry
            .register(address)
            .map_err(|e| Status::unavailable(e.to_string()))?;
        Ok(Response::new(RegisterReply {}))
    }
}

/// Drives one job from map tasks to merged output.
pub struct Coordinator {
    job: Job,

    /// Where reduce outputs are found and the merged output is written.
    work_dir: PathBuf,

    registry: Arc<WorkerRegistry>,
    channel: Arc<dyn WorkerChannel>,
    scheduler: Scheduler,

    /// Whether this master is running a job at the moment.
    active: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(
        job: Job,
        work_dir: impl Into<PathBuf>,
        registry: Arc<WorkerRegistry>,
        channel: Arc<dyn WorkerChannel>,
    ) -> Self {
        let scheduler = Scheduler::new(registry.clone(), channel.clone());
        Self {
            job,
            work_dir: work_dir.into(),
            registry,
            channel,
            scheduler,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn service(&self) -> MasterService {
        MasterService {
            registry: self.registry.clone(),
            active: self.active.clone(),
        }
    }

    /// Run the job: serve registrations on `listener`, run the map phase,
    /// then the reduce phase, shut every worker down, stop serving and
    /// merge the reduce outputs.
    ///
    /// Returns the path of the merged output.
    pub async fn run(&self, listener: TcpListener) -> Result<PathBuf> {
        self.active.store(true, Ordering::SeqCst);
        info!("Starting master rpc server on {}", listener.local_addr()?);

        let stop = Arc::new(Notify::new());
        let signal = stop.clone();
        let server = tokio::spawn(
            Server::builder()
                .add_service(MasterServer::new(self.service()))
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                    signal.notified().await
                }),
        );

        let phases = self.run_phases().await;

        self.shutdown_workers().await;
        stop.notify_one();
        server
            .await
            .context("master server task failed")?
            .context("master server failed")?;
        info!("RPC server is done.");

        phases?;
        self.merge()
    }

    /// Map phase, then reduce phase. No reduce task is handed out before
    /// every map task has succeeded.
    pub async fn run_phases(&self) -> Result<()> {
        info!(
            "Map phase of `{}`: {} inputs",
            self.job.name(),
            self.job.num_mappers()
        );
        self.scheduler.schedule(self.job.map_tasks()).await?;

        info!(
            "Reduce phase of `{}`: {} reducers",
            self.job.name(),
            self.job.num_reducers()
        );
        self.scheduler.schedule(self.job.reduce_tasks()).await?;

        Ok(())
    }

    /// Stop accepting workers and send `Shutdown` once to every worker
    /// that ever registered. Returns the number of calls made.
    ///
    /// Must only run while no task is in flight: it drains the idle pool
    /// and waits for every non-quarantined worker to be in it.
    pub async fn shutdown_workers(&self) -> usize {
        self.active.store(false, Ordering::SeqCst);
        let pooled = self.registry.stop_accepting();

        let mut sent = 0;
        for _ in 0..pooled {
            let Ok(worker) = self.registry.checkout().await else {
                break;
            };
            self.send_shutdown(&worker).await;
            sent += 1;
        }

        for worker in self.registry.quarantined() {
            self.send_shutdown(&worker).await;
            sent += 1;
        }

        self.registry.close();
        info!("Shut down {sent} workers");
        sent
    }

    async fn send_shutdown(&self, worker: &str) {
        if let Err(e) = self.channel.shutdown(worker).await {
            warn!("Shutdown of {worker} failed: {e}");
        }
    }

    /// Merge the reduce outputs into one file.
    pub fn merge(&self) -> Result<PathBuf> {
        merge_reduce_outputs(&self.work_dir, self.job.name(), self.job.num_reducers())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::jobs::Task;
    use crate::testing::FakeWorkers;

    const LIMIT: Duration = Duration::from_secs(10);

    fn coordinator(fake: FakeWorkers, quarantine_after: Option<u32>) -> (Coordinator, Arc<FakeWorkers>) {
        let job = Job::new("test", vec!["a".into(), "b".into(), "c".into()], 2).unwrap();
        let fake = Arc::new(fake);
        let registry = Arc::new(WorkerRegistry::new(quarantine_after));
        (Coordinator::new(job, ".", registry, fake.clone()), fake)
    }

    async fn register(coordinator: &Coordinator, address: &str) -> Result<(), Status> {
        coordinator
            .service()
            .register(Request::new(RegisterArgs {
                worker_address: address.to_string(),
            }))
            .await
            .map(|_| ())
    }

    #[tokio::test]
    async fn registration_needs_an_active_master() {
        let (coordinator, _) = coordinator(FakeWorkers::default(), None);

        let status = register(&coordinator, "w:1").await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);

        coordinator.active.store(true, Ordering::SeqCst);
        register(&coordinator, "w:1").await.unwrap();
        assert_eq!(coordinator.registry().total_registered(), 1);

        let status = register(&coordinator, "").await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn reduce_phase_starts_after_map_phase() {
        let fake = FakeWorkers::default().with_delay(Duration::from_millis(5));
        let flaky = Task::Map(crate::jobs::DoMapArgs {
            input_file_name: "c".into(),
            mapper_num: 2,
            num_reducers: 2,
        });
        let (coordinator, fake) = coordinator(fake.failing_once(flaky), None);
        coordinator.active.store(true, Ordering::SeqCst);
        for worker in ["w:1", "w:2", "w:3"] {
            register(&coordinator, worker).await.unwrap();
        }

        timeout(LIMIT, coordinator.run_phases()).await.unwrap().unwrap();

        let names: Vec<_> = fake.attempts().iter().map(|(_, t)| t.name()).collect();
        let first_reduce = names.iter().position(|n| *n == "DoReduce").unwrap();
        assert!(names[..first_reduce].iter().all(|n| *n == "DoMap"));
        assert!(names[first_reduce..].iter().all(|n| *n == "DoReduce"));
        assert_eq!(fake.successful_tasks().len(), 3 + 2);
    }

    #[tokio::test]
    async fn every_registered_worker_is_shut_down_once() {
        let (coordinator, fake) = coordinator(FakeWorkers::default(), None);
        coordinator.active.store(true, Ordering::SeqCst);
        for worker in ["w:1", "w:2", "w:1", "w:3"] {
            register(&coordinator, worker).await.unwrap();
        }

        timeout(LIMIT, coordinator.run_phases()).await.unwrap().unwrap();
        let sent = timeout(LIMIT, coordinator.shutdown_workers()).await.unwrap();

        assert_eq!(sent, 3);
        let mut shutdowns = fake.shutdowns();
        shutdowns.sort();
        assert_eq!(shutdowns, ["w:1", "w:2", "w:3"]);
        assert!(!coordinator.is_active());

        let status = register(&coordinator, "w:4").await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn quarantined_workers_are_shut_down_too() {
        let fake = FakeWorkers::default().dead("dead:1");
        let (coordinator, fake) = coordinator(fake, Some(1));
        coordinator.active.store(true, Ordering::SeqCst);
        for worker in ["dead:1", "ok:1"] {
            register(&coordinator, worker).await.unwrap();
        }

        timeout(LIMIT, coordinator.run_phases()).await.unwrap().unwrap();
        let sent = timeout(LIMIT, coordinator.shutdown_workers()).await.unwrap();

        assert_eq!(sent, 2);
        let mut shutdowns = fake.shutdowns();
        shutdowns.sort();
        assert_eq!(shutdowns, ["dead:1", "ok:1"]);
    }

    #[tokio::test]
    async fn registration_racing_shutdown_is_refused() {
        let (coordinator, _) = coordinator(FakeWorkers::default(), None);
        coordinator.active.store(true, Ordering::SeqCst);
        register(&coordinator, "w:1").await.unwrap();

        // The registry closes before the active flag is observed as cleared.
        assert_eq!(coordinator.registry().stop_accepting(), 1);
        let status = register(&coordinator, "w:2").await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert_eq!(coordinator.registry().total_registered(), 1);

        let sent = timeout(LIMIT, coordinator.shutdown_workers()).await.unwrap();
        assert_eq!(sent, 1);
    }
}

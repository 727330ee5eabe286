//! A MapReduce worker: runs the map and reduce tasks a master hands it
//! and leaves the results on the shared filesystem.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info, warn};

use common::rpc::master::RegisterArgs;
use common::rpc::{CallError, ChannelConfig};
use common::Workload;

pub mod core;
pub mod map;
pub mod reduce;

use crate::core::{MRWorker, WorkerServer};

/// What a worker needs to execute tasks for one job.
#[derive(Clone)]
pub struct Engine {
    job_name: String,
    workload: Arc<dyn Workload>,
    work_dir: PathBuf,
}

impl Engine {
    pub fn new(job_name: impl Into<String>, workload: Arc<dyn Workload>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_name: job_name.into(),
            workload,
            work_dir: work_dir.into(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn workload(&self) -> &dyn Workload {
        self.workload.as_ref()
    }

    /// Directory holding intermediate and output files.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// The address this worker was asked to listen on.
    pub address: String,

    pub master_address: String,

    /// How often to try reaching the master before giving up.
    pub register_attempts: u32,

    pub register_interval: Duration,

    pub channel: ChannelConfig,
}

impl WorkerConfig {
    pub fn new(address: impl Into<String>, master_address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            master_address: master_address.into(),
            // 40 tries, 250ms apart: about ten seconds.
            register_attempts: 40,
            register_interval: Duration::from_millis(250),
            channel: ChannelConfig::default(),
        }
    }
}

/// Work done by a worker over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub maps_done: u32,
    pub reduces_done: u32,
}

/// Serve `engine` on `listener`, register with the master, and block
/// until the master sends `Shutdown`.
///
/// Fails if the master could not be reached.
pub async fn run(listener: TcpListener, config: WorkerConfig, engine: Engine) -> Result<WorkerStats> {
    let bound = listener.local_addr()?;
    let address = advertised_address(&config.address, bound);
    info!("Worker server listening on {bound}, advertised as {address}");

    let shutdown = Arc::new(Notify::new());
    let worker = Arc::new(MRWorker::new(engine, shutdown.clone()));

    let signal = shutdown.clone();
    let server = tokio::spawn(
        Server::builder()
            .add_service(WorkerServer::from_arc(worker.clone()))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                signal.notified().await
            }),
    );

    let registered = register_with_master(&config, &address).await;
    if !registered {
        error!("Failed to register. Shutting down.");
        worker.stop();
    }

    server
        .await
        .context("worker server task failed")?
        .context("worker server failed")?;
    info!("RPC server is done.");

    if !registered {
        return Err(anyhow!(
            "could not register with master at {}",
            config.master_address
        ));
    }

    Ok(worker.stats())
}

/// Announce `address` to the master, retrying on a fixed interval.
async fn register_with_master(config: &WorkerConfig, address: &str) -> bool {
    for attempt in 0..config.register_attempts {
        match register_once(config, address).await {
            Ok(()) => {
                info!("Registered successfully with {}", config.master_address);
                return true;
            }
            Err(e) => {
                if attempt % 10 == 0 {
                    warn!("Retrying registration attempt (address: {address}): {e}");
                }
                tokio::time::sleep(config.register_interval).await;
            }
        }
    }

    false
}

async fn register_once(config: &WorkerConfig, address: &str) -> Result<(), CallError> {
    let mut client = config.channel.master(&config.master_address).await?;
    let request = tonic::Request::new(RegisterArgs {
        worker_address: address.to_string(),
    });
    client
        .register(request)
        .await
        .map_err(|status| CallError::rejected(&config.master_address, "Master.Register", status))?;
    Ok(())
}

/// A worker asked to listen on port 0 advertises the port it actually got.
fn advertised_address(configured: &str, bound: SocketAddr) -> String {
    match configured.rsplit_once(':') {
        Some((host, "0")) => format!("{host}:{}", bound.port()),
        _ => configured.to_string(),
    }
}

//
// Import gRPC stubs/definitions.
//
pub use common::rpc::worker::worker_server::{Worker, WorkerServer};
pub use common::rpc::worker::{DoMapArgs, DoReduceArgs, ShutdownArgs, ShutdownReply, TaskReply};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Notify;
use tokio::task::JoinError;
use tonic::{Request, Response, Status};
use tracing::{error, info};

use common::MAX_REDUCERS;

use crate::{map, reduce, Engine, WorkerStats};

/// RPC face of a worker.
pub struct MRWorker {
    engine: Engine,

    /// Cleared once the master tells us to shut down.
    active: AtomicBool,

    maps_done: AtomicU32,
    reduces_done: AtomicU32,

    /// Stops the RPC server.
    shutdown: Arc<Notify>,
}

impl MRWorker {
    pub fn new(engine: Engine, shutdown: Arc<Notify>) -> Self {
        Self {
            engine,
            active: AtomicBool::new(true),
            maps_done: AtomicU32::new(0),
            reduces_done: AtomicU32::new(0),
            shutdown,
        }
    }

    /// Whether this worker is accepting work.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop accepting work and release the listener.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            maps_done: self.maps_done.load(Ordering::SeqCst),
            reduces_done: self.reduces_done.load(Ordering::SeqCst),
        }
    }

    fn ensure_active(&self) -> Result<(), Status> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Status::unavailable("worker is shutting down"))
        }
    }
}

/// A task that could not touch its own files leaves the worker in an
/// unknown state. Exit and let the master hand the task to someone else.
fn fail_fast(err: anyhow::Error) -> ! {
    error!("{err:#}");
    std::process::exit(1)
}

fn settle(outcome: Result<anyhow::Result<()>, JoinError>) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => fail_fast(e),
        Err(e) => fail_fast(anyhow!("task panicked: {e}")),
    }
}

#[tonic::async_trait]
impl Worker for MRWorker {
    async fn do_map(&self, request: Request<DoMapArgs>) -> Result<Response<TaskReply>, Status> {
        self.ensure_active()?;

        let args = request.into_inner();
        if args.num_reducers == 0 || args.num_reducers > MAX_REDUCERS {
            return Err(Status::invalid_argument(format!(
                "num_reducers must be between 1 and {MAX_REDUCERS}, got {}",
                args.num_reducers
            )));
        }

        let engine = self.engine.clone();
        settle(
            tokio::task::spawn_blocking(move || {
                map::perform_map(
                    &engine,
                    &args.input_file_name,
                    args.mapper_num,
                    args.num_reducers,
                )
            })
            .await,
        );

        self.maps_done.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(TaskReply {}))
    }

    async fn do_reduce(
        &self,
        request: Request<DoReduceArgs>,
    ) -> Result<Response<TaskReply>, Status> {
        self.ensure_active()?;

        let args = request.into_inner();
        let engine = self.engine.clone();
        settle(
            tokio::task::spawn_blocking(move || {
                reduce::perform_reduce(&engine, args.reducer_num, args.num_mappers)
            })
            .await,
        );

        self.reduces_done.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(TaskReply {}))
    }

    async fn shutdown(
        &self,
        _: Request<ShutdownArgs>,
    ) -> Result<Response<ShutdownReply>, Status> {
        let stats = self.stats();
        info!(
            "SHUTDOWN after {} maps and {} reduces",
            stats.maps_done, stats.reduces_done
        );
        self.stop();
        Ok(Response::new(ShutdownReply {}))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn worker(dir: &TempDir) -> MRWorker {
        let engine = Engine::new("wc", Arc::new(workload::WordCount::new()), dir.path());
        MRWorker::new(engine, Arc::new(Notify::new()))
    }

    #[tokio::test]
    async fn map_then_reduce_counts_work() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("doc.txt");
        fs::write(&input, "a b a").unwrap();
        let worker = worker(&dir);

        worker
            .do_map(Request::new(DoMapArgs {
                input_file_name: input.display().to_string(),
                mapper_num: 0,
                num_reducers: 1,
            }))
            .await
            .unwrap();
        worker
            .do_reduce(Request::new(DoReduceArgs {
                reducer_num: 0,
                num_mappers: 1,
            }))
            .await
            .unwrap();

        assert_eq!(
            worker.stats(),
            WorkerStats {
                maps_done: 1,
                reduces_done: 1
            }
        );
        assert!(dir.path().join("mrtmp.wc-res-0").exists());
    }

    #[tokio::test]
    async fn out_of_range_reducer_counts_are_rejected() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir);

        for num_reducers in [0, MAX_REDUCERS + 1, u32::MAX] {
            let status = worker
                .do_map(Request::new(DoMapArgs {
                    input_file_name: "unused".to_string(),
                    mapper_num: 0,
                    num_reducers,
                }))
                .await
                .unwrap_err();
            assert_eq!(status.code(), tonic::Code::InvalidArgument);
        }
        assert_eq!(worker.stats().maps_done, 0);
    }

    #[tokio::test]
    async fn no_work_accepted_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir);

        worker.shutdown(Request::new(ShutdownArgs {})).await.unwrap();
        assert!(!worker.is_active());

        let status = worker
            .do_reduce(Request::new(DoReduceArgs {
                reducer_num: 0,
                num_mappers: 0,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }
}

mod args;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use args::Args;
use common::Workload;
use mrl_coordinator::{Coordinator, GrpcWorkerChannel, Job, WorkerRegistry};
use mrl_worker::{Engine, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let workload = resolve_workload(&args.job);

    if args.master {
        validate_inputs(&args.inputs);
        run_master(args).await
    } else {
        run_worker(args, workload).await
    }
}

/// Exit through clap's error path, printing usage.
fn usage_error(kind: ErrorKind, message: impl std::fmt::Display) -> ! {
    Args::command().error(kind, message).exit()
}

fn resolve_workload(name: &str) -> Arc<dyn Workload> {
    workload::try_named(name).unwrap_or_else(|| {
        usage_error(
            ErrorKind::InvalidValue,
            format!(
                "unknown workload `{name}`, expected one of: {}",
                workload::NAMES.join(", ")
            ),
        )
    })
}

fn validate_inputs(inputs: &[String]) {
    if inputs.is_empty() {
        usage_error(
            ErrorKind::MissingRequiredArgument,
            "the master needs at least one input file",
        );
    }
    for input in inputs {
        if !Path::new(input).is_file() {
            usage_error(
                ErrorKind::ValueValidation,
                format!("`{input}` is not an existing regular file"),
            );
        }
    }
}

async fn run_master(args: Args) -> Result<()> {
    let channel = GrpcWorkerChannel::new(args.channel_config());
    let job = Job::new(args.job, args.inputs, args.reducers)?;
    let listener = TcpListener::bind(&args.master_address)
        .await
        .with_context(|| format!("failed to listen on {}", args.master_address))?;

    let registry = Arc::new(WorkerRegistry::new(args.quarantine_after));
    let coordinator = Coordinator::new(job, args.work_dir, registry, Arc::new(channel));

    let merged = coordinator.run(listener).await?;
    info!("Job done, output in {}", merged.display());
    println!("{}", merged.display());
    Ok(())
}

async fn run_worker(args: Args, workload: Arc<dyn Workload>) -> Result<()> {
    let listener = TcpListener::bind(&args.worker_address)
        .await
        .with_context(|| format!("failed to listen on {}", args.worker_address))?;

    let channel = args.channel_config();
    let engine = Engine::new(args.job, workload, args.work_dir);
    let mut config = WorkerConfig::new(args.worker_address, args.master_address);
    config.channel = channel;

    let stats = mrl_worker::run(listener, config, engine).await?;
    info!(
        "Worker exiting after {} maps and {} reduces",
        stats.maps_done, stats.reduces_done
    );
    Ok(())
}

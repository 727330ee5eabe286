use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use common::rpc::ChannelConfig;
use common::MAX_REDUCERS;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["master", "worker"])))]
pub struct Args {
    /// Run as the master of a job.
    #[arg(short = 'p', long)]
    pub master: bool,

    /// Run as a worker.
    #[arg(short = 'w', long)]
    pub worker: bool,

    /// Number of reduce tasks.
    #[arg(short = 'r', long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..=MAX_REDUCERS as i64))]
    pub reducers: u32,

    /// Address of the master.
    #[arg(short = 'm', long, default_value = "localhost:7782")]
    pub master_address: String,

    /// Address the worker listens on and advertises.
    #[arg(short = 'a', long, default_value = "localhost:7783")]
    pub worker_address: String,

    /// Workload to run. Also names every file the job produces.
    #[arg(short = 'j', long, default_value = "wc")]
    pub job: String,

    /// Directory for intermediate and output files.
    #[arg(short = 'd', long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Keep a worker out of the pool after this many failed calls in a row.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub quarantine_after: Option<u32>,

    /// Give up connecting to a peer after this many milliseconds.
    /// Calls themselves are never timed out.
    #[arg(long, value_name = "MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Input files, one map task each.
    pub inputs: Vec<String>,
}

impl Args {
    /// Settings for every outgoing RPC connection.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            ..ChannelConfig::default()
        }
    }
}

use std::fmt;

use anyhow::{bail, Result};

use common::MAX_REDUCERS;
pub use common::rpc::worker::{DoMapArgs, DoReduceArgs};

/// A job context.
///
/// Built once before the master starts and never changed afterwards.
#[derive(Debug, Clone)]
pub struct Job {
    /// Name of the job, which is also the name of its workload. Every
    /// file the job produces is named after it.
    name: String,

    /// Input files, one map task each, in mapper order.
    inputs: Vec<String>,

    /// Number of reduce tasks.
    num_reducers: u32,
}

impl Job {
    pub fn new(name: impl Into<String>, inputs: Vec<String>, num_reducers: u32) -> Result<Self> {
        if inputs.is_empty() {
            bail!("a job needs at least one input file");
        }
        if num_reducers == 0 {
            bail!("a job needs at least one reducer");
        }
        if num_reducers > MAX_REDUCERS {
            bail!("a job can have at most {MAX_REDUCERS} reducers");
        }

        Ok(Self {
            name: name.into(),
            inputs,
            num_reducers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_mappers(&self) -> u32 {
        self.inputs.len() as u32
    }

    pub fn num_reducers(&self) -> u32 {
        self.num_reducers
    }

    /// One map task per input.
    pub fn map_tasks(&self) -> Vec<Task> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(mapper, input)| {
                Task::Map(DoMapArgs {
                    input_file_name: input.clone(),
                    mapper_num: mapper as u32,
                    num_reducers: self.num_reducers,
                })
            })
            .collect()
    }

    /// One reduce task per reducer.
    pub fn reduce_tasks(&self) -> Vec<Task> {
        (0..self.num_reducers)
            .map(|reducer| {
                Task::Reduce(DoReduceArgs {
                    reducer_num: reducer,
                    num_mappers: self.num_mappers(),
                })
            })
            .collect()
    }
}

/// A unit of work for one worker.
///
/// Tasks carry everything the worker needs, so the same task can be
/// handed out again after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Map(DoMapArgs),
    Reduce(DoReduceArgs),
}

impl Task {
    /// Name of the worker procedure that runs this task.
    pub fn name(&self) -> &'static str {
        match self {
            Task::Map(_) => "DoMap",
            Task::Reduce(_) => "DoReduce",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Map(args) => write!(
                f,
                "DoMap[mapper={}]{{{}}}[=>{}]",
                args.mapper_num, args.input_file_name, args.num_reducers
            ),
            Task::Reduce(args) => write!(
                f,
                "DoReduce[reducer={}][<={}]",
                args.reducer_num, args.num_mappers
            ),
        }
    }
}

use std::fs::{self, File};
use std::io::BufWriter;

use anyhow::{Context, Result};
use tracing::{debug, info};

use common::codec::write_records;
use common::naming::reduce_input_name;
use common::{reducer_for, KeyValue};

use crate::Engine;

/// Run the workload's map function over `input` and write one sorted
/// intermediate file per reducer.
///
/// The map function sees the input's name as key and its full contents
/// as value. Every reducer gets a file, even an empty one, so reducers
/// never have to tell a missing file from a mapper with nothing to say.
pub fn perform_map(engine: &Engine, input: &str, mapper: u32, num_reducers: u32) -> Result<()> {
    info!(
        "MAP[{}:{}]: Processing '{}' for {} reducers.",
        engine.job_name(),
        mapper,
        input,
        num_reducers
    );

    let bytes =
        fs::read(input).with_context(|| format!("opening mapper input file {input} failed"))?;
    let contents = String::from_utf8_lossy(&bytes);

    let kvs = engine
        .workload()
        .map(input, &contents)
        .with_context(|| format!("map function failed on {input}"))?;
    debug!("Mapper {mapper} emitted {} pairs", kvs.len());

    for (reducer, partition) in partition(kvs, num_reducers).iter().enumerate() {
        let path = engine
            .work_dir()
            .join(reduce_input_name(engine.job_name(), mapper, reducer as u32));
        let file = File::create(&path)
            .with_context(|| format!("opening mapper output file {} failed", path.display()))?;

        write_records(BufWriter::new(file), partition).with_context(|| {
            format!("failure encoding key-value pairs for reducer {reducer}")
        })?;
    }

    Ok(())
}

/// Split `kvs` into `num_reducers` buckets by key hash, each sorted by key.
///
/// The sort is stable, so pairs with equal keys keep the order the map
/// function produced them in.
pub fn partition(kvs: Vec<KeyValue>, num_reducers: u32) -> Vec<Vec<KeyValue>> {
    let mut partitions = vec![Vec::new(); num_reducers as usize];

    for kv in kvs {
        let reducer = reducer_for(&kv.key, num_reducers) as usize;
        partitions[reducer].push(kv);
    }

    for partition in &mut partitions {
        partition.sort_by(|a, b| a.key.cmp(&b.key));
    }

    partitions
}

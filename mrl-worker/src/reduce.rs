use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::{Context, Result};
use tracing::{debug, info};

use common::codec::{read_records, write_records};
use common::naming::{reduce_input_name, reduce_output_name};
use common::KeyValue;

use crate::Engine;

/// Values seen for each key, in the order they were read.
pub type Groups = BTreeMap<String, Vec<String>>;

/// Add every record to its key's value list.
pub fn group_into<I>(groups: &mut Groups, records: I)
where
    I: IntoIterator<Item = KeyValue>,
{
    for kv in records {
        groups.entry(kv.key).or_default().push(kv.value);
    }
}

/// Read the intermediate files of mappers `0..num_mappers` meant for
/// `reducer` and group their values by key.
///
/// Files are read in mapper order and each file front to back; no merge
/// across files takes place.
pub fn collect_groups(engine: &Engine, reducer: u32, num_mappers: u32) -> Result<Groups> {
    let mut groups = Groups::new();

    for mapper in 0..num_mappers {
        let path = engine
            .work_dir()
            .join(reduce_input_name(engine.job_name(), mapper, reducer));
        let file = File::open(&path)
            .with_context(|| format!("opening reducer input file {} failed", path.display()))?;

        group_into(&mut groups, read_records(BufReader::new(file)));
    }

    Ok(groups)
}

/// Reduce every key owned by `reducer` and write the results to its
/// output file, ordered by key.
pub fn perform_reduce(engine: &Engine, reducer: u32, num_mappers: u32) -> Result<()> {
    info!(
        "REDUCE[{}:{}]: Reducing from {} mappers.",
        engine.job_name(),
        reducer,
        num_mappers
    );

    let groups = collect_groups(engine, reducer, num_mappers)?;
    debug!("Reducer {reducer} has {} distinct keys", groups.len());

    let mut reduced = Vec::with_capacity(groups.len());
    for (key, values) in groups {
        let value = engine
            .workload()
            .reduce(&key, values)
            .with_context(|| format!("reduce function failed on key `{key}`"))?;
        reduced.push(KeyValue { key, value });
    }

    let path = engine
        .work_dir()
        .join(reduce_output_name(engine.job_name(), reducer));
    let file = File::create(&path)
        .with_context(|| format!("opening reducer output file {} failed", path.display()))?;

    write_records(BufWriter::new(file), &reduced).with_context(|| {
        format!("failure encoding key-value pairs for reducer {reducer} output")
    })?;

    Ok(())
}

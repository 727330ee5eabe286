//! Folding the reducers' outputs into one file once a job is done.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::codec::read_records;
use crate::naming::{merge_output_name, reduce_output_name};

/// Merge the outputs of reducers `0..num_reducers` of `job` found in `dir`
/// into a single file sorted by key, one `key: value` line per key.
///
/// Returns the path of the merged file.
pub fn merge_reduce_outputs(dir: &Path, job: &str, num_reducers: u32) -> Result<PathBuf> {
    let mut merged = BTreeMap::new();

    for reducer in 0..num_reducers {
        let path = dir.join(reduce_output_name(job, reducer));
        debug!("Merging {}", path.display());

        let file = File::open(&path)
            .with_context(|| format!("failed to open reduce output {}", path.display()))?;
        for kv in read_records(BufReader::new(file)) {
            merged.insert(kv.key, kv.value);
        }
    }

    let out_path = dir.join(merge_output_name(job));
    let out = File::create(&out_path)
        .with_context(|| format!("failed to create merge output {}", out_path.display()))?;
    let mut out = BufWriter::new(out);
    for (key, value) in &merged {
        writeln!(out, "{key}: {value}")?;
    }
    out.flush()?;

    info!("Merged {} keys into {}", merged.len(), out_path.display());
    Ok(out_path)
}

//! File names shared by every node of a job.
//!
//! A mapper and the reducers that read its output never talk to each
//! other. They only meet through these names, so they are pure functions
//! of the job name and task indices.

/// Intermediate file written by mapper `mapper` for reducer `reducer`.
pub fn reduce_input_name(job: &str, mapper: u32, reducer: u32) -> String {
    format!("mrtmp.{job}-{mapper}-{reducer}")
}

/// Output of reducer `reducer`.
pub fn reduce_output_name(job: &str, reducer: u32) -> String {
    format!("mrtmp.{job}-res-{reducer}")
}

/// The single file holding the merged reduce outputs.
pub fn merge_output_name(job: &str) -> String {
    format!("mrtmp.{job}")
}

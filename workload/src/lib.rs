//! MapReduce applications that ship with the cluster.

use std::sync::Arc;

use common::Workload;

pub mod vertex_degree;
pub mod word_count;

pub use vertex_degree::VertexDegree;
pub use word_count::WordCount;

/// Names accepted by [`try_named`].
pub const NAMES: &[&str] = &["wc", "vertex-degree"];

/// Look up a workload by name.
///
/// The name doubles as the job name, so every node of a job must be
/// started with the same one.
pub fn try_named(name: &str) -> Option<Arc<dyn Workload>> {
    match name {
        "wc" => Some(Arc::new(WordCount::new())),
        "vertex-degree" => Some(Arc::new(VertexDegree)),
        _ => None,
    }
}

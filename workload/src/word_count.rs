//! Counts how often each word appears across all inputs.

use anyhow::Result;
use regex::Regex;

use common::{KeyValue, Workload};

pub struct WordCount {
    words: Regex,
}

impl WordCount {
    pub fn new() -> Self {
        Self {
            words: Regex::new(r"[A-Za-z0-9]+").expect("invalid regex"),
        }
    }
}

impl Default for WordCount {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for WordCount {
    fn map(&self, _key: &str, value: &str) -> Result<Vec<KeyValue>> {
        Ok(self
            .words
            .find_iter(value)
            .map(|w| KeyValue::new(w.as_str().to_lowercase(), "1"))
            .collect())
    }

    fn reduce(&self, _key: &str, values: Vec<String>) -> Result<String> {
        let mut count = 0u64;
        for value in values {
            count += value.parse::<u64>()?;
        }
        Ok(count.to_string())
    }
}

//! A MapReduce-compatible application that computes the
//! degree of each vertex in a graph, given a list of edges.
//!

use anyhow::{anyhow, Result};

use common::{KeyValue, Workload};

pub struct VertexDegree;

fn parse_line(line: &str) -> Result<(u64, u64)> {
    let mut iter = line.split_whitespace().take(2);
    let a = iter
        .next()
        .ok_or_else(|| anyhow!("Invalid input file format"))?
        .parse()?;
    let b = iter
        .next()
        .ok_or_else(|| anyhow!("Invalid input file format"))?
        .parse()?;
    Ok((a, b))
}

impl Workload for VertexDegree {
    fn map(&self, _key: &str, value: &str) -> Result<Vec<KeyValue>> {
        let edges = value
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_line)
            .collect::<Result<Vec<_>>>()?;

        Ok(edges
            .into_iter()
            .flat_map(|(a, b)| {
                [
                    KeyValue::new(a.to_string(), "1"),
                    KeyValue::new(b.to_string(), "1"),
                ]
            })
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

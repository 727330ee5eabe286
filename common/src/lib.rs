//! Shared pieces of a MapReduce cluster. Users implement [`Workload`],
//! a master hands map and reduce tasks to workers, and workers exchange
//! intermediate data through files on a filesystem every node can see.
//!
//! Anything both a master and a worker binary must agree on lives here:
//! the record format, the key hash, the file names and the RPC stubs.

use std::fmt;
use std::fmt::Formatter;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};

pub mod codec;
pub mod merge;
pub mod naming;
pub mod rpc;

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// A map reduce application.
///
/// `map` is called once per input with the input's name and its full
/// contents. `reduce` is called once per distinct intermediate key with
/// every value emitted for that key, and returns a single output value.
///
/// An error from either function is fatal for the worker that hit it.
pub trait Workload: Send + Sync {
    fn map(&self, key: &str, value: &str) -> anyhow::Result<Vec<KeyValue>>;

    fn reduce(&self, key: &str, values: Vec<String>) -> anyhow::Result<String>;
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
///
/// Serialized field names are capitalised so the on-disk records read
/// `{"Key":"..","Value":".."}`.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyValue {
    /// The key.
    pub key: String,

    /// The value.
    pub value: String,
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.value)
    }
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the key of this key-value pair.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the value of this key-value pair.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Hashes an intermediate key. Compute a reduce bucket for a given key
/// by calculating `ihash(key) % n_reduce`.
///
/// This is 64-bit FNV-1a over the key's bytes, masked to 31 bits. It
/// must never change: mappers and reducers built separately rely on it.
pub fn ihash(key: &str) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0x7fff_ffff) as u32
}

/// Most reducers a job may have. A map task holds one partition per
/// reducer in memory and writes one file per reducer.
pub const MAX_REDUCERS: u32 = 1 << 16;

/// The reducer that owns `key` when the job has `num_reducers` reducers.
pub fn reducer_for(key: &str, num_reducers: u32) -> u32 {
    debug_assert!(num_reducers > 0);
    ihash(key) % num_reducers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ihash_is_stable() {
        // FNV-1a 64 of the empty string is the offset basis.
        assert_eq!(ihash(""), (0xcbf2_9ce4_8422_2325u64 & 0x7fff_ffff) as u32);
        assert_eq!(ihash("hello"), ihash("hello"));
        assert_ne!(ihash("hello"), ihash("hellp"));
    }

    #[test]
    fn reducer_for_stays_in_range() {
        for key in ["a", "b", "c", "d", "mapreduce", ""] {
            let r = reducer_for(key, 3);
            assert!(r < 3);
            assert_eq!(r, ihash(key) % 3);
            assert_eq!(r, reducer_for(key, 3));
        }
        assert_eq!(reducer_for("anything", 1), 0);
    }

    #[test]
    fn key_value_serializes_with_capitalised_fields() {
        let kv = KeyValue::new("the", "1");
        let json = serde_json::to_string(&kv).unwrap();
        assert_eq!(json, r#"{"Key":"the","Value":"1"}"#);
        assert_eq!(kv.to_string(), "the 1");
    }
}

//! A persistent, duplicate-key ordered map `key -> [rid]`.

use crate::error::StorageError;
use relix_primitives::Rid;
use relix_sats::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// An index key: integers and floats compare numerically, with NaN
/// sorting greater than every other float (IEEE-754 total order), and
/// strings compare lexicographically by UTF-8 byte order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum IndexKey {
    Int(i32),
    Float(f64),
    Text(String),
}

impl IndexKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(v) => Some(IndexKey::Int(*v)),
            Value::Float(v) => Some(IndexKey::Float(*v)),
            Value::Text(v) => Some(IndexKey::Text(v.clone())),
            Value::Null => None,
        }
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use IndexKey::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            // Keys of an index always share one column's type in practice;
            // cross-variant comparisons only arise in malformed callers, so
            // order by discriminant to keep the map's invariants intact.
            (Int(_), _) => std::cmp::Ordering::Less,
            (_, Int(_)) => std::cmp::Ordering::Greater,
            (Float(_), Text(_)) => std::cmp::Ordering::Less,
            (Text(_), Float(_)) => std::cmp::Ordering::Greater,
        }
    }
}

/// A half-open-range endpoint: `None` acts as the corresponding `±∞`
/// sentinel.
pub type Bound = Option<IndexKey>;

#[derive(Serialize, Deserialize, Default)]
pub struct BTreeIndex {
    map: BTreeMap<IndexKey, Vec<Rid>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `(key, rid)`. A duplicate of the exact same pair is
    /// coalesced (not re-appended); a duplicate key with a distinct rid is
    /// appended in insertion order.
    pub fn insert(&mut self, key: IndexKey, rid: Rid) {
        let rids = self.map.entry(key).or_default();
        if !rids.contains(&rid) {
            rids.push(rid);
        }
    }

    pub fn search(&self, key: &IndexKey) -> Vec<Rid> {
        self.map.get(key).cloned().unwrap_or_default()
    }

    /// Inclusive range scan; `lo`/`hi` of `None` act as `-inf`/`+inf`.
    /// Returns empty when `lo > hi`.
    pub fn range(&self, lo: Bound, hi: Bound) -> Vec<Rid> {
        if let (Some(lo), Some(hi)) = (&lo, &hi) {
            if lo > hi {
                return Vec::new();
            }
        }
        self.map
            .iter()
            .filter(|(k, _)| lo.as_ref().map(|lo| *k >= lo).unwrap_or(true))
            .filter(|(k, _)| hi.as_ref().map(|hi| *k <= hi).unwrap_or(true))
            .flat_map(|(_, rids)| rids.iter().copied())
            .collect()
    }

    /// Removes a single `(key, rid)` entry; a no-op if absent.
    pub fn delete(&mut self, key: &IndexKey, rid: Rid) {
        if let Some(rids) = self.map.get_mut(key) {
            rids.retain(|&r| r != rid);
            if rids.is_empty() {
                self.map.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(self).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        fs::write(path.as_ref(), bytes).map_err(|e| StorageError::io(path.as_ref().display().to_string(), e))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let bytes = fs::read(path.as_ref()).map_err(|e| StorageError::io(path.as_ref().display().to_string(), e))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt(e.to_string()))
    }
}

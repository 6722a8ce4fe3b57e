//! Token-budget partitioning of keyed record collections.
//!
//! Records are never split and never dropped: a record bigger than the whole
//! budget ships alone in its own batch. Sorting by estimated size descending
//! is a first-fit-decreasing bin-pack that keeps batch counts low and avoids
//! pathological tiny trailing batches.

use serde_json::{Map, Value};

/// Fixed chars-per-unit ratio shared by every size estimate in the crate.
const CHARS_PER_UNIT: usize = 4;

/// Estimate the provider-side size of a tree in budget units.
pub fn estimate_units(tree: &Value) -> usize {
    serde_json::to_string(tree).map(|s| s.len()).unwrap_or(0) / CHARS_PER_UNIT
}

/// A contiguous, non-splittable keyed subset of one block's records.
#[derive(Debug, Clone)]
pub struct Batch {
    pub records: Map<String, Value>,
    pub estimated_units: usize,
}

impl Batch {
    fn new() -> Self {
        Self {
            records: Map::new(),
            estimated_units: 0,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Partition `records` into batches whose estimated size stays under
/// `budget_units`.
///
/// Deterministic for a given input and budget: records are ordered by size
/// descending with key order breaking ties, then greedily accumulated. An
/// oversized record forms a singleton batch rather than being split or
/// truncated.
pub fn chunk(records: &Map<String, Value>, budget_units: usize) -> Vec<Batch> {
    let mut sized: Vec<(&String, &Value, usize)> = records
        .iter()
        .map(|(key, value)| (key, value, estimate_units(value)))
        .collect();
    sized.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));

    let mut batches = Vec::new();
    let mut current = Batch::new();

    for (key, value, units) in sized {
        if current.estimated_units + units > budget_units && !current.is_empty() {
            batches.push(std::mem::replace(&mut current, Batch::new()));
        }
        current.records.insert(key.clone(), value.clone());
        current.estimated_units += units;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

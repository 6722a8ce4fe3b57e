//! Source change detection against the previous run's snapshot.
//!
//! The snapshot diff is the only authoritative change signal: a path is
//! considered changed iff it shows up here, never because of timestamps or
//! any other heuristic.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::path::{flatten, Path};

/// Added/changed/removed path sets relative to the snapshot.
///
/// The three sets are pairwise disjoint by construction.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub added: BTreeSet<Path>,
    pub changed: BTreeSet<Path>,
    pub removed: BTreeSet<Path>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// True when `path` is new or carries a new value.
    pub fn is_stale(&self, path: &Path) -> bool {
        self.added.contains(path) || self.changed.contains(path)
    }
}

/// Compare the current source tree against the persisted snapshot.
///
/// `snapshot == None` means first run: every current path is `added`. Runs in
/// O(leaf paths) of the larger tree and has no side effects.
pub fn diff(current: &Value, snapshot: Option<&Value>) -> DiffResult {
    let current_flat = flatten(current);
    let snapshot_flat = match snapshot {
        Some(tree) => flatten(tree),
        None => {
            return DiffResult {
                added: current_flat.into_keys().collect(),
                ..DiffResult::default()
            }
        }
    };

    let mut result = DiffResult::default();
    for (path, value) in &current_flat {
        match snapshot_flat.get(path) {
            None => {
                result.added.insert(path.clone());
            }
            Some(old) if old != value => {
                result.changed.insert(path.clone());
            }
            Some(_) => {}
        }
    }
    for path in snapshot_flat.keys() {
        if !current_flat.contains_key(path) {
            result.removed.insert(path.clone());
        }
    }
    result
}

//! Payload slimming: strip empty and non-translatable content before dispatch.
//!
//! The same filtered form feeds both the size estimate and the actual
//! payload, so the chunker and the dispatcher can never disagree about what
//! a record weighs. Stripping is safe because the structure-preserving merge
//! re-attaches everything that was removed.

use serde_json::{Map, Value};

/// Recursively remove nulls, empty strings, empty containers, and any key in
/// `excluded_keys` (provenance fields the provider must never see).
///
/// Returns `None` when the whole branch filters away.
pub fn filter_empty(tree: &Value, excluded_keys: &[String]) -> Option<Value> {
    match tree {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Object(map) => {
            let mut filtered = Map::new();
            for (key, value) in map {
                if excluded_keys.iter().any(|excluded| excluded == key) {
                    continue;
                }
                if let Some(kept) = filter_empty(value, excluded_keys) {
                    filtered.insert(key.clone(), kept);
                }
            }
            if filtered.is_empty() {
                None
            } else {
                Some(Value::Object(filtered))
            }
        }
        Value::Array(items) => {
            let filtered: Vec<Value> = items
                .iter()
                .filter_map(|item| filter_empty(item, excluded_keys))
                .collect();
            if filtered.is_empty() {
                None
            } else {
                Some(Value::Array(filtered))
            }
        }
        scalar => Some(scalar.clone()),
    }
}

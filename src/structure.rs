//! Target-tree shape reconciliation against the source of truth.

use serde_json::{Map, Value};

/// Reconcile `target`'s shape with `source`.
///
/// At every depth the result's key set is exactly the source's key set:
/// keys missing from the target are copied from the source verbatim
/// (untranslated placeholders), keys absent from the source are dropped,
/// and scalars already present in the target are kept as-is.
///
/// Arrays are atomic payloads: a target array is preserved wholesale when
/// its length matches the source array, otherwise the source array wins and
/// the content reads as untranslated until the next translation pass.
pub fn sync_structure(source: &Value, target: &Value) -> Value {
    match (source, target) {
        (Value::Object(source_map), Value::Object(target_map)) => {
            let mut synced = Map::with_capacity(source_map.len());
            for (key, source_value) in source_map {
                match target_map.get(key) {
                    Some(target_value) => {
                        synced.insert(key.clone(), sync_structure(source_value, target_value));
                    }
                    None => {
                        synced.insert(key.clone(), source_value.clone());
                    }
                }
            }
            Value::Object(synced)
        }
        (Value::Array(source_items), Value::Array(target_items)) => {
            if source_items.len() == target_items.len() {
                Value::Array(target_items.clone())
            } else {
                Value::Array(source_items.clone())
            }
        }
        // Same scalar kind or not: an existing non-container target value is
        // assumed translated (or deliberately identical) and kept; a kind
        // mismatch against a source container falls through to the source.
        (Value::Object(_), _) | (Value::Array(_), _) => source.clone(),
        (_, Value::Object(_)) | (_, Value::Array(_)) => source.clone(),
        (_, scalar) => scalar.clone(),
    }
}

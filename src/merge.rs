//! Structure-preserving merge of provider output into the original tree.

use serde_json::{Map, Value};

/// Deep-merge `candidate` (translated output) into `original`.
///
/// Every key of `original` survives: keys the provider dropped keep their
/// original value (nulls and empties included), which is what makes the
/// empty-value filter reversible — whatever was stripped before dispatch is
/// re-attached here. Arrays are taken from the candidate wholesale; a null
/// candidate scalar keeps the original value so a lazy provider cannot erase
/// content. Keys present only in the candidate are appended.
pub fn merge_preserving_structure(original: &Value, candidate: &Value) -> Value {
    match (original, candidate) {
        (Value::Object(original_map), Value::Object(candidate_map)) => {
            let mut merged = Map::with_capacity(original_map.len());
            for (key, original_value) in original_map {
                match candidate_map.get(key) {
                    Some(candidate_value) => {
                        merged.insert(
                            key.clone(),
                            merge_preserving_structure(original_value, candidate_value),
                        );
                    }
                    None => {
                        merged.insert(key.clone(), original_value.clone());
                    }
                }
            }
            for (key, candidate_value) in candidate_map {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), candidate_value.clone());
                }
            }
            Value::Object(merged)
        }
        (Value::Array(_), Value::Array(candidate_items)) => {
            Value::Array(candidate_items.clone())
        }
        (_, Value::Null) => original.clone(),
        (_, candidate_value) => candidate_value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_translated_values_win() {
        let original = json!({"title": "Hello", "sub": "World"});
        let candidate = json!({"title": "Ciao", "sub": "Mondo"});
        assert_eq!(merge_preserving_structure(&original, &candidate), candidate);
    }

    #[test]
    fn test_dropped_keys_keep_original_values() {
        let original = json!({"title": "Hello", "note": "", "meta": null});
        let candidate = json!({"title": "Ciao"});
        let merged = merge_preserving_structure(&original, &candidate);

        assert_eq!(
            merged,
            json!({"title": "Ciao", "note": "", "meta": null})
        );
    }

    #[test]
    fn test_every_original_key_survives_deeply() {
        let original = json!({
            "a": {"b": "x", "c": {"d": "y", "empty": ""}},
            "keep": null
        });
        let candidate = json!({"a": {"b": "tradotto"}});
        let merged = merge_preserving_structure(&original, &candidate);

        assert_eq!(
            merged,
            json!({
                "a": {"b": "tradotto", "c": {"d": "y", "empty": ""}},
                "keep": null
            })
        );
    }

    #[test]
    fn test_merge_is_idempotent_on_self() {
        let tree = json!({"a": {"b": [1, 2]}, "c": "x", "d": null});
        assert_eq!(merge_preserving_structure(&tree, &tree), tree);
    }

    #[test]
    fn test_candidate_only_keys_are_appended() {
        let original = json!({"a": "x"});
        let candidate = json!({"a": "y", "bonus": "z"});
        let merged = merge_preserving_structure(&original, &candidate);
        assert_eq!(merged, json!({"a": "y", "bonus": "z"}));
    }

    #[test]
    fn test_arrays_are_taken_wholesale() {
        let original = json!({"list": ["one", "two", "three"]});
        let candidate = json!({"list": ["uno", "due"]});
        let merged = merge_preserving_structure(&original, &candidate);
        assert_eq!(merged, json!({"list": ["uno", "due"]}));
    }

    #[test]
    fn test_null_candidate_scalar_keeps_original() {
        let original = json!({"a": "content"});
        let candidate = json!({"a": null});
        let merged = merge_preserving_structure(&original, &candidate);
        assert_eq!(merged, json!({"a": "content"}));
    }

    #[test]
    fn test_container_kind_change_takes_candidate() {
        let original = json!({"a": {"b": "x"}});
        let candidate = json!({"a": "flattened"});
        let merged = merge_preserving_structure(&original, &candidate);
        assert_eq!(merged, json!({"a": "flattened"}));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                "[a-z]{0,6}".prop_map(Value::from),
                any::<i16>().prop_map(Value::from),
                Just(Value::Null),
            ]
        }

        fn tree() -> impl Strategy<Value = Value> {
            leaf().prop_recursive(3, 16, 3, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        fn keys_of(value: &Value) -> Vec<String> {
            match value {
                Value::Object(map) => map.keys().cloned().collect(),
                _ => Vec::new(),
            }
        }

        proptest! {
            #[test]
            fn merge_keeps_every_original_key(o in tree(), c in tree()) {
                let merged = merge_preserving_structure(&o, &c);
                if o.is_object() && c.is_object() {
                    let merged_keys = keys_of(&merged);
                    for key in keys_of(&o) {
                        prop_assert!(merged_keys.contains(&key));
                    }
                }
            }

            #[test]
            fn merge_with_self_is_identity(t in tree()) {
                prop_assert_eq!(merge_preserving_structure(&t, &t), t);
            }
        }
    }
}

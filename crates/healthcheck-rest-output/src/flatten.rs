// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Flattening of nested records into single-level records.
//!
//! Every leaf reachable in the input is keyed by the path of its ancestor
//! keys joined with a separator (`__` by default):
//!
//! ```
//! use healthcheck_rest_output::flatten::flatten;
//! use healthcheck_rest_output::value::{Record, Value};
//!
//! let mut inner = Record::new();
//! inner.insert("b".to_string(), Value::Int(1));
//! inner.insert("c".to_string(), Value::Int(2));
//! let mut record = Record::new();
//! record.insert("a".to_string(), Value::Map(inner));
//!
//! let flat = flatten(&record);
//! assert_eq!(flat["a__b"], Value::Int(1));
//! assert_eq!(flat["a__c"], Value::Int(2));
//! ```
//!
//! Only maps are descended into. Lists and scalars are leaves and are kept
//! as they are. If a key already contains the separator two different paths
//! can produce the same flat key; the later one wins.

use crate::value::{FlatRecord, Record, Value};

pub const DEFAULT_SEPARATOR: &str = "__";

/// Flattens `record` using [`DEFAULT_SEPARATOR`].
pub fn flatten(record: &Record) -> FlatRecord {
    flatten_with_separator(record, DEFAULT_SEPARATOR)
}

/// Flattens `record`, joining ancestor keys with `separator`.
///
/// Traversal keeps its own work stack, so nesting depth is bounded by the
/// heap and not by the call stack.
pub fn flatten_with_separator(record: &Record, separator: &str) -> FlatRecord {
    let mut flat = FlatRecord::new();
    let mut pending: Vec<(Option<String>, &Record)> = vec![(None, record)];

    while let Some((prefix, map)) = pending.pop() {
        for (key, value) in map {
            let path = match &prefix {
                Some(prefix) => format!("{prefix}{separator}{key}"),
                None => key.clone(),
            };
            match value {
                Value::Map(nested) => pending.push((Some(path), nested)),
                leaf => {
                    flat.insert(path, leaf.clone());
                }
            }
        }
    }

    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match Value::from(value) {
            Value::Map(map) => map,
            other => panic!("expected a map, got {other:?}"),
        }
    }

    #[test]
    fn test_flatten_empty() {
        assert!(flatten(&Record::new()).is_empty());
    }

    #[test]
    fn test_flatten_one_level() {
        let flat = flatten(&record(json!({"a": {"b": 1, "c": 2}})));
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["a__b"], Value::Int(1));
        assert_eq!(flat["a__c"], Value::Int(2));
    }

    #[test]
    fn test_flatten_keeps_lists_and_scalars() {
        let flat = flatten(&record(json!({
            "name": "disk",
            "ok": false,
            "checks": [{"nested": {"x": 1}}, 2],
            "info": {"mount": {"path": "/", "free": 0.25}}
        })));

        assert_eq!(flat["name"], Value::from("disk"));
        assert_eq!(flat["ok"], Value::Bool(false));
        assert_eq!(
            flat["checks"],
            Value::from(json!([{"nested": {"x": 1}}, 2]))
        );
        assert_eq!(flat["info__mount__path"], Value::from("/"));
        assert_eq!(flat["info__mount__free"], Value::Float(0.25));
        assert_eq!(flat.len(), 5);
    }

    #[test]
    fn test_flatten_drops_empty_maps() {
        let flat = flatten(&record(json!({"a": {}, "b": {"c": {}}, "d": null})));
        assert_eq!(flat.len(), 1);
        assert_eq!(flat["d"], Value::Null);
    }

    #[test]
    fn test_flatten_custom_separator() {
        let flat = flatten_with_separator(&record(json!({"a": {"b": {"c": 1}}})), ".");
        assert_eq!(flat["a.b.c"], Value::Int(1));
    }

    #[test]
    fn test_flatten_separator_collision_last_write_wins() {
        // "a__b" at the top level and a.b nested produce the same key
        let flat = flatten(&record(json!({"a__b": 1, "a": {"b": 2}})));
        assert_eq!(flat.len(), 1);
        assert!(flat["a__b"] == Value::Int(1) || flat["a__b"] == Value::Int(2));
    }

    #[test]
    fn test_flatten_deep_nesting() {
        const DEPTH: usize = 10_000;

        // Dropping a record this deep recurses, so give the thread room.
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let mut value = Value::Int(42);
                for _ in 0..DEPTH {
                    let mut map = Record::new();
                    map.insert("k".to_string(), value);
                    value = Value::Map(map);
                }
                let Value::Map(root) = value else {
                    panic!("root should be a map");
                };

                let flat = flatten(&root);
                let expected_key = vec!["k"; DEPTH].join(DEFAULT_SEPARATOR);
                assert_eq!(flat.len(), 1);
                assert_eq!(flat[&expected_key], Value::Int(42));
            })
            .expect("failed to spawn thread");
        handle.join().expect("deep flatten panicked");
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            "[a-z ]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Value::List),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        prop::collection::btree_map("[a-z]{1,4}", arb_value(), 0..5)
    }

    fn collect_leaves(record: &Record, path: &[String], out: &mut Vec<(String, Value)>) {
        for (key, value) in record {
            let mut next = path.to_vec();
            next.push(key.clone());
            match value {
                Value::Map(nested) => collect_leaves(nested, &next, out),
                leaf => out.push((next.join("__"), leaf.clone())),
            }
        }
    }

    proptest! {
        #[test]
        fn prop_one_entry_per_leaf(input in arb_record()) {
            let flat = flatten(&input);

            let mut leaves = Vec::new();
            collect_leaves(&input, &[], &mut leaves);

            prop_assert_eq!(flat.len(), leaves.len());
            for (key, value) in leaves {
                prop_assert_eq!(flat.get(&key), Some(&value));
            }
            prop_assert!(flat.values().all(|v| !v.is_map()));
        }
    }
}

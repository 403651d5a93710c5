//! JSON tree helpers
//!
//! Path-addressed reads and writes over a `serde_json::Value` tree, plus the
//! collection ordering used by ordered/limited queries. Shared by the
//! in-memory backend and the streaming client's local cache.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::QuerySpec;

static NULL: Value = Value::Null;

/// Read the value at `segments`, if any
pub fn value_at<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

/// Replace the value at `segments`. `null` deletes the entry.
pub fn set_at(root: &mut Value, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    if value.is_null() {
        if let Some(parent) = parent_mut(root, parents, false) {
            parent.remove(*last);
        }
        prune_empty(root, parents);
        return;
    }

    if let Some(parent) = parent_mut(root, parents, true) {
        parent.insert((*last).to_string(), value);
    }
}

/// Merge `fields` into the object at `segments`.
///
/// Keys may themselves be slash-separated relative paths, matching
/// multi-location updates.
pub fn merge_at(root: &mut Value, segments: &[&str], fields: &Map<String, Value>) {
    for (key, value) in fields {
        let mut path: Vec<&str> = segments.to_vec();
        path.extend(key.split('/').filter(|s| !s.is_empty()));
        set_at(root, &path, value.clone());
    }
}

fn parent_mut<'a>(
    root: &'a mut Value,
    segments: &[&str],
    create: bool,
) -> Option<&'a mut Map<String, Value>> {
    let mut current = root;
    for segment in segments {
        if !current.is_object() {
            if !create {
                return None;
            }
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut()?;
        if !map.contains_key(*segment) {
            if !create {
                return None;
            }
            map.insert((*segment).to_string(), Value::Object(Map::new()));
        }
        current = map.get_mut(*segment)?;
    }
    if !current.is_object() {
        if !create {
            return None;
        }
        *current = Value::Object(Map::new());
    }
    current.as_object_mut()
}

/// Remove objects left empty by a delete, walking back up the path
fn prune_empty(root: &mut Value, segments: &[&str]) {
    for depth in (1..=segments.len()).rev() {
        let (last, parents) = match segments[..depth].split_last() {
            Some(split) => split,
            None => return,
        };
        let Some(parent) = parent_mut(root, parents, false) else {
            return;
        };
        let empty = parent
            .get(*last)
            .map(|v| v.as_object().map(|m| m.is_empty()).unwrap_or(false))
            .unwrap_or(false);
        if !empty {
            return;
        }
        parent.remove(*last);
    }
}

/// Treat `null` and `{}` as an absent path
pub fn normalize(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(v) => Some(v.clone()),
    }
}

/// Order children the way the realtime database orders a collection.
///
/// With an ordering child: missing/null first, then booleans, numbers,
/// strings and objects, ties broken by key. Without one: by key.
pub fn ordered_children<'a>(value: &'a Value, query: &QuerySpec) -> Vec<(&'a str, &'a Value)> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };

    let mut children: Vec<(&str, &Value)> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();

    match &query.order_by_child {
        Some(child) => children.sort_by(|(ka, va), (kb, vb)| {
            let a = va.get(child.as_str()).unwrap_or(&NULL);
            let b = vb.get(child.as_str()).unwrap_or(&NULL);
            compare_values(a, b).then_with(|| compare_keys(ka, kb))
        }),
        None => children.sort_by(|(ka, _), (kb, _)| compare_keys(ka, kb)),
    }

    children
}

/// Apply ordering and `limit_to_last` to a collection value
pub fn apply_query(value: Value, query: &QuerySpec) -> Value {
    let Some(limit) = query.limit_to_last else {
        return value;
    };
    if !value.is_object() {
        return value;
    }

    let ordered = ordered_children(&value, query);
    let skip = ordered.len().saturating_sub(limit);
    let kept: Map<String, Value> = ordered
        .into_iter()
        .skip(skip)
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    Value::Object(kept)
}

/// Integer-like keys sort numerically before all other keys
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) | Value::Object(_) => 4,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_read_nested() {
        let mut root = Value::Null;
        set_at(&mut root, &["readings", "current"], json!({"tds": 120}));
        assert_eq!(
            value_at(&root, &["readings", "current", "tds"]),
            Some(&json!(120))
        );
    }

    #[test]
    fn test_delete_prunes_empty_parents() {
        let mut root = json!({"notifications": {"latest": {"message": "hi"}}, "system": {}});
        set_at(&mut root, &["notifications", "latest"], Value::Null);
        assert!(value_at(&root, &["notifications"]).is_none());
        assert!(value_at(&root, &["system"]).is_some());
    }

    #[test]
    fn test_merge_keeps_siblings() {
        let mut root = json!({"system": {"online": true, "expectedFlowRate": 5.0}});
        let fields = json!({"expectedFlowRate": 7.5, "lastUpdate": 10});
        merge_at(&mut root, &["system"], fields.as_object().unwrap());
        assert_eq!(
            root,
            json!({"system": {"online": true, "expectedFlowRate": 7.5, "lastUpdate": 10}})
        );
    }

    #[test]
    fn test_merge_accepts_relative_paths() {
        let mut root = json!({});
        let fields = json!({"a/b": 1});
        merge_at(&mut root, &[], fields.as_object().unwrap());
        assert_eq!(root, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_normalize_absent() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some(&Value::Null)), None);
        assert_eq!(normalize(Some(&json!({}))), None);
        assert_eq!(normalize(Some(&json!(0))), Some(json!(0)));
    }

    #[test]
    fn test_ordered_by_child_with_key_tiebreak() {
        let value = json!({
            "k1": {"timestamp": 100},
            "k2": {"timestamp": 300},
            "k3": {"timestamp": 200},
            "k0": {"timestamp": 200},
        });
        let query = QuerySpec::all().order_by_child("timestamp");
        let keys: Vec<&str> = ordered_children(&value, &query)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["k1", "k0", "k3", "k2"]);
    }

    #[test]
    fn test_missing_order_child_sorts_first() {
        let value = json!({"a": {"timestamp": 5}, "b": {}});
        let query = QuerySpec::all().order_by_child("timestamp");
        let keys: Vec<&str> = ordered_children(&value, &query)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_key_ordering_numeric_first() {
        let value = json!({"10": 1, "9": 1, "abc": 1, "-Nx": 1});
        let keys: Vec<&str> = ordered_children(&value, &QuerySpec::all())
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["9", "10", "-Nx", "abc"]);
    }

    #[test]
    fn test_limit_to_last_keeps_newest() {
        let value = json!({
            "a": {"timestamp": 1},
            "b": {"timestamp": 4},
            "c": {"timestamp": 3},
            "d": {"timestamp": 2},
        });
        let query = QuerySpec::all().order_by_child("timestamp").limit_to_last(2);
        let limited = apply_query(value, &query);
        let map = limited.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("b"));
        assert!(map.contains_key("c"));
    }
}

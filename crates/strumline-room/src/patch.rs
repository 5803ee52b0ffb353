//! Minimal JSON patches between two state snapshots.
//!
//! A patch is an object holding only what changed. Nested objects are
//! diffed recursively, any other changed value is replaced whole, and a
//! key that disappeared is sent as `null`. Snapshots never contain `null`
//! values themselves, so the encoding is unambiguous.

use serde_json::{Map, Value};

/// The patch turning `old` into `new`, or `None` if they are equal.
pub fn diff(old: &Value, new: &Value) -> Option<Value> {
    if old == new {
        return None;
    }
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();
            for (key, new_value) in new {
                match old.get(key) {
                    Some(old_value) => {
                        if let Some(changed) = diff(old_value, new_value) {
                            patch.insert(key.clone(), changed);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old.keys() {
                if !new.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Some(Value::Object(patch))
        }
        _ => Some(new.clone()),
    }
}

/// Applies a patch produced by [`diff`] in place.
pub fn apply_patch(target: &mut Value, patch: &Value) {
    let Value::Object(changes) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(fields) = target else {
        return;
    };
    for (key, change) in changes {
        if change.is_null() {
            fields.remove(key);
            continue;
        }
        match fields.get_mut(key) {
            Some(existing) if existing.is_object() && change.is_object() => {
                apply_patch(existing, change);
            }
            _ => {
                fields.insert(key.clone(), change.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_equal_is_none() {
        let state = json!({"a": 1, "b": {"c": [1, 2]}});
        assert_eq!(diff(&state, &state.clone()), None);
    }

    #[test]
    fn test_diff_only_changed_leaves() {
        let old = json!({"health": 1.0, "players": {"1": {"score": 0, "name": "a"}}});
        let new = json!({"health": 0.9525, "players": {"1": {"score": 0, "name": "a"}}});
        assert_eq!(diff(&old, &new), Some(json!({"health": 0.9525})));
    }

    #[test]
    fn test_diff_nested_object() {
        let old = json!({"players": {"1": {"score": 0, "misses": 0}}});
        let new = json!({"players": {"1": {"score": 350, "misses": 0}}});
        assert_eq!(
            diff(&old, &new),
            Some(json!({"players": {"1": {"score": 350}}}))
        );
    }

    #[test]
    fn test_diff_removed_key_is_null() {
        let old = json!({"owner": 1, "players": {"1": {}, "2": {}}});
        let new = json!({"players": {"2": {}}});
        assert_eq!(
            diff(&old, &new),
            Some(json!({"owner": null, "players": {"1": null}}))
        );
    }

    #[test]
    fn test_diff_arrays_replaced_whole() {
        let old = json!({"arrowColors": [1, 2, 3, 4]});
        let new = json!({"arrowColors": [1, 2, 3, 5]});
        assert_eq!(diff(&old, &new), Some(json!({"arrowColors": [1, 2, 3, 5]})));
    }

    #[test]
    fn test_apply_patch_reproduces_new_state() {
        let old = json!({
            "owner": 1,
            "phase": "Forming",
            "players": {"1": {"name": "a", "ready": false}, "2": {"name": "b"}},
            "settings": {}
        });
        let new = json!({
            "phase": "AwaitingChart",
            "players": {"2": {"name": "b", "country": "PL"}},
            "settings": {"scrollspeed": "2"}
        });

        let patch = diff(&old, &new).unwrap();
        let mut replica = old.clone();
        apply_patch(&mut replica, &patch);
        assert_eq!(replica, new);
    }
}

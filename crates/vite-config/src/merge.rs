//! Deep merge of raw config objects.
//!
//! One total function used everywhere a partial config is folded onto an
//! accumulated one: plugin `config` hook results, and inline options layered
//! over a file-loaded config. It never fails; malformed shapes fall back to
//! override-replaces-base.

use serde_json::Value;

/// Merge `override_` onto `base`, returning a new value.
///
/// Rules:
/// - keys missing from the override, or overridden with null, keep the base
///   value;
/// - two arrays concatenate, base elements first, duplicates retained;
/// - two objects merge recursively;
/// - at the root only, `alias` and `assetsInclude` get list-concatenation
///   handling even when one side is not already a list;
/// - anything else: override replaces base.
pub fn merge_config(base: &Value, override_: &Value) -> Value {
    merge_values(base, override_, true)
}

fn merge_values(base: &Value, override_: &Value, is_root: bool) -> Value {
    let (Value::Object(base_map), Value::Object(override_map)) = (base, override_) else {
        // Non-object merge roots degrade to replacement semantics.
        return if override_.is_null() {
            base.clone()
        } else {
            override_.clone()
        };
    };

    let mut merged = base_map.clone();

    for (key, value) in override_map {
        if value.is_null() {
            continue;
        }

        let existing = match base_map.get(key) {
            Some(v) if !v.is_null() => v,
            _ => {
                merged.insert(key.clone(), value.clone());
                continue;
            }
        };

        // Root-only special keys, handled ahead of the generic rules.
        if is_root && (key == "alias" || key == "assetsInclude") {
            merged.insert(key.clone(), concat_as_lists(existing, value));
            continue;
        }

        let next = match (existing, value) {
            (Value::Array(a), Value::Array(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Value::Array(out)
            }
            (Value::Object(_), Value::Object(_)) => merge_values(existing, value, false),
            _ => value.clone(),
        };
        merged.insert(key.clone(), next);
    }

    Value::Object(merged)
}

/// Coerce both sides to lists and concatenate, base first.
fn concat_as_lists(base: &Value, override_: &Value) -> Value {
    let mut out = to_list(base);
    out.extend(to_list(override_));
    Value::Array(out)
}

fn to_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_concatenate() {
        let merged = merge_config(&json!({ "a": [1] }), &json!({ "a": [2] }));
        assert_eq!(merged, json!({ "a": [1, 2] }));
    }

    #[test]
    fn scalars_replace() {
        let merged = merge_config(&json!({ "a": 1 }), &json!({ "a": 2 }));
        assert_eq!(merged, json!({ "a": 2 }));
    }

    #[test]
    fn nullish_override_is_ignored() {
        let merged = merge_config(&json!({ "a": 1 }), &json!({ "a": null }));
        assert_eq!(merged, json!({ "a": 1 }));
    }

    #[test]
    fn objects_merge_recursively() {
        let merged = merge_config(
            &json!({ "build": { "minify": true, "target": "es2020" } }),
            &json!({ "build": { "target": "esnext" } }),
        );
        assert_eq!(
            merged,
            json!({ "build": { "minify": true, "target": "esnext" } })
        );
    }

    #[test]
    fn assets_include_coerces_scalars_to_lists() {
        let merged = merge_config(
            &json!({ "assetsInclude": "**/*.gltf" }),
            &json!({ "assetsInclude": ["**/*.glb"] }),
        );
        assert_eq!(merged, json!({ "assetsInclude": ["**/*.gltf", "**/*.glb"] }));
    }

    #[test]
    fn alias_special_casing_is_root_only() {
        // A nested `alias` key is ordinary data and follows the generic rule.
        let merged = merge_config(
            &json!({ "resolve": { "alias": { "a": "1" } } }),
            &json!({ "resolve": { "alias": { "b": "2" } } }),
        );
        assert_eq!(
            merged,
            json!({ "resolve": { "alias": { "a": "1", "b": "2" } } })
        );
    }

    #[test]
    fn root_alias_concatenates_base_first() {
        let merged = merge_config(
            &json!({ "alias": [{ "find": "a", "replacement": "1" }] }),
            &json!({ "alias": [{ "find": "a", "replacement": "2" }] }),
        );
        // Duplicates retained; earlier (base) entries keep first-match priority.
        assert_eq!(
            merged,
            json!({ "alias": [
                { "find": "a", "replacement": "1" },
                { "find": "a", "replacement": "2" }
            ]})
        );
    }

    #[test]
    fn merge_is_total_on_mismatched_shapes() {
        let merged = merge_config(&json!({ "a": [1] }), &json!({ "a": { "b": 1 } }));
        assert_eq!(merged, json!({ "a": { "b": 1 } }));

        let merged = merge_config(&json!(42), &json!({ "a": 1 }));
        assert_eq!(merged, json!({ "a": 1 }));
    }
}

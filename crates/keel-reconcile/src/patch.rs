//! JSON merge patches computed from snapshots
//!
//! Patches are `f(original, mutated)`: only fields that differ from the
//! snapshot taken at the start of the pass are sent, so concurrent writers
//! of unrelated fields are not clobbered.

use serde::Serialize;
use serde_json::{Map, Value};

/// RFC 7386 merge patch turning `original` into `modified`.
///
/// Returns `None` when the two are equal.
pub fn merge_diff(original: &Value, modified: &Value) -> Option<Value> {
    match (original, modified) {
        (Value::Object(before), Value::Object(after)) => {
            let mut patch = Map::new();
            for (key, new) in after {
                match before.get(key) {
                    Some(old) => {
                        if let Some(diff) = merge_diff(old, new) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), new.clone());
                    }
                }
            }
            for key in before.keys() {
                if !after.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        _ if original == modified => None,
        _ => Some(modified.clone()),
    }
}

/// Merge patch for the top-level `field` of two snapshots
fn field_patch<K: Serialize>(
    field: &str,
    original: &K,
    mutated: &K,
) -> Result<Option<Value>, keel_common::Error> {
    let before = serde_json::to_value(original)?;
    let after = serde_json::to_value(mutated)?;
    let before = before.get(field).unwrap_or(&Value::Null);
    let after = after.get(field).unwrap_or(&Value::Null);

    Ok(merge_diff(before, after).map(|diff| {
        let mut patch = Map::new();
        patch.insert(field.to_string(), diff);
        Value::Object(patch)
    }))
}

/// Patch touching only `status`
pub fn status_patch<K: Serialize>(
    original: &K,
    mutated: &K,
) -> Result<Option<Value>, keel_common::Error> {
    field_patch("status", original, mutated)
}

/// Patch touching only `metadata` (finalizers, labels, annotations)
pub fn metadata_patch<K: Serialize>(
    original: &K,
    mutated: &K,
) -> Result<Option<Value>, keel_common::Error> {
    field_patch("metadata", original, mutated)
}

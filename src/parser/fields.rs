use serde_json::Value;

use crate::sites::FieldPath;

/// Follow `path` through nested mappings.
pub fn resolve_path<'a>(obj: &'a Value, path: FieldPath) -> Option<&'a Value> {
    path.iter().try_fold(obj, |current, key| current.as_object()?.get(*key))
}

/// First path resolving to something other than null, `""` or `[]`.
pub fn extract_field<'a>(obj: &'a Value, paths: &[FieldPath]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| resolve_path(obj, *path))
        .find(|value| !is_blank(value))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Every mapping in `root`, depth-first: a mapping, then its nested
/// mappings and sequences.
pub fn iter_dicts(root: &Value) -> impl Iterator<Item = &Value> {
    let mut stack = vec![root];
    std::iter::from_fn(move || {
        while let Some(current) = stack.pop() {
            match current {
                Value::Object(map) => {
                    stack.extend(map.values().filter(|v| v.is_object() || v.is_array()));
                    return Some(current);
                }
                Value::Array(items) => {
                    stack.extend(items.iter().filter(|v| v.is_object() || v.is_array()));
                }
                _ => {}
            }
        }
        None
    })
}

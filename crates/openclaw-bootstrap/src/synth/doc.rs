use serde_json::{Map, Value, json};

/// Dotted-path lookup into a JSON object tree.
pub fn value_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(root);
    }
    let mut cur = root;
    for seg in path.split('.') {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

pub fn str_path<'a>(root: &'a Value, path: &str) -> Option<&'a str> {
    value_path(root, path).and_then(Value::as_str)
}

/// Walk (creating objects as needed) to the object at a dotted path. A
/// non-object value already sitting on the path is replaced; synthesis owns
/// the recognized sections and a scalar there means a previous invalid write.
pub fn ensure_object_mut<'a>(root: &'a mut Value, path: &str) -> &'a mut Map<String, Value> {
    if !root.is_object() {
        *root = json!({});
    }
    let mut cur = root;
    for seg in path.trim().split('.').filter(|s| !s.is_empty()) {
        let map = cur.as_object_mut().expect("object ensured above");
        let slot = map.entry(seg.to_string()).or_insert_with(|| json!({}));
        if !slot.is_object() {
            *slot = json!({});
        }
        cur = slot;
    }
    cur.as_object_mut().expect("object ensured above")
}

/// Set a single value at a dotted path, creating intermediate objects.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let (parent, key) = match path.rsplit_once('.') {
        Some((p, k)) => (p, k),
        None => ("", path),
    };
    ensure_object_mut(root, parent).insert(key.to_string(), value);
}

/// Remove a key at a dotted path; missing intermediates are a no-op.
pub fn remove_path(root: &mut Value, path: &str) {
    let (parent, key) = match path.rsplit_once('.') {
        Some((p, k)) => (p, k),
        None => ("", path),
    };
    let mut cur = match root.as_object_mut() {
        Some(m) => m,
        None => return,
    };
    if !parent.is_empty() {
        for seg in parent.split('.') {
            cur = match cur.get_mut(seg).and_then(Value::as_object_mut) {
                Some(m) => m,
                None => return,
            };
        }
    }
    cur.remove(key);
}

/// Deep merge: objects merge key-by-key, everything else is replaced by the
/// overlay. Mirrors how imported config fragments combine.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay_val) => {
            *base_slot = overlay_val;
        }
    }
}

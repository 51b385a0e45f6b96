//! Identity generation for entities and steps

use std::collections::HashSet;

use serde_json::Value;

/// A `<prefix>-<4 digits>` id
pub fn random_id(prefix: &str) -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 10_000;
    format!("{}-{:04}", prefix, n)
}

/// Random draws before falling back to the first free number
const MAX_DRAWS: usize = 1_000;

/// A `<prefix>-<4 digits>` id not contained in `taken`; the new id is added to it
///
/// Once random draws keep colliding, the lowest free number is used, which
/// grows past four digits when all of them are taken.
pub fn unique_id(prefix: &str, taken: &mut HashSet<String>) -> String {
    for _ in 0..MAX_DRAWS {
        let id = random_id(prefix);
        if taken.insert(id.clone()) {
            return id;
        }
    }

    let mut n: u64 = 0;
    loop {
        let id = format!("{}-{:04}", prefix, n);
        if taken.insert(id.clone()) {
            return id;
        }
        n += 1;
    }
}

/// Collect every string `id` field found anywhere inside `value`
pub fn collect_ids(value: &Value, out: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("id") {
                out.insert(id.clone());
            }
            map.values().for_each(|v| collect_ids(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_ids(v, out)),
        _ => {}
    }
}

/// Replace every string `id` field inside `value` with a fresh id
///
/// The prefix of each new id is the key under which the owning object
/// sits (`log` for `{"log": {"id": ...}}`), or `root_prefix` for the
/// top-level object. Fresh ids never collide with `taken`.
pub fn regenerate_ids(value: &mut Value, root_prefix: &str, taken: &mut HashSet<String>) {
    regenerate(value, root_prefix, taken);
}

fn regenerate(value: &mut Value, prefix: &str, taken: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            if matches!(map.get("id"), Some(Value::String(_))) {
                map.insert("id".to_string(), Value::String(unique_id(prefix, taken)));
            }
            for (key, child) in map.iter_mut() {
                if key != "id" {
                    regenerate(child, key, taken);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| regenerate(v, prefix, taken)),
        _ => {}
    }
}

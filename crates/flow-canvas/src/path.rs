//! Dotted path addressing into flow definitions
//!
//! A path such as `route.from.steps.2.choice.when.0.steps.0.log` locates a
//! value inside an entity definition. Numeric segments index arrays, every
//! other segment is an object key. Bracket indices (`steps[2]`) are
//! accepted and normalized to the dotted form.

use serde_json::{Map, Value};

use crate::error::{CanvasError, Result};

/// Split a path into its segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split(['.', '[', ']'])
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalize bracket notation to dotted notation
pub fn normalize(path: &str) -> String {
    segments(path).join(".")
}

/// Append a segment to a path
pub fn join(path: &str, segment: impl std::fmt::Display) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

/// Everything before the last segment
pub fn parent(path: &str) -> Option<String> {
    let segs = segments(path);
    if segs.len() < 2 {
        return None;
    }
    Some(segs[..segs.len() - 1].join("."))
}

/// The last segment of a path
pub fn last_segment(path: &str) -> Option<&str> {
    segments(path).last().copied()
}

fn index_of(segment: &str) -> Option<usize> {
    segment.parse::<usize>().ok()
}

/// Resolve a path against a value
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).into_iter().try_fold(root, |current, seg| match current {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => index_of(seg).and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Resolve a path against a value (mutable)
pub fn get_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    segments(path).into_iter().try_fold(root, |current, seg| match current {
        Value::Object(map) => map.get_mut(seg),
        Value::Array(items) => index_of(seg).and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Set the value at a path, creating intermediate objects and arrays
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let segs = segments(path);
    let Some((last, init)) = segs.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for (i, seg) in init.iter().enumerate() {
        let next_is_index = index_of(segs[i + 1]).is_some();
        current = child_or_insert(current, seg, next_is_index, path)?;
    }

    match current {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let idx = index_of(last)
                .ok_or_else(|| CanvasError::invalid_path(path, "non-numeric index into array"))?;
            if idx < items.len() {
                items[idx] = value;
            } else if idx == items.len() {
                items.push(value);
            } else {
                return Err(CanvasError::invalid_path(path, "index out of bounds"));
            }
            Ok(())
        }
        Value::Null => {
            let mut map = Map::new();
            map.insert((*last).to_string(), value);
            *current = Value::Object(map);
            Ok(())
        }
        _ => Err(CanvasError::invalid_path(path, "cannot set a field on a scalar")),
    }
}

fn child_or_insert<'a>(
    current: &'a mut Value,
    seg: &str,
    next_is_index: bool,
    path: &str,
) -> Result<&'a mut Value> {
    let empty = || {
        if next_is_index {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        }
    };

    if current.is_null() {
        *current = Value::Object(Map::new());
    }

    match current {
        Value::Object(map) => {
            let child = map.entry(seg.to_string()).or_insert_with(empty);
            if child.is_null() {
                *child = empty();
            }
            Ok(child)
        }
        Value::Array(items) => {
            let idx = index_of(seg)
                .ok_or_else(|| CanvasError::invalid_path(path, "non-numeric index into array"))?;
            if idx == items.len() {
                items.push(empty());
            }
            items
                .get_mut(idx)
                .ok_or_else(|| CanvasError::invalid_path(path, "index out of bounds"))
        }
        _ => Err(CanvasError::invalid_path(path, "cannot descend into a scalar")),
    }
}

/// Where a step lives relative to its container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepLocation {
    /// An element of an array. `wrapper` is the key of the single-key object
    /// that wraps the step (`steps.2.log`), `None` for plain elements
    /// (`when.0`).
    ArrayElement {
        array_path: String,
        index: usize,
        wrapper: Option<String>,
    },
    /// A named property of an object (`choice.otherwise`, `route.from`)
    Property { object_path: String, key: String },
}

impl StepLocation {
    /// Classify a step path
    pub fn of(path: &str) -> Result<Self> {
        let segs = segments(path);
        match segs.as_slice() {
            [] | [_] => Err(CanvasError::invalid_path(path, "path has no container")),
            [init @ .., last] if index_of(last).is_some() => Ok(Self::ArrayElement {
                array_path: init.join("."),
                index: index_of(last).unwrap_or_default(),
                wrapper: None,
            }),
            [init @ .., idx, key] if index_of(idx).is_some() && !init.is_empty() => {
                Ok(Self::ArrayElement {
                    array_path: init.join("."),
                    index: index_of(idx).unwrap_or_default(),
                    wrapper: Some((*key).to_string()),
                })
            }
            [init @ .., key] => Ok(Self::Property {
                object_path: init.join("."),
                key: (*key).to_string(),
            }),
        }
    }
}

/// Insert a value into the array at `array_path`, creating the array if needed
pub fn insert_into_array(root: &mut Value, array_path: &str, index: usize, value: Value) -> Result<()> {
    if get(root, array_path).map_or(true, Value::is_null) {
        set(root, array_path, Value::Array(Vec::new()))?;
    }
    let Some(Value::Array(items)) = get_mut(root, array_path) else {
        return Err(CanvasError::invalid_path(array_path, "not an array"));
    };
    let index = index.min(items.len());
    items.insert(index, value);
    Ok(())
}

/// Remove the value at `path`, returning it
pub fn remove(root: &mut Value, path: &str) -> Result<Value> {
    match StepLocation::of(path)? {
        StepLocation::ArrayElement {
            array_path, index, ..
        } => match get_mut(root, &array_path) {
            Some(Value::Array(items)) if index < items.len() => Ok(items.remove(index)),
            _ => Err(CanvasError::UnresolvedReference(path.to_string())),
        },
        StepLocation::Property { object_path, key } => match get_mut(root, &object_path) {
            Some(Value::Object(map)) => map
                .remove(&key)
                .ok_or_else(|| CanvasError::UnresolvedReference(path.to_string())),
            _ => Err(CanvasError::UnresolvedReference(path.to_string())),
        },
    }
}

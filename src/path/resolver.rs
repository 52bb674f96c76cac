//! Reads and writes through a [`FieldPath`].
//!
//! Reads never fail: a missing intermediate, an out-of-range index or a
//! predicate without a match all resolve to `None`. Writes first check the
//! whole path without touching the record, then walk it again creating empty
//! objects under `Name` segments as needed, and hand the final location to a
//! pluggable terminal write. A write that fails to resolve changes nothing.

use super::error::{PathError, PathResult};
use super::expression::{FieldPath, Segment};
use serde_json::{Map, Value};

/// The location a write path ends at.
#[derive(Debug)]
pub enum Terminal<'a> {
    /// A member of an object
    Field {
        map: &'a mut Map<String, Value>,
        key: String,
    },
    /// An existing element of an array
    Element {
        items: &'a mut Vec<Value>,
        index: usize,
    },
}

impl Terminal<'_> {
    /// Value currently stored at the location, if any
    pub fn current(&self) -> Option<&Value> {
        match self {
            Terminal::Field { map, key } => map.get(key.as_str()),
            Terminal::Element { items, index } => items.get(*index),
        }
    }

    pub fn assign(self, value: Value) {
        match self {
            Terminal::Field { map, key } => {
                map.insert(key, value);
            }
            Terminal::Element { items, index } => items[index] = value,
        }
    }

    /// Removes the key, or splices the element out of its array.
    pub fn remove(self) -> Option<Value> {
        match self {
            Terminal::Field { map, key } => map.remove(key.as_str()),
            Terminal::Element { items, index } => Some(items.remove(index)),
        }
    }
}

enum Cursor<'a> {
    Map(&'a mut Map<String, Value>),
    Items(&'a mut Vec<Value>),
}

/// Read-only counterpart of [`Cursor`]. `Map(None)` stands for an object the
/// write would have to create.
enum View<'a> {
    Map(Option<&'a Map<String, Value>>),
    Items(&'a Vec<Value>),
}

/// Reads the value addressed by `path`.
pub fn get<'a>(root: &'a Map<String, Value>, path: &FieldPath) -> Option<&'a Value> {
    let mut segments = path.segments().iter();
    let first = segments.next()?.as_name()?;
    let mut current = root.get(first)?;
    for segment in segments {
        current = step(current, segment)?;
    }
    Some(current)
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match segment {
        Segment::Name(name) => value.as_object()?.get(name),
        Segment::Index(index) => value.as_array()?.get(*index),
        Segment::Predicate { key, value: expected } => value
            .as_array()?
            .iter()
            .find(|item| element_matches(item, key, expected)),
    }
}

/// Assigns `value` at `path`.
pub fn set(root: &mut Map<String, Value>, path: &FieldPath, value: Value) -> PathResult<()> {
    set_with(root, path, |terminal| {
        terminal.assign(value);
        Ok::<(), PathError>(())
    })
}

/// Walks to the location addressed by `path` and runs `write` on it.
pub fn set_with<T, E, F>(root: &mut Map<String, Value>, path: &FieldPath, write: F) -> Result<T, E>
where
    F: FnOnce(Terminal<'_>) -> Result<T, E>,
    E: From<PathError>,
{
    let terminal = locate(root, path)?;
    write(terminal)
}

/// Removes the value addressed by `path`. Array elements are spliced out.
///
/// Removing something that is not there leaves the record untouched.
pub fn remove(root: &mut Map<String, Value>, path: &FieldPath) -> PathResult<Option<Value>> {
    if get(root, path).is_none() {
        return Ok(None);
    }
    set_with(root, path, |terminal| Ok(terminal.remove()))
}

/// Resolves the write location for `path`.
pub fn locate<'a>(root: &'a mut Map<String, Value>, path: &FieldPath) -> PathResult<Terminal<'a>> {
    let segments = path.segments();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| PathError::parse(path.raw(), "path is empty"))?;
    check_writable(root, parents, last, path)?;

    let mut cursor = Cursor::Map(root);
    for (position, segment) in parents.iter().enumerate() {
        let next = &segments[position + 1];
        let child = enter(cursor, segment, next.is_selector(), path)?;
        cursor = container(child, next, path)?;
    }
    terminal(cursor, last, path)
}

/// Runs the same walk as [`locate`] without creating anything, so that every
/// resolution error surfaces before the record is modified.
fn check_writable(
    root: &Map<String, Value>,
    parents: &[Segment],
    last: &Segment,
    path: &FieldPath,
) -> PathResult<()> {
    let segments = path.segments();
    let mut view = View::Map(Some(root));
    for (position, segment) in parents.iter().enumerate() {
        let next = &segments[position + 1];
        let child: Option<&Value> = match (view, segment) {
            (View::Map(map), Segment::Name(key)) => {
                let child = map.and_then(|map| map.get(key.as_str()));
                if next.is_selector() && child.map_or(true, Value::is_null) {
                    return Err(PathError::not_found(path.raw()));
                }
                child
            }
            (View::Items(items), Segment::Index(index)) => Some(
                items
                    .get(*index)
                    .ok_or_else(|| PathError::index_out_of_range(path.raw(), *index, items.len()))?,
            ),
            (View::Items(items), Segment::Predicate { key, value }) => Some(
                items
                    .iter()
                    .find(|item| element_matches(item, key, value))
                    .ok_or_else(|| PathError::not_found(path.raw()))?,
            ),
            (View::Map(_), _) => return Err(PathError::type_mismatch(path.raw(), "array")),
            (View::Items(_), _) => return Err(PathError::type_mismatch(path.raw(), "object")),
        };
        view = match (child, next.is_selector()) {
            (Some(Value::Array(items)), true) => View::Items(items),
            (_, true) => return Err(PathError::type_mismatch(path.raw(), "array")),
            (None | Some(Value::Null), false) => View::Map(None),
            (Some(Value::Object(map)), false) => View::Map(Some(map)),
            (Some(_), false) => return Err(PathError::type_mismatch(path.raw(), "object")),
        };
    }

    match (view, last) {
        (View::Map(_), Segment::Name(_)) => Ok(()),
        (View::Items(items), Segment::Index(index)) if *index < items.len() => Ok(()),
        (View::Items(items), Segment::Index(index)) => Err(PathError::index_out_of_range(
            path.raw(),
            *index,
            items.len(),
        )),
        (View::Items(items), Segment::Predicate { key, value }) => {
            find_element(items, key, value)
                .map(|_| ())
                .ok_or_else(|| PathError::not_found(path.raw()))
        }
        (View::Map(_), _) => Err(PathError::type_mismatch(path.raw(), "array")),
        (View::Items(_), _) => Err(PathError::type_mismatch(path.raw(), "object")),
    }
}

fn enter<'a>(
    cursor: Cursor<'a>,
    segment: &Segment,
    next_is_selector: bool,
    path: &FieldPath,
) -> PathResult<&'a mut Value> {
    match (cursor, segment) {
        (Cursor::Map(map), Segment::Name(key)) => {
            if next_is_selector {
                map.get_mut(key.as_str())
                    .filter(|child| !child.is_null())
                    .ok_or_else(|| PathError::not_found(path.raw()))
            } else {
                Ok(map.entry(key.clone()).or_insert(Value::Null))
            }
        }
        (Cursor::Items(items), Segment::Index(index)) => {
            let len = items.len();
            items
                .get_mut(*index)
                .ok_or_else(|| PathError::index_out_of_range(path.raw(), *index, len))
        }
        (Cursor::Items(items), Segment::Predicate { key, value }) => {
            let position = find_element(items, key, value)
                .ok_or_else(|| PathError::not_found(path.raw()))?;
            Ok(&mut items[position])
        }
        (Cursor::Map(_), _) => Err(PathError::type_mismatch(path.raw(), "array")),
        (Cursor::Items(_), _) => Err(PathError::type_mismatch(path.raw(), "object")),
    }
}

fn container<'a>(value: &'a mut Value, next: &Segment, path: &FieldPath) -> PathResult<Cursor<'a>> {
    if next.is_selector() {
        return match value {
            Value::Array(items) => Ok(Cursor::Items(items)),
            _ => Err(PathError::type_mismatch(path.raw(), "array")),
        };
    }

    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => Ok(Cursor::Map(map)),
        _ => Err(PathError::type_mismatch(path.raw(), "object")),
    }
}

fn terminal<'a>(cursor: Cursor<'a>, last: &Segment, path: &FieldPath) -> PathResult<Terminal<'a>> {
    match (cursor, last) {
        (Cursor::Map(map), Segment::Name(key)) => Ok(Terminal::Field {
            map,
            key: key.clone(),
        }),
        (Cursor::Items(items), Segment::Index(index)) => {
            if *index >= items.len() {
                return Err(PathError::index_out_of_range(
                    path.raw(),
                    *index,
                    items.len(),
                ));
            }
            Ok(Terminal::Element {
                items,
                index: *index,
            })
        }
        (Cursor::Items(items), Segment::Predicate { key, value }) => {
            let index =
                find_element(items, key, value).ok_or_else(|| PathError::not_found(path.raw()))?;
            Ok(Terminal::Element { items, index })
        }
        (Cursor::Map(_), _) => Err(PathError::type_mismatch(path.raw(), "array")),
        (Cursor::Items(_), _) => Err(PathError::type_mismatch(path.raw(), "object")),
    }
}

fn find_element(items: &[Value], key: &str, expected: &str) -> Option<usize> {
    items
        .iter()
        .position(|item| element_matches(item, key, expected))
}

fn element_matches(item: &Value, key: &str, expected: &str) -> bool {
    item.get(key).is_some_and(|actual| loose_eq(actual, expected))
}

/// String form used for loose comparisons: `15`, `15.0` and `"15"` all read
/// as `15`.
pub fn loose_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => {
            if number.is_f64() {
                match number.as_f64() {
                    Some(float) if float.is_finite() && float.fract() == 0.0 && float.abs() < 1e15 => {
                        format!("{}", float as i64)
                    }
                    _ => number.to_string(),
                }
            } else {
                number.to_string()
            }
        }
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Loose equality between a stored value and a textual operand.
pub fn loose_eq(value: &Value, text: &str) -> bool {
    loose_text(value) == text
}

/// Loose equality between two JSON values.
pub fn loose_values_eq(left: &Value, right: &Value) -> bool {
    left == right || loose_text(left) == loose_text(right)
}

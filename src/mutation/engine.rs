use super::error::{MutationError, MutationResult};
use super::{UnknownFieldPolicy, UpdateMode};
use crate::constants::ID_FIELD;
use crate::path::{self, loose_text, loose_values_eq, FieldPath};
use crate::schema::{Operation, PropType, RecordSchema, ResolvedType};
use crate::Record;
use log::{debug, warn};
use serde_json::{Map, Number, Value};

/// Outcome of applying a patch to one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationReport {
    /// Patch keys that were applied
    pub applied: Vec<String>,
    /// Patch keys left out (unresolvable, key field, virtual relation or
    /// excluded from updates)
    pub skipped: Vec<String>,
}

/// Applies every `key → operand` pair of `patch` to `record`.
///
/// Keys are paths resolved against `schema`. Pairs are applied in patch
/// order; the first error stops the mutation with earlier pairs already
/// written.
pub fn mutate_record(
    record: &mut Record,
    schema: &RecordSchema,
    patch: &Record,
    mode: UpdateMode,
    policy: UnknownFieldPolicy,
) -> MutationResult<MutationReport> {
    let mut report = MutationReport::default();

    for (key, operand) in patch {
        let path = schema.path(key)?;
        if path.root_name() == ID_FIELD {
            debug!("Ignoring patch of key field on '{}'", schema.name());
            report.skipped.push(key.clone());
            continue;
        }
        if schema.field(path.root_name()).is_some_and(|field| field.is_virtual()) {
            warn!(
                "'{}.{}' is resolved from the related model and cannot be patched",
                schema.name(),
                key
            );
            report.skipped.push(key.clone());
            continue;
        }
        if schema
            .field(path.root_name())
            .is_some_and(|field| field.excluded_from(Operation::Update))
        {
            warn!("'{}.{}' is excluded from updates", schema.name(), key);
            report.skipped.push(key.clone());
            continue;
        }

        let resolved = match schema.resolve(&path) {
            Some(resolved) => resolved,
            None => match policy {
                UnknownFieldPolicy::Skip => {
                    warn!("Skipping '{}': not declared on '{}'", key, schema.name());
                    report.skipped.push(key.clone());
                    continue;
                }
                UnknownFieldPolicy::Reject => {
                    return Err(MutationError::unknown_field(schema.name(), key.clone()))
                }
            },
        };

        apply(record, &path, operand.clone(), mode, resolved)?;
        report.applied.push(key.clone());
    }

    Ok(report)
}

/// Applies one operand at `path` using `mode`, dispatching on `resolved`.
pub fn apply(
    record: &mut Record,
    path: &FieldPath,
    operand: Value,
    mode: UpdateMode,
    resolved: ResolvedType,
) -> MutationResult<()> {
    match mode {
        UpdateMode::Cover => cover(record, path, operand),
        UpdateMode::Append => append(record, path, operand, resolved),
        UpdateMode::Delete => delete(record, path, operand, resolved),
        UpdateMode::Merge => merge(record, path, operand, resolved),
    }
}

fn cover(record: &mut Record, path: &FieldPath, operand: Value) -> MutationResult<()> {
    path::set(record, path, operand)?;
    Ok(())
}

fn append(
    record: &mut Record,
    path: &FieldPath,
    operand: Value,
    resolved: ResolvedType,
) -> MutationResult<()> {
    if resolved.is_array_like() {
        let mut items = current_array(record, path)?;
        match operand {
            Value::Array(more) => items.extend(more),
            single => items.push(single),
        }
        return cover(record, path, Value::Array(items));
    }

    match resolved.prop_type {
        prop_type if prop_type.is_text() => {
            let mut text = match path::get(record, path) {
                None | Some(Value::Null) => String::new(),
                Some(current) => loose_text(current),
            };
            match operand {
                Value::Null => {}
                Value::String(more) => text.push_str(&more),
                other => text.push_str(&loose_text(&other)),
            }
            cover(record, path, Value::String(text))
        }
        PropType::Number | PropType::Decimal => {
            let addend = as_number(&operand)
                .ok_or_else(|| MutationError::invalid_value(path.raw(), "operand is not a number"))?;
            let current = match path::get(record, path) {
                None | Some(Value::Null) => Number::from(0),
                Some(current) => as_number(current).ok_or_else(|| {
                    MutationError::invalid_value(path.raw(), "stored value is not a number")
                })?,
            };
            let sum = add_numbers(&current, &addend)
                .ok_or_else(|| MutationError::invalid_value(path.raw(), "sum is not a finite number"))?;
            cover(record, path, Value::Number(sum))
        }
        PropType::Object => {
            debug!("Append on object '{}' has no effect", path);
            Ok(())
        }
        _ => cover(record, path, operand),
    }
}

fn delete(
    record: &mut Record,
    path: &FieldPath,
    operand: Value,
    resolved: ResolvedType,
) -> MutationResult<()> {
    if path.ends_with_selector() {
        path::remove(record, path)?;
        return Ok(());
    }

    if resolved.is_array_like() {
        if let Some(Value::Array(items)) = path::get(record, path) {
            if let Some(position) = items.iter().position(|item| loose_values_eq(item, &operand)) {
                let mut items = items.clone();
                items.remove(position);
                return cover(record, path, Value::Array(items));
            }
        }
        return Ok(());
    }

    match resolved.prop_type {
        prop_type if prop_type.is_text() => cover(record, path, Value::String(String::new())),
        PropType::Number | PropType::Decimal => cover(record, path, Value::from(0)),
        _ => {
            path::remove(record, path)?;
            Ok(())
        }
    }
}

fn merge(
    record: &mut Record,
    path: &FieldPath,
    operand: Value,
    resolved: ResolvedType,
) -> MutationResult<()> {
    if resolved.prop_type != PropType::Object || resolved.array_of {
        warn!(
            "Merge is only supported on objects; '{}' is {}",
            path, resolved.prop_type
        );
        return Ok(());
    }

    let incoming = match operand {
        Value::Object(incoming) => incoming,
        _ => {
            return Err(MutationError::invalid_value(
                path.raw(),
                "merge operand must be an object",
            ))
        }
    };

    let mut merged = match path::get(record, path) {
        Some(Value::Object(current)) => current.clone(),
        _ => Map::new(),
    };
    for (key, value) in incoming {
        merged.insert(key, value);
    }
    cover(record, path, Value::Object(merged))
}

fn current_array(record: &Record, path: &FieldPath) -> MutationResult<Vec<Value>> {
    match path::get(record, path) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(MutationError::invalid_value(
            path.raw(),
            "stored value is not an array",
        )),
    }
}

/// Numbers and numeric strings.
fn as_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(number) => Some(number.clone()),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .map(Number::from)
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(Number::from_f64))
        }
        _ => None,
    }
}

fn add_numbers(left: &Number, right: &Number) -> Option<Number> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Some(Number::from(sum));
        }
    }
    Number::from_f64(left.as_f64()? + right.as_f64()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelOptions, SchemaRegistry};
    use serde_json::json;

    fn schema() -> std::sync::Arc<RecordSchema> {
        SchemaRegistry::builder()
            .define(
                "user",
                json!({
                    "name": "String",
                    "bio": "LongStr",
                    "age": "Number",
                    "tags": ["String"],
                    "raw": "Array",
                    "meta": "Object",
                    "active": "Boolean",
                    "items": [{ "num": "Number", "name": "String", "info": "Object" }]
                }),
                ModelOptions::default(),
            )
            .build()
            .unwrap()
            .get("user")
            .unwrap()
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    fn run(record: &mut Record, patch: Value, mode: UpdateMode) -> MutationResult<MutationReport> {
        mutate_record(record, &schema(), &self::record(patch), mode, UnknownFieldPolicy::Skip)
    }

    #[test]
    fn test_cover_replaces_and_reaches_inside() {
        let mut r = record(json!({ "meta": { "a": 1, "b": 2 }, "name": "x" }));
        run(&mut r, json!({ "meta.a": 5 }), UpdateMode::Cover).unwrap();
        assert_eq!(r["meta"], json!({ "a": 5, "b": 2 }));
        run(&mut r, json!({ "meta": { "c": 3 } }), UpdateMode::Cover).unwrap();
        assert_eq!(r["meta"], json!({ "c": 3 }));
    }

    #[test]
    fn test_append_by_type() {
        let mut r = record(json!({ "name": "ab", "age": 10, "tags": ["a"] }));
        run(
            &mut r,
            json!({ "name": "cd", "age": "5", "tags": "b", "raw": [1, 2] }),
            UpdateMode::Append,
        )
        .unwrap();
        assert_eq!(r["name"], json!("abcd"));
        assert_eq!(r["age"], json!(15));
        assert_eq!(r["tags"], json!(["a", "b"]));
        assert_eq!(r["raw"], json!([1, 2]));

        run(&mut r, json!({ "tags": ["c", "d"], "bio": 7 }), UpdateMode::Append).unwrap();
        assert_eq!(r["tags"], json!(["a", "b", "c", "d"]));
        assert_eq!(r["bio"], json!("7"));

        run(&mut r, json!({ "active": true }), UpdateMode::Append).unwrap();
        assert_eq!(r["active"], json!(true));
    }

    #[test]
    fn test_append_number_rejects_non_numeric() {
        let mut r = record(json!({ "age": 1 }));
        let err = run(&mut r, json!({ "age": "lots" }), UpdateMode::Append).unwrap_err();
        assert!(matches!(err, MutationError::InvalidValue { .. }));
        assert_eq!(r["age"], json!(1));
    }

    #[test]
    fn test_append_on_object_is_noop() {
        let mut r = record(json!({ "meta": { "a": 1 } }));
        run(&mut r, json!({ "meta": { "b": 2 } }), UpdateMode::Append).unwrap();
        assert_eq!(r["meta"], json!({ "a": 1 }));
    }

    #[test]
    fn test_delete_by_type() {
        let mut r = record(json!({
            "name": "x", "age": 4, "tags": ["a", "b", "a"], "meta": { "k": 1 },
            "items": [{ "num": 1 }, { "num": 2 }]
        }));
        run(
            &mut r,
            json!({ "name": null, "age": null, "tags": "a", "meta": null, "items[0]": null }),
            UpdateMode::Delete,
        )
        .unwrap();
        assert_eq!(r["name"], json!(""));
        assert_eq!(r["age"], json!(0));
        assert_eq!(r["tags"], json!(["b", "a"]));
        assert!(!r.contains_key("meta"));
        assert_eq!(r["items"], json!([{ "num": 2 }]));

        run(&mut r, json!({ "tags": "zzz" }), UpdateMode::Delete).unwrap();
        assert_eq!(r["tags"], json!(["b", "a"]));
    }

    #[test]
    fn test_merge_objects() {
        let mut r = record(json!({ "meta": { "a": 1, "b": { "x": 1 } }, "items": [{ "num": 15 }] }));
        run(&mut r, json!({ "meta": { "b": { "y": 2 }, "c": 3 } }), UpdateMode::Merge).unwrap();
        assert_eq!(r["meta"], json!({ "a": 1, "b": { "y": 2 }, "c": 3 }));

        run(&mut r, json!({ "items[{num:15}]": { "name": "n" } }), UpdateMode::Merge).unwrap();
        assert_eq!(r["items"], json!([{ "num": 15, "name": "n" }]));

        run(&mut r, json!({ "items[0].info": { "z": 1 } }), UpdateMode::Merge).unwrap();
        assert_eq!(r["items"][0]["info"], json!({ "z": 1 }));

        let err = run(&mut r, json!({ "meta": 4 }), UpdateMode::Merge).unwrap_err();
        assert!(matches!(err, MutationError::InvalidValue { .. }));

        run(&mut r, json!({ "name": { "a": 1 } }), UpdateMode::Merge).unwrap();
        assert!(!r.contains_key("name"));
    }

    #[test]
    fn test_unknown_keys_follow_policy() {
        let schema = schema();
        let mut r = record(json!({ "name": "x" }));
        let patch = record(json!({ "ghost": 1, "name": "y", "id": 9 }));

        let report = mutate_record(&mut r, &schema, &patch, UpdateMode::Cover, UnknownFieldPolicy::Skip).unwrap();
        assert_eq!(report.applied, vec!["name"]);
        assert_eq!(report.skipped, vec!["ghost", "id"]);
        assert!(!r.contains_key("ghost"));
        assert!(!r.contains_key("id"));

        let err = mutate_record(&mut r, &schema, &patch, UpdateMode::Cover, UnknownFieldPolicy::Reject)
            .unwrap_err();
        assert_eq!(err, MutationError::unknown_field("user", "ghost"));
    }

    #[test]
    fn test_update_exclusion_is_enforced() {
        let schema = SchemaRegistry::builder()
            .define(
                "account",
                json!({
                    "name": "String",
                    "balance": { "type": "Number", "excludes": "update" }
                }),
                ModelOptions::default(),
            )
            .build()
            .unwrap()
            .get("account")
            .unwrap();
        let mut r = record(json!({ "name": "x", "balance": 10 }));
        let patch = record(json!({ "balance": 99, "name": "y" }));

        let report = mutate_record(&mut r, &schema, &patch, UpdateMode::Cover, UnknownFieldPolicy::Reject).unwrap();
        assert_eq!(report.applied, vec!["name"]);
        assert_eq!(report.skipped, vec!["balance"]);
        assert_eq!(r["balance"], json!(10));
        assert_eq!(r["name"], json!("y"));
    }

    #[test]
    fn test_predicate_write_miss_fails() {
        let mut r = record(json!({ "items": [{ "num": 1 }] }));
        let err = run(&mut r, json!({ "items[{num:7}].name": "x" }), UpdateMode::Cover).unwrap_err();
        assert!(matches!(err, MutationError::Path(crate::path::PathError::PathNotFound { .. })));
    }
}

//! Record shaping shared by both stores: create defaults, timestamps, hooks,
//! updates and projection.

use super::error::{AdapterError, AdapterResult};
use super::SaveOptions;
use crate::constants::{CREATED_AT, EPOCH_RFC3339, ID_FIELD, UPDATED_AT};
use crate::mutation::{mutate_record, MutationReport};
use crate::query::QuerySpec;
use crate::schema::{FieldDescriptor, HookEvent, Operation, PropType, RecordSchema};
use crate::Record;
use chrono::{SecondsFormat, Utc};
use log::debug;
use serde_json::Value;

/// Current time as stored in `createdAt`/`updatedAt`.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Builds the record written by a create.
///
/// Keeps declared fields, fills defaults, drops everything else, stamps the
/// timestamps and runs the `before` create hooks.
pub fn prepare_create(schema: &RecordSchema, mut values: Record, now: &str) -> Record {
    let mut record = Record::new();
    if let Some(id) = values.remove(ID_FIELD).filter(|id| !id.is_null()) {
        record.insert(ID_FIELD.to_string(), id);
    }

    for (name, field) in schema.stored_fields() {
        let provided = values
            .remove(name)
            .filter(|_| !field.excluded_from(Operation::Create));
        if let Some(value) = provided.or_else(|| default_value(field)) {
            record.insert(name.to_string(), value);
        }
    }

    if schema.timestamps() {
        for key in [CREATED_AT, UPDATED_AT] {
            let stamp = values
                .remove(key)
                .filter(Value::is_string)
                .unwrap_or_else(|| Value::String(now.to_string()));
            record.insert(key.to_string(), stamp);
        }
    }

    for key in values.keys() {
        debug!("Dropping '{}' from new '{}' record: not a stored field", key, schema.name());
    }

    schema.options().hooks.run_before(HookEvent::Create, &mut record);
    record
}

/// Declared default; otherwise `[]` for lists and the epoch for dates.
pub fn default_value(field: &FieldDescriptor) -> Option<Value> {
    if let Some(default) = &field.default {
        return Some(default.clone());
    }
    if field.array_of {
        return Some(Value::Array(Vec::new()));
    }
    if field.prop_type() == PropType::DateTime {
        return Some(Value::String(EPOCH_RFC3339.to_string()));
    }
    None
}

/// Applies a patch to a fetched record, touches `updatedAt` and runs the
/// `before` update hooks.
pub fn apply_update(
    schema: &RecordSchema,
    record: &mut Record,
    patch: &Record,
    options: &SaveOptions,
    now: &str,
) -> AdapterResult<MutationReport> {
    let report = mutate_record(record, schema, patch, options.upd_mode, options.unknown_fields)?;
    if schema.timestamps() {
        record.insert(UPDATED_AT.to_string(), Value::String(now.to_string()));
    }
    schema.options().hooks.run_before(HookEvent::Update, record);
    Ok(report)
}

/// Columns a read returns: the caller's list, or the schema's select columns.
pub fn select_columns(schema: &RecordSchema, spec: &QuerySpec) -> Vec<String> {
    spec.select_columns
        .clone()
        .unwrap_or_else(|| schema.columns_for(Operation::Select))
}

/// Keeps only `columns`, in column order.
pub fn project(mut record: Record, columns: &[String]) -> Record {
    let mut projected = Record::new();
    for column in columns {
        if let Some(value) = record.remove(column) {
            projected.insert(column.clone(), value);
        }
    }
    projected
}

/// Recency scopes compare against `createdAt`, which only timestamped models
/// carry.
pub fn check_scope(schema: &RecordSchema, spec: &QuerySpec) -> AdapterResult<()> {
    if spec.scope.is_some() && !schema.timestamps() {
        return Err(AdapterError::invalid_query(
            schema.name(),
            "scope needs a model registered with timestamps",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelHooks, ModelOptions, SchemaRegistry};
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_prepare_create_applies_defaults_and_drops_unknown() {
        let hooks = ModelHooks::new().before(HookEvent::Save, |record| {
            record.insert("slug".to_string(), json!("set-by-hook"));
        });
        let registry = SchemaRegistry::builder()
            .define(
                "post",
                json!({
                    "title": "String",
                    "slug": "String",
                    "views": { "type": "Number", "default": 0 },
                    "tags": ["String"],
                    "publishedAt": "DateTime",
                    "secret": { "type": "String", "excludes": "create" }
                }),
                ModelOptions {
                    timestamps: true,
                    hooks,
                },
            )
            .build()
            .unwrap();
        let schema = registry.get("post").unwrap();

        let created = prepare_create(
            &schema,
            record(json!({ "title": "hi", "bogus": 1, "secret": "x" })),
            "2024-01-01T00:00:00.000Z",
        );

        assert_eq!(
            Value::Object(created),
            json!({
                "title": "hi",
                "slug": "set-by-hook",
                "views": 0,
                "tags": [],
                "publishedAt": "1970-01-01T00:00:00Z",
                "createdAt": "2024-01-01T00:00:00.000Z",
                "updatedAt": "2024-01-01T00:00:00.000Z"
            })
        );
    }

    #[test]
    fn test_project_keeps_column_order() {
        let projected = project(
            record(json!({ "b": 2, "a": 1, "c": 3 })),
            &["a".to_string(), "b".to_string(), "z".to_string()],
        );
        assert_eq!(Value::Object(projected), json!({ "a": 1, "b": 2 }));
    }
}

//! Parsing of model definitions written as JSON.
//!
//! A field descriptor is one of:
//! - a type tag: `"String"`
//! - a one-element array for a list: `["Id"]`, `[{ "type": "Id", "ref": "organ" }]`
//! - an object whose `type` is a type tag, with optional `ref`, `belong`,
//!   `excludes`, `default`, `index` and `arrayOf`
//! - any other object, describing a nested record

use super::error::{SchemaError, SchemaResult};
use super::hooks::ModelOptions;
use super::types::{FieldDescriptor, Operation, PropType, RecordSchema};
use crate::constants::{ID_FIELD, MODEL_NAME_MARKER};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parses the `fields` object of a model into ordered descriptors.
pub fn parse_fields(schema: &str, fields: &Value) -> SchemaResult<Vec<(String, FieldDescriptor)>> {
    let map = fields.as_object().ok_or_else(|| {
        SchemaError::invalid_descriptor(schema, "", "model fields must be a JSON object")
    })?;

    let mut parsed = Vec::with_capacity(map.len());
    for (name, raw) in map {
        if name == MODEL_NAME_MARKER {
            continue;
        }
        if name == ID_FIELD {
            debug!("Ignoring declared '{}' on '{}': the key field is implicit", name, schema);
            continue;
        }
        parsed.push((name.clone(), parse_descriptor(schema, name, raw)?));
    }
    Ok(parsed)
}

/// Parses a single field descriptor.
pub fn parse_descriptor(schema: &str, field: &str, raw: &Value) -> SchemaResult<FieldDescriptor> {
    match raw {
        Value::String(tag) => Ok(FieldDescriptor::scalar(parse_tag(schema, field, tag)?)),
        Value::Array(items) => {
            if items.len() != 1 {
                return Err(SchemaError::invalid_descriptor(
                    schema,
                    field,
                    "list descriptor must hold exactly one element descriptor",
                ));
            }
            if items[0].is_array() {
                return Err(SchemaError::invalid_descriptor(
                    schema,
                    field,
                    "nested list descriptors are not supported",
                ));
            }
            let mut descriptor = parse_descriptor(schema, field, &items[0])?;
            if descriptor.array_of {
                return Err(SchemaError::invalid_descriptor(
                    schema,
                    field,
                    "nested list descriptors are not supported",
                ));
            }
            descriptor.array_of = true;
            Ok(descriptor)
        }
        Value::Object(map) => match map.get("type") {
            Some(Value::String(tag)) if tag.parse::<PropType>().is_ok() => {
                parse_typed_object(schema, field, tag, map)
            }
            _ => {
                let nested_name = format!("{}.{}", schema, field);
                let fields = parse_fields(&nested_name, raw)?;
                Ok(FieldDescriptor::nested(RecordSchema::new(
                    nested_name,
                    fields,
                    ModelOptions::default(),
                )))
            }
        },
        _ => Err(SchemaError::invalid_descriptor(
            schema,
            field,
            "expected a type tag, an object or a one-element list",
        )),
    }
}

fn parse_tag(schema: &str, field: &str, tag: &str) -> SchemaResult<PropType> {
    tag.parse::<PropType>()
        .map_err(|reason| SchemaError::invalid_descriptor(schema, field, reason))
}

fn parse_typed_object(
    schema: &str,
    field: &str,
    tag: &str,
    map: &Map<String, Value>,
) -> SchemaResult<FieldDescriptor> {
    let mut descriptor = FieldDescriptor::scalar(parse_tag(schema, field, tag)?);
    let invalid = |reason: &str| SchemaError::invalid_descriptor(schema, field, reason);

    for (key, value) in map {
        match key.as_str() {
            "type" => {}
            "ref" => {
                let target = value.as_str().ok_or_else(|| invalid("'ref' must be a string"))?;
                descriptor.ref_to = Some(target.to_string());
            }
            "belong" => {
                descriptor.belong =
                    Some(value.as_bool().ok_or_else(|| invalid("'belong' must be a boolean"))?);
            }
            "index" => {
                descriptor.index = value.as_bool().ok_or_else(|| invalid("'index' must be a boolean"))?;
            }
            "arrayOf" => {
                descriptor.array_of =
                    value.as_bool().ok_or_else(|| invalid("'arrayOf' must be a boolean"))?;
            }
            "default" => descriptor.default = Some(value.clone()),
            "excludes" => {
                let names: Vec<&str> = match value {
                    Value::String(name) => vec![name.as_str()],
                    Value::Array(items) => items
                        .iter()
                        .map(|item| item.as_str().ok_or_else(|| invalid("'excludes' entries must be strings")))
                        .collect::<SchemaResult<_>>()?,
                    _ => return Err(invalid("'excludes' must be a string or a list of strings")),
                };
                for name in names {
                    let operation = name
                        .parse::<Operation>()
                        .map_err(|reason| SchemaError::invalid_descriptor(schema, field, reason))?;
                    descriptor.excludes.insert(operation);
                }
            }
            other => debug!("Ignoring descriptor key '{}' on '{}.{}'", other, schema, field),
        }
    }
    Ok(descriptor)
}

/// One model in a definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub fields: Value,
    #[serde(default)]
    pub timestamps: bool,
}

/// Definition file format: `{ "models": [ { "name", "fields", "timestamps" } ] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelFile {
    pub models: Vec<ModelDefinition>,
}

impl ModelFile {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_all_descriptor_forms() {
        let fields = parse_fields(
            "user",
            &json!({
                "__modelName": "user",
                "name": "String",
                "organs": [{ "type": "Id", "ref": "organ" }],
                "tags": ["String"],
                "secret": { "type": "String", "excludes": ["select"], "default": "" },
                "address": { "city": "String", "type": "Object" },
                "profile": { "nick": "String", "level": { "type": "Number", "index": true } }
            }),
        )
        .unwrap();

        let names: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["name", "organs", "tags", "secret", "address", "profile"]);

        let organs = &fields[1].1;
        assert!(organs.array_of);
        assert_eq!(organs.ref_to.as_deref(), Some("organ"));
        assert_eq!(organs.prop_type(), PropType::Id);

        let secret = &fields[3].1;
        assert!(secret.excluded_from(Operation::Select));
        assert_eq!(secret.default, Some(json!("")));

        // `type: Object` is a valid tag, so this is a typed descriptor
        assert!(fields[4].1.nested_schema().is_none());

        let profile = fields[5].1.nested_schema().unwrap();
        assert_eq!(profile.name(), "user.profile");
        assert!(profile.field("level").unwrap().index);
    }

    #[test]
    fn test_parse_rejects_bad_descriptors() {
        for bad in [
            json!({ "a": "Blob" }),
            json!({ "a": 3 }),
            json!({ "a": ["String", "Number"] }),
            json!({ "a": [["String"]] }),
            json!({ "a": { "type": "Id", "ref": 4 } }),
            json!({ "a": { "type": "String", "excludes": ["drop"] } }),
        ] {
            assert!(
                matches!(parse_fields("m", &bad), Err(SchemaError::InvalidDescriptor { .. })),
                "expected rejection of {}",
                bad
            );
        }
    }

    #[test]
    fn test_model_file_parses() {
        let file = ModelFile::from_json(
            r#"{ "models": [ { "name": "user", "fields": { "name": "String" }, "timestamps": true } ] }"#,
        )
        .unwrap();
        assert_eq!(file.models.len(), 1);
        assert!(file.models[0].timestamps);
    }
}

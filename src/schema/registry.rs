//! Two-phase model registration.
//!
//! `SchemaRegistryBuilder::define` only collects definitions. `build` parses
//! them, then resolves every `ref` against the full set so that models may
//! reference each other regardless of definition order.

use super::error::{SchemaError, SchemaResult};
use super::hooks::ModelOptions;
use super::parsing::{parse_fields, ModelFile};
use super::types::{FieldDescriptor, FieldKind, RecordSchema};
use log::info;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Which side of a relation a field sits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationSide {
    /// Related keys are stored in this record
    Owning,
    /// Related records are found through `back_reference` in the target
    Referenced { back_reference: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub field: String,
    pub target: String,
    pub many: bool,
    pub side: RelationSide,
}

#[derive(Default)]
pub struct SchemaRegistryBuilder {
    definitions: Vec<(String, Value, ModelOptions)>,
}

impl SchemaRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(mut self, name: impl Into<String>, fields: Value, options: ModelOptions) -> Self {
        self.definitions.push((name.into(), fields, options));
        self
    }

    /// Adds every model of a definition file.
    pub fn define_file(mut self, file: ModelFile) -> Self {
        for model in file.models {
            let options = ModelOptions {
                timestamps: model.timestamps,
                ..ModelOptions::default()
            };
            self = self.define(model.name, model.fields, options);
        }
        self
    }

    pub fn build(self) -> SchemaResult<SchemaRegistry> {
        let mut order = Vec::with_capacity(self.definitions.len());
        let mut schemas = HashMap::new();

        for (name, fields, options) in self.definitions {
            if schemas.contains_key(&name) {
                return Err(SchemaError::duplicate(name));
            }
            let parsed = parse_fields(&name, &fields)?;
            let schema = RecordSchema::new(name.clone(), parsed, options);
            for (field_name, field) in schema.fields() {
                reject_nested_refs(schema.name(), field_name, field)?;
            }
            order.push(name.clone());
            schemas.insert(name, Arc::new(schema));
        }

        let mut relations = HashMap::new();
        for name in &order {
            let schema = &schemas[name];
            let mut resolved = Vec::new();
            for (field_name, field) in schema.relation_fields() {
                resolved.push(resolve_relation(&schemas, schema, field_name, field)?);
            }
            relations.insert(name.clone(), resolved);
        }

        info!("Registered {} schemas", order.len());
        Ok(SchemaRegistry {
            order,
            schemas,
            relations,
        })
    }
}

fn reject_nested_refs(schema: &str, field_name: &str, field: &FieldDescriptor) -> SchemaResult<()> {
    if let FieldKind::Nested(nested) = &field.kind {
        for (inner_name, inner) in nested.fields() {
            if inner.is_relation() {
                return Err(SchemaError::invalid_descriptor(
                    schema,
                    format!("{}.{}", field_name, inner_name),
                    "relations are only allowed on top-level fields",
                ));
            }
            reject_nested_refs(schema, &format!("{}.{}", field_name, inner_name), inner)?;
        }
    }
    Ok(())
}

fn resolve_relation(
    schemas: &HashMap<String, Arc<RecordSchema>>,
    schema: &RecordSchema,
    field_name: &str,
    field: &FieldDescriptor,
) -> SchemaResult<Relation> {
    let target_name = field.ref_to.clone().unwrap_or_default();
    let target = schemas
        .get(&target_name)
        .ok_or_else(|| SchemaError::missing_target(schema.name(), field_name, &target_name))?;

    let side = if field.is_owning() {
        RelationSide::Owning
    } else {
        let back_reference = target
            .fields()
            .find(|(_, candidate)| {
                candidate.is_owning() && candidate.ref_to.as_deref() == Some(schema.name())
            })
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| {
                SchemaError::missing_back_reference(schema.name(), field_name, &target_name)
            })?;
        RelationSide::Referenced { back_reference }
    };

    Ok(Relation {
        field: field_name.to_string(),
        target: target_name,
        many: field.array_of,
        side,
    })
}

/// Immutable set of registered models, shared with adapters through `Arc`.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    order: Vec<String>,
    schemas: HashMap<String, Arc<RecordSchema>>,
    relations: HashMap<String, Vec<Relation>>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> SchemaResult<Arc<RecordSchema>> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::unknown(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Model names in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn relations(&self, schema: &str) -> &[Relation] {
        self.relations.get(schema).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn relation(&self, schema: &str, field: &str) -> Option<&Relation> {
        self.relations(schema).iter().find(|relation| relation.field == field)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_resolves_both_relation_sides() {
        let registry = SchemaRegistry::builder()
            .define(
                "user",
                json!({ "name": "String", "organs": [{ "type": "Id", "ref": "organ" }] }),
                ModelOptions::default(),
            )
            .define(
                "organ",
                json!({
                    "name": "String",
                    "users": [{ "type": "Id", "ref": "user", "belong": false }]
                }),
                ModelOptions::default(),
            )
            .build()
            .unwrap();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["user", "organ"]);
        let owning = registry.relation("user", "organs").unwrap();
        assert_eq!(owning.side, RelationSide::Owning);
        assert!(owning.many);

        let referenced = registry.relation("organ", "users").unwrap();
        assert_eq!(
            referenced.side,
            RelationSide::Referenced {
                back_reference: "organs".to_string()
            }
        );
        assert!(registry.get("organ").unwrap().field("users").unwrap().is_virtual());
    }

    #[test]
    fn test_build_fails_fast() {
        let err = SchemaRegistry::builder()
            .define("a", json!({ "b": { "type": "Id", "ref": "b" } }), ModelOptions::default())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::missing_target("a", "b", "b"));

        let err = SchemaRegistry::builder()
            .define("a", json!({ "bs": [{ "type": "Id", "ref": "b", "belong": false }] }), ModelOptions::default())
            .define("b", json!({ "name": "String" }), ModelOptions::default())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::missing_back_reference("a", "bs", "b"));

        let err = SchemaRegistry::builder()
            .define("a", json!({}), ModelOptions::default())
            .define("a", json!({}), ModelOptions::default())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::duplicate("a"));

        let err = SchemaRegistry::builder()
            .define("a", json!({ "inner": { "x": { "type": "Id", "ref": "a" } } }), ModelOptions::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_unknown_schema_lookup() {
        let registry = SchemaRegistry::default();
        assert_eq!(registry.get("ghost").unwrap_err(), SchemaError::unknown("ghost"));
        assert!(registry.relations("ghost").is_empty());
    }
}

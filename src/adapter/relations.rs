//! Resolution of relation fields into related records.

use super::error::AdapterResult;
use super::Adapter;
use crate::constants::ID_FIELD;
use crate::path::loose_values_eq;
use crate::query::{Condition, Extend, SelectOptions};
use crate::schema::{Relation, RelationSide};
use crate::Record;
use serde_json::Value;

/// Replaces the relation fields selected by `extend` with related records.
pub async fn populate(
    adapter: &dyn Adapter,
    schema: &str,
    records: &mut [Record],
    extend: &Extend,
) -> AdapterResult<()> {
    if extend.is_none() || records.is_empty() {
        return Ok(());
    }

    let relations: Vec<Relation> = adapter
        .registry()
        .relations(schema)
        .iter()
        .filter(|relation| extend.includes(&relation.field))
        .cloned()
        .collect();

    for relation in &relations {
        for record in records.iter_mut() {
            let resolved = resolve_relation(adapter, relation, record).await?;
            record.insert(relation.field.clone(), resolved);
        }
    }
    Ok(())
}

/// Re-resolves the relation fields a patch touched, so a caller relating or
/// unrelating records sees the related records in the response.
pub async fn populate_patched(
    adapter: &dyn Adapter,
    schema: &str,
    patch: &Record,
    record: &mut Record,
) -> AdapterResult<()> {
    let touched: Vec<String> = adapter
        .registry()
        .relations(schema)
        .iter()
        .filter(|relation| {
            patch.keys().any(|key| {
                key == &relation.field
                    || key
                        .strip_prefix(relation.field.as_str())
                        .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
            })
        })
        .map(|relation| relation.field.clone())
        .collect();

    if touched.is_empty() {
        return Ok(());
    }
    populate(
        adapter,
        schema,
        std::slice::from_mut(record),
        &Extend::Fields(touched),
    )
    .await
}

/// Related records of one record: a list for `many` relations, otherwise the
/// single related record or `null`.
pub async fn resolve_relation(
    adapter: &dyn Adapter,
    relation: &Relation,
    record: &Record,
) -> AdapterResult<Value> {
    let related = match &relation.side {
        RelationSide::Owning => {
            let keys: Vec<Value> = match record.get(&relation.field) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(keys)) => keys.clone(),
                Some(key) => vec![key.clone()],
            };
            if keys.is_empty() {
                Vec::new()
            } else {
                let found = adapter
                    .select(
                        &relation.target,
                        Some(&Condition::ids_in(keys.clone())),
                        &SelectOptions::default(),
                    )
                    .await?
                    .into_records();
                keys.iter()
                    .filter_map(|key| {
                        found
                            .iter()
                            .find(|candidate| candidate.get(ID_FIELD).is_some_and(|id| loose_values_eq(id, key)))
                            .cloned()
                    })
                    .collect()
            }
        }
        RelationSide::Referenced { back_reference } => match record.get(ID_FIELD) {
            None | Some(Value::Null) => Vec::new(),
            Some(id) => adapter
                .select(
                    &relation.target,
                    Some(&Condition::new().with(back_reference.clone(), id.clone())),
                    &SelectOptions::default(),
                )
                .await?
                .into_records(),
        },
    };

    Ok(if relation.many {
        Value::Array(related.into_iter().map(Value::Object).collect())
    } else {
        related
            .into_iter()
            .next()
            .map(Value::Object)
            .unwrap_or(Value::Null)
    })
}

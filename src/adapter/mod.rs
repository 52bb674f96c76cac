//! The storage adapter contract and its two implementations.
//!
//! Every adapter owns an `Arc<SchemaRegistry>`, opens its connection lazily
//! on first use, and translates conditions through [`crate::query::translate`]
//! before rendering them into its native form.

pub mod document;
pub mod error;
pub mod fixture;
pub mod records;
pub mod relational;
pub mod relations;

pub use document::DocumentStore;
pub use error::{AdapterError, AdapterResult};
pub use relational::RelationalStore;

use crate::constants::{ID_FIELD, INDEX_KEY};
use crate::mutation::{UnknownFieldPolicy, UpdateMode};
use crate::query::{Condition, SelectOptions};
use crate::schema::SchemaRegistry;
use crate::Record;
use async_trait::async_trait;
use futures::future::join_all;
use log::info;
use serde_json::Value;
use std::path::Path;

/// Result of a read: a key lookup yields at most one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Selection {
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Selection::One(record) => record.into_iter().collect(),
            Selection::Many(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Selection::One(record) => usize::from(record.is_some()),
            Selection::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON form: an object or `null` for key lookups, an array otherwise
    pub fn to_value(&self) -> Value {
        match self {
            Selection::One(record) => record.clone().map(Value::Object).unwrap_or(Value::Null),
            Selection::Many(records) => {
                Value::Array(records.iter().cloned().map(Value::Object).collect())
            }
        }
    }
}

/// Options for `save` and `save_one`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub upd_mode: UpdateMode,
    pub unknown_fields: UnknownFieldPolicy,
}

impl SaveOptions {
    pub fn with_mode(upd_mode: UpdateMode) -> Self {
        Self {
            upd_mode,
            ..Self::default()
        }
    }
}

/// Per-record results of a conditional multi-record save.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub updated: Vec<Record>,
    /// Key of each record that failed, with its error
    pub failed: Vec<(Value, AdapterError)>,
}

#[derive(Debug)]
pub enum SaveOutcome {
    Created(Record),
    Updated(Record),
    Batch(BatchOutcome),
}

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;

    fn registry(&self) -> &SchemaRegistry;

    /// Opens the connection if it is not open yet.
    async fn connect(&self) -> AdapterResult<()>;

    /// Flushes pending work. The handle itself lives as long as the adapter.
    async fn disconnect(&self) -> AdapterResult<()>;

    /// A fresh primary key, or `None` when the backend assigns keys on insert.
    fn gen_id(&self) -> Option<Value>;

    async fn select(
        &self,
        schema: &str,
        condition: Option<&Condition>,
        options: &SelectOptions,
    ) -> AdapterResult<Selection>;

    /// Inserts one record built from `values` and returns it as stored.
    async fn create(&self, schema: &str, values: Record) -> AdapterResult<Record>;

    /// Fetches the record keyed `id`, applies `patch` and persists it.
    async fn save_one(
        &self,
        schema: &str,
        id: &Value,
        patch: &Record,
        options: &SaveOptions,
    ) -> AdapterResult<Record>;

    /// Deletes the matching records (all of them without a condition).
    async fn remove(&self, schema: &str, condition: Option<&Condition>) -> AdapterResult<u64>;

    async fn count(&self, schema: &str, condition: Option<&Condition>) -> AdapterResult<u64>;

    /// Largest value of `field` among the matching records, `0` when none.
    async fn max(
        &self,
        schema: &str,
        field: &str,
        condition: Option<&Condition>,
    ) -> AdapterResult<Value>;

    /// Drops and recreates the storage of `schema`.
    async fn sync(&self, schema: &str) -> AdapterResult<()>;

    /// Creates without a condition, updates one record for `_index`, and
    /// otherwise updates every match concurrently.
    async fn save(
        &self,
        schema: &str,
        values: Record,
        condition: Option<&Condition>,
        options: &SaveOptions,
    ) -> AdapterResult<SaveOutcome> {
        let condition = match condition {
            Some(condition) => condition,
            None => return Ok(SaveOutcome::Created(self.create(schema, values).await?)),
        };

        if let Some(id) = condition.get(INDEX_KEY).filter(|id| !id.is_null()) {
            let updated = self.save_one(schema, id, &values, options).await?;
            return Ok(SaveOutcome::Updated(updated));
        }

        let key_only = SelectOptions {
            select_columns: Some(vec![ID_FIELD.to_string()]),
            ..SelectOptions::default()
        };
        let ids: Vec<Value> = self
            .select(schema, Some(condition), &key_only)
            .await?
            .into_records()
            .into_iter()
            .filter_map(|mut record| record.remove(ID_FIELD))
            .collect();

        let results = join_all(
            ids.iter()
                .map(|id| self.save_one(schema, id, &values, options)),
        )
        .await;

        let mut outcome = BatchOutcome::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(record) => outcome.updated.push(record),
                Err(error) => outcome.failed.push((id, error)),
            }
        }
        Ok(SaveOutcome::Batch(outcome))
    }

    /// Inserts every record of a `{ "data": [...] }` fixture file.
    async fn dump(&self, schema: &str, fixture: &Path) -> AdapterResult<u64> {
        let records = fixture::read_fixture(fixture).await?;
        let mut inserted = 0u64;
        for record in records {
            self.create(schema, record).await?;
            inserted += 1;
        }
        info!(
            "Imported {} records from {} into '{}' ({})",
            inserted,
            fixture.display(),
            schema,
            self.backend_name()
        );
        Ok(inserted)
    }
}

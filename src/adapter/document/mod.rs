//! Document store on an embedded sled database.
//!
//! Each schema lives in its own sled tree. Records are stored as JSON bytes
//! keyed by the textual form of their `id`. Reads scan the tree and evaluate
//! a [`DocumentQuery`] in memory.

pub mod filter;

pub use filter::{Clause, DocOp, DocumentQuery};

use super::error::{AdapterError, AdapterResult};
use super::records::{apply_update, check_scope, now_rfc3339, prepare_create, project, select_columns};
use super::relations::{populate, populate_patched};
use super::{Adapter, SaveOptions, Selection};
use crate::config::DocumentStoreConfig;
use crate::constants::ID_FIELD;
use crate::path::{loose_text, FieldPath};
use crate::query::{translate, Condition, QuerySpec, SelectOptions};
use crate::schema::{HookEvent, SchemaRegistry};
use crate::Record;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

pub struct DocumentStore {
    config: DocumentStoreConfig,
    registry: Arc<SchemaRegistry>,
    db: OnceCell<sled::Db>,
}

impl DocumentStore {
    pub fn new(config: DocumentStoreConfig, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            config,
            registry,
            db: OnceCell::new(),
        }
    }

    /// A store on a temporary database that disappears when dropped
    pub fn temporary(registry: Arc<SchemaRegistry>) -> Self {
        Self::new(DocumentStoreConfig::temporary(), registry)
    }

    async fn db(&self) -> AdapterResult<&sled::Db> {
        self.db
            .get_or_try_init(|| async { Self::open(&self.config) })
            .await
    }

    fn open(config: &DocumentStoreConfig) -> AdapterResult<sled::Db> {
        let mut builder = if config.temporary {
            sled::Config::new().temporary(true)
        } else {
            sled::Config::new().path(&config.path)
        };
        if let Some(interval) = config.flush_every_ms {
            builder = builder.flush_every_ms(Some(interval));
        }
        let db = builder.open().map_err(AdapterError::from_sled("open"))?;
        info!(
            "Opened document store at {}",
            if config.temporary {
                "a temporary location".to_string()
            } else {
                config.path.display().to_string()
            }
        );
        Ok(db)
    }

    async fn tree(&self, schema: &str) -> AdapterResult<sled::Tree> {
        self.registry.get(schema)?;
        let db = self.db().await?;
        db.open_tree(schema).map_err(AdapterError::from_sled("open_tree"))
    }

    fn key_of(id: &Value) -> String {
        loose_text(id)
    }

    fn fetch(tree: &sled::Tree, id: &Value) -> AdapterResult<Option<Record>> {
        match tree
            .get(Self::key_of(id).as_bytes())
            .map_err(AdapterError::from_sled("get"))?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn store(tree: &sled::Tree, record: &Record) -> AdapterResult<()> {
        let id = record
            .get(ID_FIELD)
            .ok_or_else(|| AdapterError::Serialization("record has no id".to_string()))?;
        let bytes = serde_json::to_vec(record)?;
        tree.insert(Self::key_of(id).as_bytes(), bytes)
            .map_err(AdapterError::from_sled("insert"))?;
        tree.flush().map_err(AdapterError::from_sled("flush"))?;
        Ok(())
    }

    fn load_all(tree: &sled::Tree) -> AdapterResult<Vec<Record>> {
        let mut records = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let (_, bytes) = entry.map_err(AdapterError::from_sled("scan"))?;
            records.push(serde_json::from_slice(&bytes)?);
        }
        Ok(records)
    }

    /// Records matching a translated plan, sorted and paginated.
    fn matching(tree: &sled::Tree, schema: &str, spec: &QuerySpec) -> AdapterResult<Vec<Record>> {
        if let Some(index) = &spec.index {
            return Ok(Self::fetch(tree, index)?.into_iter().collect());
        }
        let query = DocumentQuery::compile(schema, spec, Utc::now())?;
        debug!("Document query on '{}': {}", schema, query.to_document());
        let mut matched: Vec<Record> = Self::load_all(tree)?
            .into_iter()
            .filter(|record| query.matches(record))
            .collect();
        query.sort(&mut matched);
        Ok(query.paginate(matched))
    }

    fn plan(&self, schema: &str, condition: Option<&Condition>, options: &SelectOptions) -> AdapterResult<QuerySpec> {
        let spec = translate(condition, options)?;
        check_scope(&*self.registry.get(schema)?, &spec)?;
        Ok(spec)
    }
}

#[async_trait]
impl Adapter for DocumentStore {
    fn backend_name(&self) -> &'static str {
        "document"
    }

    fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    async fn connect(&self) -> AdapterResult<()> {
        self.db().await?;
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        if let Some(db) = self.db.get() {
            db.flush_async()
                .await
                .map_err(AdapterError::from_sled("flush"))?;
            debug!("Flushed document store");
        }
        Ok(())
    }

    fn gen_id(&self) -> Option<Value> {
        Some(Value::String(Uuid::new_v4().simple().to_string()))
    }

    async fn select(
        &self,
        schema: &str,
        condition: Option<&Condition>,
        options: &SelectOptions,
    ) -> AdapterResult<Selection> {
        let record_schema = self.registry.get(schema)?;
        let spec = self.plan(schema, condition, options)?;
        let tree = self.tree(schema).await?;
        let mut found = Self::matching(&tree, schema, &spec)?;

        populate(self, schema, &mut found, &spec.extend).await?;
        let columns = select_columns(&record_schema, &spec);
        let mut projected: Vec<Record> = found
            .into_iter()
            .map(|record| project(record, &columns))
            .collect();

        Ok(if spec.is_index_lookup() {
            Selection::One(projected.pop())
        } else {
            Selection::Many(projected)
        })
    }

    async fn create(&self, schema: &str, values: Record) -> AdapterResult<Record> {
        let record_schema = self.registry.get(schema)?;
        let tree = self.tree(schema).await?;

        let mut record = prepare_create(&record_schema, values, &now_rfc3339());
        if !record.contains_key(ID_FIELD) {
            if let Some(id) = self.gen_id() {
                record.insert(ID_FIELD.to_string(), id);
            }
        }
        Self::store(&tree, &record)?;
        record_schema.options().hooks.run_after(HookEvent::Create, &record);
        Ok(record)
    }

    async fn save_one(
        &self,
        schema: &str,
        id: &Value,
        patch: &Record,
        options: &SaveOptions,
    ) -> AdapterResult<Record> {
        let record_schema = self.registry.get(schema)?;
        let tree = self.tree(schema).await?;
        let mut record = Self::fetch(&tree, id)?
            .ok_or_else(|| AdapterError::not_found(schema, loose_text(id)))?;

        let report = apply_update(&record_schema, &mut record, patch, options, &now_rfc3339())?;
        debug!(
            "Updated '{}' {} ({}): applied {:?}, skipped {:?}",
            schema,
            loose_text(id),
            options.upd_mode,
            report.applied,
            report.skipped
        );
        Self::store(&tree, &record)?;
        record_schema.options().hooks.run_after(HookEvent::Update, &record);

        populate_patched(self, schema, patch, &mut record).await?;
        Ok(record)
    }

    async fn remove(&self, schema: &str, condition: Option<&Condition>) -> AdapterResult<u64> {
        let spec = self.plan(schema, condition, &SelectOptions::default())?;
        let tree = self.tree(schema).await?;

        let mut removed = 0u64;
        for record in Self::matching(&tree, schema, &spec)? {
            if let Some(id) = record.get(ID_FIELD) {
                if tree
                    .remove(Self::key_of(id).as_bytes())
                    .map_err(AdapterError::from_sled("remove"))?
                    .is_some()
                {
                    removed += 1;
                }
            }
        }
        tree.flush().map_err(AdapterError::from_sled("flush"))?;
        Ok(removed)
    }

    async fn count(&self, schema: &str, condition: Option<&Condition>) -> AdapterResult<u64> {
        let spec = self.plan(schema, condition, &SelectOptions::default())?;
        let tree = self.tree(schema).await?;
        Ok(Self::matching(&tree, schema, &spec)?.len() as u64)
    }

    async fn max(
        &self,
        schema: &str,
        field: &str,
        condition: Option<&Condition>,
    ) -> AdapterResult<Value> {
        let record_schema = self.registry.get(schema)?;
        let path: FieldPath = record_schema.path(field)?;
        let spec = self.plan(schema, condition, &SelectOptions::default())?;
        let tree = self.tree(schema).await?;

        let records = Self::matching(&tree, schema, &spec)?;
        let best = records
            .iter()
            .filter_map(|record| crate::path::get(record, &path))
            .filter(|value| !value.is_null())
            .fold(None::<&Value>, |best, value| match best {
                Some(current) if filter::compare(value, current) != Some(Ordering::Greater) => {
                    Some(current)
                }
                _ => Some(value),
            });
        Ok(best.cloned().unwrap_or_else(|| Value::from(0)))
    }

    async fn sync(&self, schema: &str) -> AdapterResult<()> {
        self.registry.get(schema)?;
        let db = self.db().await?;
        db.drop_tree(schema).map_err(AdapterError::from_sled("drop_tree"))?;
        db.open_tree(schema).map_err(AdapterError::from_sled("open_tree"))?;
        info!("Synced document collection '{}'", schema);
        Ok(())
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("config", &self.config)
            .field("connected", &self.db.initialized())
            .finish()
    }
}

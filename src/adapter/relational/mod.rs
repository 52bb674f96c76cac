//! Relational store on SQLite.
//!
//! One table per schema, created when the connection opens. Lists, objects
//! and nested records are stored as JSON text and filtered with SQLite's JSON
//! functions. The connection sits behind a mutex and every statement runs on
//! the blocking pool.

pub mod sql;

pub use sql::{Column, ColumnKind, SqlParts};

use super::error::{AdapterError, AdapterResult};
use super::records::{apply_update, check_scope, now_rfc3339, prepare_create, project, select_columns};
use super::relations::{populate, populate_patched};
use super::{Adapter, SaveOptions, Selection};
use crate::config::{RelationalStoreConfig, IN_MEMORY};
use crate::constants::ID_FIELD;
use crate::path::loose_text;
use crate::query::{translate, Condition, QuerySpec, SelectOptions};
use crate::schema::{HookEvent, RecordSchema, SchemaRegistry};
use crate::Record;
use async_trait::async_trait;
use log::{debug, info};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio::task::spawn_blocking;

pub struct RelationalStore {
    config: RelationalStoreConfig,
    registry: Arc<SchemaRegistry>,
    conn: OnceCell<Arc<Mutex<Connection>>>,
}

impl RelationalStore {
    pub fn new(config: RelationalStoreConfig, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            config,
            registry,
            conn: OnceCell::new(),
        }
    }

    /// A store on a private in-memory database
    pub fn in_memory(registry: Arc<SchemaRegistry>) -> Self {
        Self::new(RelationalStoreConfig::in_memory(), registry)
    }

    async fn conn(&self) -> AdapterResult<&Arc<Mutex<Connection>>> {
        self.conn.get_or_try_init(|| self.open()).await
    }

    async fn open(&self) -> AdapterResult<Arc<Mutex<Connection>>> {
        let mut statements = Vec::new();
        for name in self.registry.names() {
            statements.extend(sql::create_table_statements(&*self.registry.get(name)?));
        }

        let path = self.config.path.clone();
        let location = path.clone();
        let conn = spawn_blocking(move || -> AdapterResult<Connection> {
            let conn = if path == IN_MEMORY {
                Connection::open_in_memory()
            } else {
                if let Some(parent) = Path::new(&path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(&path)
            }
            .map_err(AdapterError::from_sqlite("open"))?;

            for statement in &statements {
                conn.execute(statement, [])
                    .map_err(AdapterError::from_sqlite("create_table"))?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| AdapterError::backend("sqlite", "open", format!("join error: {}", e)))??;

        info!(
            "Opened relational store at {} with {} tables",
            location,
            self.registry.len()
        );
        Ok(Arc::new(Mutex::new(conn)))
    }

    /// Runs `func` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, operation: &'static str, func: F) -> AdapterResult<T>
    where
        F: FnOnce(&mut Connection) -> AdapterResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(self.conn().await?);
        spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                AdapterError::backend("sqlite", operation, "connection mutex poisoned")
            })?;
            func(&mut guard)
        })
        .await
        .map_err(|e| AdapterError::backend("sqlite", operation, format!("join error: {}", e)))?
    }

    fn plan(
        &self,
        schema: &RecordSchema,
        condition: Option<&Condition>,
        options: &SelectOptions,
    ) -> AdapterResult<QuerySpec> {
        let spec = translate(condition, options)?;
        check_scope(schema, &spec)?;
        Ok(spec)
    }

    fn select_statement(schema: &RecordSchema, parts: &SqlParts) -> String {
        let column_list: Vec<String> = sql::table_columns(schema)
            .iter()
            .map(|column| sql::quote_ident(&column.name))
            .collect();
        format!(
            "SELECT {} FROM {}{}{}{}",
            column_list.join(", "),
            sql::quote_ident(schema.name()),
            parts.where_clause,
            parts.order_clause,
            parts.limit_clause
        )
    }

    /// Reads the rows selected by `spec`, decoded into records.
    async fn fetch(&self, schema: &Arc<RecordSchema>, spec: &QuerySpec) -> AdapterResult<Vec<Record>> {
        let parts = sql::render(schema, spec)?;
        let statement = Self::select_statement(schema, &parts);
        let params = parts.all_params();
        let columns = sql::table_columns(schema);
        debug!("{} {:?}", statement, params);
        self.with_conn("select", move |conn| {
            query_records(conn, &statement, &params, &columns)
        })
        .await
    }

    async fn fetch_by_id(&self, schema: &Arc<RecordSchema>, id: &Value) -> AdapterResult<Option<Record>> {
        let spec = translate(Some(&Condition::index(id.clone())), &SelectOptions::default())?;
        Ok(self.fetch(schema, &spec).await?.pop())
    }
}

fn query_records(
    conn: &Connection,
    statement: &str,
    params: &[SqlValue],
    columns: &[Column],
) -> AdapterResult<Vec<Record>> {
    let mut prepared = conn
        .prepare(statement)
        .map_err(AdapterError::from_sqlite("prepare"))?;
    let mut rows = prepared
        .query(params_from_iter(params.iter()))
        .map_err(AdapterError::from_sqlite("query"))?;

    let mut records = Vec::new();
    while let Some(row) = rows.next().map_err(AdapterError::from_sqlite("read_row"))? {
        let mut record = Record::new();
        for (position, column) in columns.iter().enumerate() {
            let raw = row
                .get_ref(position)
                .map_err(AdapterError::from_sqlite("read_column"))?;
            record.insert(column.name.clone(), sql::from_sql(column, raw)?);
        }
        records.push(record);
    }
    Ok(records)
}

/// Column names and encoded values of the columns `record` carries.
fn encode_row(columns: &[Column], record: &Record) -> AdapterResult<(Vec<String>, Vec<SqlValue>)> {
    let mut names = Vec::new();
    let mut values = Vec::new();
    for column in columns {
        if let Some(value) = record.get(&column.name) {
            names.push(sql::quote_ident(&column.name));
            values.push(sql::to_sql(column, value)?);
        }
    }
    Ok((names, values))
}

/// Every non-key column with its encoded value. Columns the record no longer
/// carries are cleared.
fn encode_assignments(columns: &[Column], record: &Record) -> AdapterResult<(Vec<String>, Vec<SqlValue>)> {
    let mut names = Vec::new();
    let mut values = Vec::new();
    for column in columns.iter().filter(|column| column.kind != ColumnKind::Key) {
        names.push(sql::quote_ident(&column.name));
        values.push(match record.get(&column.name) {
            Some(value) => sql::to_sql(column, value)?,
            None => SqlValue::Null,
        });
    }
    Ok((names, values))
}

#[async_trait]
impl Adapter for RelationalStore {
    fn backend_name(&self) -> &'static str {
        "relational"
    }

    fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    async fn connect(&self) -> AdapterResult<()> {
        self.conn().await?;
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        if self.conn.initialized() {
            self.with_conn("disconnect", |conn| {
                conn.flush_prepared_statement_cache();
                Ok(())
            })
            .await?;
            debug!("Flushed relational store");
        }
        Ok(())
    }

    /// Keys come from the table's autoincrement column.
    fn gen_id(&self) -> Option<Value> {
        None
    }

    async fn select(
        &self,
        schema: &str,
        condition: Option<&Condition>,
        options: &SelectOptions,
    ) -> AdapterResult<Selection> {
        let record_schema = self.registry.get(schema)?;
        let spec = self.plan(&record_schema, condition, options)?;
        let mut found = self.fetch(&record_schema, &spec).await?;

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
        let record = prepare_create(&record_schema, values, &now_rfc3339());

        let columns = sql::table_columns(&record_schema);
        let (names, params) = encode_row(&columns, &record)?;
        let table = sql::quote_ident(schema);
        let statement = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                names.join(", "),
                vec!["?"; names.len()].join(", ")
            )
        };
        debug!("{} {:?}", statement, params);

        let rowid = self
            .with_conn("insert", move |conn| {
                conn.execute(&statement, params_from_iter(params.iter()))
                    .map_err(AdapterError::from_sqlite("insert"))?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        let stored = self
            .fetch_by_id(&record_schema, &Value::from(rowid))
            .await?
            .ok_or_else(|| AdapterError::not_found(schema, rowid.to_string()))?;
        record_schema.options().hooks.run_after(HookEvent::Create, &stored);
        Ok(stored)
    }

    async fn save_one(
        &self,
        schema: &str,
        id: &Value,
        patch: &Record,
        options: &SaveOptions,
    ) -> AdapterResult<Record> {
        let record_schema = self.registry.get(schema)?;
        let mut record = self
            .fetch_by_id(&record_schema, id)
            .await?
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

        let columns = sql::table_columns(&record_schema);
        let (names, mut params) = encode_assignments(&columns, &record)?;
        if !names.is_empty() {
            let assignments: Vec<String> = names.iter().map(|name| format!("{} = ?", name)).collect();
            let statement = format!(
                "UPDATE {} SET {} WHERE {} = ?",
                sql::quote_ident(schema),
                assignments.join(", "),
                sql::quote_ident(ID_FIELD)
            );
            let key = columns
                .iter()
                .find(|column| column.kind == ColumnKind::Key)
                .map(|column| sql::to_sql(column, id))
                .transpose()?
                .unwrap_or(SqlValue::Null);
            params.push(key);
            debug!("{} {:?}", statement, params);
            self.with_conn("update", move |conn| {
                conn.execute(&statement, params_from_iter(params.iter()))
                    .map_err(AdapterError::from_sqlite("update"))
            })
            .await?;
        }

        let mut stored = self
            .fetch_by_id(&record_schema, id)
            .await?
            .ok_or_else(|| AdapterError::not_found(schema, loose_text(id)))?;
        record_schema.options().hooks.run_after(HookEvent::Update, &stored);

        populate_patched(self, schema, patch, &mut stored).await?;
        Ok(stored)
    }

    async fn remove(&self, schema: &str, condition: Option<&Condition>) -> AdapterResult<u64> {
        let record_schema = self.registry.get(schema)?;
        let spec = self.plan(&record_schema, condition, &SelectOptions::default())?;
        let parts = sql::render(&record_schema, &spec)?;
        let statement = format!("DELETE FROM {}{}", sql::quote_ident(schema), parts.where_clause);
        let params = parts.where_params;
        debug!("{} {:?}", statement, params);

        let removed = self
            .with_conn("delete", move |conn| {
                conn.execute(&statement, params_from_iter(params.iter()))
                    .map_err(AdapterError::from_sqlite("delete"))
            })
            .await?;
        Ok(removed as u64)
    }

    async fn count(&self, schema: &str, condition: Option<&Condition>) -> AdapterResult<u64> {
        let record_schema = self.registry.get(schema)?;
        let spec = self.plan(&record_schema, condition, &SelectOptions::default())?;
        let parts = sql::render(&record_schema, &spec)?;
        let statement = format!(
            "SELECT COUNT(*) FROM {}{}",
            sql::quote_ident(schema),
            parts.where_clause
        );
        let params = parts.where_params;

        let total: i64 = self
            .with_conn("count", move |conn| {
                conn.query_row(&statement, params_from_iter(params.iter()), |row| row.get(0))
                    .map_err(AdapterError::from_sqlite("count"))
            })
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn max(
        &self,
        schema: &str,
        field: &str,
        condition: Option<&Condition>,
    ) -> AdapterResult<Value> {
        let record_schema = self.registry.get(schema)?;
        let path = record_schema.path(field)?;
        let spec = self.plan(&record_schema, condition, &SelectOptions::default())?;
        let parts = sql::render(&record_schema, &spec)?;
        let (expression, mut params) = sql::field_expr(&record_schema, &path)?;
        let statement = format!(
            "SELECT MAX({}) FROM {}{}",
            expression,
            sql::quote_ident(schema),
            parts.where_clause
        );
        params.extend(parts.where_params);

        let best = self
            .with_conn("max", move |conn| {
                let mut prepared = conn
                    .prepare(&statement)
                    .map_err(AdapterError::from_sqlite("prepare"))?;
                let mut rows = prepared
                    .query(params_from_iter(params.iter()))
                    .map_err(AdapterError::from_sqlite("max"))?;
                let best = match rows.next().map_err(AdapterError::from_sqlite("max"))? {
                    Some(row) => sql::scalar_from_sql(
                        row.get_ref(0).map_err(AdapterError::from_sqlite("max"))?,
                    )?,
                    None => Value::Null,
                };
                Ok(best)
            })
            .await?;
        Ok(if best.is_null() { Value::from(0) } else { best })
    }

    async fn sync(&self, schema: &str) -> AdapterResult<()> {
        let record_schema = self.registry.get(schema)?;
        let mut statements = vec![sql::drop_table_statement(&record_schema)];
        statements.extend(sql::create_table_statements(&record_schema));

        self.with_conn("sync", move |conn| {
            let tx = conn
                .transaction()
                .map_err(AdapterError::from_sqlite("begin"))?;
            for statement in &statements {
                tx.execute(statement, [])
                    .map_err(AdapterError::from_sqlite("sync"))?;
            }
            tx.commit().map_err(AdapterError::from_sqlite("commit"))
        })
        .await?;
        info!("Synced relational table '{}'", schema);
        Ok(())
    }
}

impl std::fmt::Debug for RelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalStore")
            .field("config", &self.config)
            .field("connected", &self.conn.initialized())
            .finish()
    }
}

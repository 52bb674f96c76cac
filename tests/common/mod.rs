//! Shared fixtures for the adapter integration tests.
//!
//! Both backends run the same scenarios from [`scenarios`]; each test file
//! only decides which store to build.

#![allow(dead_code)]

pub mod scenarios;

use pathstore::adapter::{Adapter, DocumentStore, RelationalStore};
use pathstore::schema::{ModelOptions, SchemaRegistry};
use pathstore::Record;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `user` (timestamped) and `organ`, related many-to-many through
/// `user.organs`.
pub fn registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::builder()
        .define(
            "user",
            json!({
                "name": { "type": "String", "index": true },
                "age": "Number",
                "tags": ["String"],
                "profile": "Object",
                "items": [{ "sku": "Number", "qty": "Number" }],
                "organs": [{ "type": "Id", "ref": "organ" }]
            }),
            ModelOptions::with_timestamps(),
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
        .expect("test schemas should register");
    Arc::new(registry)
}

pub fn document_store() -> DocumentStore {
    DocumentStore::temporary(registry())
}

pub fn relational_store() -> RelationalStore {
    RelationalStore::in_memory(registry())
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Writes `{ "data": records }` to `dir/name`.
pub fn write_fixture(dir: &Path, name: &str, records: Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, json!({ "data": records }).to_string())
        .expect("fixture should be writable");
    path
}

/// Inserts alice (30), bob (8), carol (12) and dave (no age); returns them in
/// that order as stored.
pub async fn seed_users(store: &dyn Adapter) -> Vec<Record> {
    let mut created = Vec::new();
    for user in [
        json!({ "name": "alice", "age": 30, "tags": ["admin"] }),
        json!({ "name": "bob", "age": 8 }),
        json!({ "name": "carol", "age": 12 }),
        json!({ "name": "dave" }),
    ] {
        created.push(
            store
                .create("user", record(user))
                .await
                .expect("seed insert should succeed"),
        );
    }
    created
}

pub fn names(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| record.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

pub fn id_of(record: &Record) -> Value {
    record.get("id").cloned().expect("stored records carry an id")
}

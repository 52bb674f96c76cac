//! # PathStore
//!
//! A record mutation and condition translation engine shared by two storage
//! backends. Records are JSON objects described by registered schemas;
//! callers address values inside them with path expressions and filter them
//! with backend-neutral condition objects.
//!
//! ## Core Components
//!
//! * `path` - Path expressions (`a.b[0].c`, `items[{id:10}].qty`) and their resolution
//! * `schema` - Model definitions, descriptors and the two-phase registry
//! * `mutation` - The cover, append, delete and merge update modes
//! * `query` - Condition objects translated into a backend-neutral plan
//! * `adapter` - The adapter contract with document (sled) and relational (SQLite) stores
//! * `config` - TOML configuration with environment overrides
//! * `bootstrap` - Startup sync and fixture import
//! * `error` - The crate-level error type
//!
//! ## Example
//!
//! ```no_run
//! use pathstore::adapter::{Adapter, DocumentStore};
//! use pathstore::query::{Condition, SelectOptions};
//! use pathstore::schema::{ModelOptions, SchemaRegistry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SchemaRegistry::builder()
//!     .define("user", json!({ "name": "String", "age": "Number" }), ModelOptions::default())
//!     .build()?;
//! let store = DocumentStore::temporary(Arc::new(registry));
//!
//! let adults = Condition::new().with("age", json!([">=", 18]));
//! let found = store.select("user", Some(&adults), &SelectOptions::default()).await?;
//! println!("{}", found.to_value());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod mutation;
pub mod path;
pub mod query;
pub mod schema;

/// A stored record: a JSON object keyed by field name.
pub type Record = serde_json::Map<String, serde_json::Value>;

// Re-export main types for convenience
pub use adapter::{
    Adapter, AdapterError, AdapterResult, DocumentStore, RelationalStore, SaveOptions, SaveOutcome,
    Selection,
};
pub use bootstrap::{prepare, BootstrapReport};
pub use config::{EngineConfig, SyncPolicy};
pub use error::{PathStoreError, PathStoreResult};
pub use mutation::{mutate_record, MutationError, UnknownFieldPolicy, UpdateMode};
pub use path::{FieldPath, PathError};
pub use query::{translate, Condition, Extend, QuerySpec, SelectOptions};
pub use schema::{ModelOptions, RecordSchema, SchemaRegistry};

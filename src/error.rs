//! Crate-level error type.
//!
//! Each module reports its own error enum. [`PathStoreError`] wraps all of
//! them for callers that drive several layers at once, such as bootstrap and
//! the command line.

use crate::adapter::AdapterError;
use crate::config::ConfigError;
use crate::mutation::MutationError;
use crate::path::PathError;
use crate::query::TranslationError;
use crate::schema::SchemaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathStoreError {
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Condition error: {0}")]
    Translation(#[from] TranslationError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A command or argument the caller supplied makes no sense
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PathStoreError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type PathStoreResult<T> = Result<T, PathStoreError>;

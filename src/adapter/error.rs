use crate::mutation::MutationError;
use crate::path::PathError;
use crate::query::TranslationError;
use crate::schema::SchemaError;
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// A keyed write or lookup found nothing
    #[error("Record '{id}' not found in '{schema}'")]
    RecordNotFound { schema: String, id: String },

    /// The plan cannot be executed by this backend
    #[error("Invalid query on '{schema}': {reason}")]
    InvalidQuery { schema: String, reason: String },

    /// The storage engine reported a failure
    #[error("{backend} {operation} failed: {reason}")]
    Backend {
        backend: String,
        operation: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A fixture file is not of the form `{ "data": [ ... ] }`
    #[error("Invalid fixture '{path}': {reason}")]
    Fixture { path: String, reason: String },
}

impl AdapterError {
    pub fn not_found(schema: impl Into<String>, id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            schema: schema.into(),
            id: id.into(),
        }
    }

    pub fn invalid_query(schema: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            schema: schema.into(),
            reason: reason.into(),
        }
    }

    pub fn backend(
        backend: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Backend {
            backend: backend.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn fixture(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fixture {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Maps a sled error raised during `operation`
    pub fn from_sled(operation: &'static str) -> impl Fn(sled::Error) -> Self {
        move |error| Self::backend("sled", operation, error.to_string())
    }

    /// Maps a SQLite error raised during `operation`
    pub fn from_sqlite(operation: &'static str) -> impl Fn(rusqlite::Error) -> Self {
        move |error| Self::backend("sqlite", operation, error.to_string())
    }
}

impl From<sled::Error> for AdapterError {
    fn from(error: sled::Error) -> Self {
        Self::backend("sled", "operation", error.to_string())
    }
}

impl From<rusqlite::Error> for AdapterError {
    fn from(error: rusqlite::Error) -> Self {
        Self::backend("sqlite", "statement", error.to_string())
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Result type alias for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

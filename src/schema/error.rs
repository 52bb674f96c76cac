use thiserror::Error;

/// Errors raised while parsing model definitions and building a registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A field descriptor could not be understood
    #[error("Invalid descriptor for '{schema}.{field}': {reason}")]
    InvalidDescriptor {
        schema: String,
        field: String,
        reason: String,
    },

    /// Two models were defined with the same name
    #[error("Schema '{name}' is already defined")]
    DuplicateSchema { name: String },

    /// A `ref` names a model that was never defined
    #[error("Field '{schema}.{field}' references unknown schema '{target}'")]
    MissingRelationTarget {
        schema: String,
        field: String,
        target: String,
    },

    /// A `belong: false` field has no matching back-reference in its target
    #[error("Field '{schema}.{field}' needs a field in '{target}' referencing '{schema}'")]
    MissingBackReference {
        schema: String,
        field: String,
        target: String,
    },

    /// Lookup of a model that is not registered
    #[error("Unknown schema: {name}")]
    UnknownSchema { name: String },
}

impl SchemaError {
    pub fn invalid_descriptor(
        schema: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidDescriptor {
            schema: schema.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateSchema { name: name.into() }
    }

    pub fn missing_target(
        schema: impl Into<String>,
        field: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::MissingRelationTarget {
            schema: schema.into(),
            field: field.into(),
            target: target.into(),
        }
    }

    pub fn missing_back_reference(
        schema: impl Into<String>,
        field: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::MissingBackReference {
            schema: schema.into(),
            field: field.into(),
            target: target.into(),
        }
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownSchema { name: name.into() }
    }
}

/// Result type alias for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

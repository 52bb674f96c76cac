use crate::path::PathError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error(transparent)]
    Path(#[from] PathError),

    /// The schema does not describe the patched location
    #[error("Field '{field}' is not declared on '{schema}'")]
    UnknownField { schema: String, field: String },

    /// The operand cannot be combined with the stored value
    #[error("Invalid value for '{path}': {reason}")]
    InvalidValue { path: String, reason: String },
}

impl MutationError {
    pub fn unknown_field(schema: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            schema: schema.into(),
            field: field.into(),
        }
    }

    pub fn invalid_value(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for mutation operations
pub type MutationResult<T> = Result<T, MutationError>;

use crate::path::PathError;
use thiserror::Error;

/// Errors raised while turning a condition object into a [`QuerySpec`].
///
/// [`QuerySpec`]: super::QuerySpec
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Unknown operator '{operator}' on '{field}'")]
    UnknownOperator { field: String, operator: String },

    #[error("Bad operand for '{field}': {reason}")]
    BadOperand { field: String, reason: String },

    #[error("Invalid order_by: {reason}")]
    InvalidOrder { reason: String },

    #[error("Invalid {key}: {value}")]
    InvalidPagination { key: String, value: String },

    #[error("Invalid scope '{value}', expected week, month or year")]
    InvalidScope { value: String },
}

impl TranslationError {
    pub fn unknown_operator(field: impl Into<String>, operator: impl Into<String>) -> Self {
        Self::UnknownOperator {
            field: field.into(),
            operator: operator.into(),
        }
    }

    pub fn bad_operand(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadOperand {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidOrder {
            reason: reason.into(),
        }
    }

    pub fn invalid_pagination(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidPagination {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn invalid_scope(value: impl Into<String>) -> Self {
        Self::InvalidScope {
            value: value.into(),
        }
    }
}

/// Result type alias for condition translation
pub type TranslationResult<T> = Result<T, TranslationError>;

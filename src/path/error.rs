use thiserror::Error;

/// Errors raised while parsing a field path or writing through one.
///
/// Read-side misses never produce a `PathError`; they resolve to "absent".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path string does not follow the path grammar
    #[error("Invalid path '{path}': {reason}")]
    Parse { path: String, reason: String },

    /// A write addressed an element that does not exist (predicate miss or
    /// missing array container)
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    /// A write addressed an array index past the end of the array
    #[error("Index {index} out of range for '{path}' (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    /// A write tried to descend through a value of the wrong shape
    #[error("Type mismatch at '{path}': expected {expected}")]
    TypeMismatch { path: String, expected: String },
}

impl PathError {
    pub fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    pub fn index_out_of_range(path: impl Into<String>, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange {
            path: path.into(),
            index,
            len,
        }
    }

    pub fn type_mismatch(path: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
        }
    }
}

/// Result type alias for path operations
pub type PathResult<T> = Result<T, PathError>;

//! Update semantics applied through field paths.
//!
//! Four modes are supported. `Cover` replaces, `Append` concatenates, adds
//! or pushes, `Delete` clears, zeroes or removes, and `Merge` combines
//! objects one level deep. Which of these happens is decided by the declared
//! type the path resolves to, never by the value currently stored.

pub mod engine;
pub mod error;

pub use engine::{apply, mutate_record, MutationReport};
pub use error::{MutationError, MutationResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deserialises leniently through [`UpdateMode::from_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum UpdateMode {
    #[default]
    Cover,
    Append,
    Delete,
    Merge,
}

impl UpdateMode {
    /// Case-insensitive lookup; anything unrecognised is `Cover`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "append" => UpdateMode::Append,
            "delete" => UpdateMode::Delete,
            "merge" => UpdateMode::Merge,
            _ => UpdateMode::Cover,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Cover => "cover",
            UpdateMode::Append => "append",
            UpdateMode::Delete => "delete",
            UpdateMode::Merge => "merge",
        }
    }
}

impl From<&str> for UpdateMode {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl From<String> for UpdateMode {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a patch key the schema cannot resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFieldPolicy {
    /// Leave the record untouched and log a warning
    #[default]
    Skip,
    /// Fail the whole mutation
    Reject,
}

//! Field paths: parsing (`expression`) and reading/writing records through
//! them (`resolver`).

pub mod error;
pub mod expression;
pub mod resolver;

pub use error::{PathError, PathResult};
pub use expression::{FieldPath, Segment};
pub use resolver::{
    get, locate, loose_eq, loose_text, loose_values_eq, remove, set, set_with, Terminal,
};

//! Condition objects and their translation into backend-neutral read plans.

pub mod error;
pub mod operator;
pub mod spec;
pub mod translator;

pub use error::{TranslationError, TranslationResult};
pub use operator::{FilterOp, Operator};
pub use spec::{Condition, Extend, Predicate, QuerySpec, Scope, SelectOptions, SortOrder};
pub use translator::translate;

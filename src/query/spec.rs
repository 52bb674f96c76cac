use super::operator::FilterOp;
use crate::constants::{ID_FIELD, INDEX_KEY};
use crate::path::FieldPath;
use crate::Record;
use serde_json::Value;
use std::str::FromStr;

/// A condition object as submitted by callers:
/// `field → literal | [operator, operand...]`, plus the reserved keys
/// `_index`, `order_by`, `offset`, `limit` and `scope`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition(Record);

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary-key lookup
    pub fn index(id: impl Into<Value>) -> Self {
        Self::new().with(INDEX_KEY, id)
    }

    /// Adds or replaces one entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// `{ "id": ["in", ids...] }`
    pub fn ids_in(ids: Vec<Value>) -> Self {
        Self::new().with(ID_FIELD, Value::Array(vec![Value::from("in"), Value::Array(ids)]))
    }

    /// Accepts a JSON object; anything else is not a condition.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Record {
        self.0
    }
}

impl From<Record> for Condition {
    fn from(map: Record) -> Self {
        Self(map)
    }
}

/// One filter test on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: FieldPath,
    pub op: FilterOp,
}

/// Recency window relative to now, compared against `createdAt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Week,
    Month,
    Year,
}

impl Scope {
    pub fn days(&self) -> i64 {
        match self {
            Scope::Week => 7,
            Scope::Month => 30,
            Scope::Year => 365,
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(Scope::Week),
            "month" => Ok(Scope::Month),
            "year" => Ok(Scope::Year),
            _ => Err(format!("Unknown scope: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(format!("Unknown sort order: {}", s)),
        }
    }
}

/// Which relation fields a read resolves into related records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Extend {
    #[default]
    None,
    All,
    Fields(Vec<String>),
}

impl Extend {
    pub fn includes(&self, field: &str) -> bool {
        match self {
            Extend::None => false,
            Extend::All => true,
            Extend::Fields(fields) => fields.iter().any(|name| name == field),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Extend::None)
    }
}

/// Per-call read options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectOptions {
    /// Overrides the schema's default select columns
    pub select_columns: Option<Vec<String>>,
    pub extend: Extend,
}

impl SelectOptions {
    pub fn extended() -> Self {
        Self {
            extend: Extend::All,
            ..Self::default()
        }
    }
}

/// Backend-neutral read plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Primary-key lookup; when set the filter is empty
    pub index: Option<Value>,
    pub filter: Vec<Predicate>,
    pub scope: Option<Scope>,
    pub order: Vec<(FieldPath, SortOrder)>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub select_columns: Option<Vec<String>>,
    pub extend: Extend,
}

impl QuerySpec {
    pub fn is_index_lookup(&self) -> bool {
        self.index.is_some()
    }
}

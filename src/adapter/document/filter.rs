//! Rendering of a [`QuerySpec`] into a document query and its evaluation
//! against stored JSON documents.
//!
//! The document form follows the usual operator vocabulary (`$lt`, `$in`,
//! `$regex`, ...) and keeps native JSON typing of operands. Comparisons are
//! numeric for numbers and numeric strings, chronological for RFC 3339
//! strings and lexicographic for other strings.

use crate::adapter::error::{AdapterError, AdapterResult};
use crate::constants::CREATED_AT;
use crate::path::{self, FieldPath};
use crate::query::{FilterOp, QuerySpec, SortOrder};
use crate::Record;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub enum DocOp {
    Eq(Value),
    Ne(Value),
    Null,
    NotNull,
    Lt(Value),
    Gt(Value),
    Lte(Value),
    Gte(Value),
    In(Vec<Value>),
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub struct Clause {
    pub field: FieldPath,
    pub op: DocOp,
}

/// Executable form of a non-keyed read.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    clauses: Vec<Clause>,
    order: Vec<(FieldPath, SortOrder)>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl DocumentQuery {
    /// Compiles the filter, scope, order and pagination of `spec`. A scope
    /// becomes a `createdAt` lower bound relative to `now`.
    pub fn compile(schema: &str, spec: &QuerySpec, now: DateTime<Utc>) -> AdapterResult<Self> {
        let mut clauses = Vec::with_capacity(spec.filter.len() + 1);
        for predicate in &spec.filter {
            let op = match &predicate.op {
                FilterOp::Eq(value) => DocOp::Eq(value.clone()),
                FilterOp::Ne(value) => DocOp::Ne(value.clone()),
                FilterOp::Lt(value) => DocOp::Lt(value.clone()),
                FilterOp::Gt(value) => DocOp::Gt(value.clone()),
                FilterOp::Le(value) => DocOp::Lte(value.clone()),
                FilterOp::Ge(value) => DocOp::Gte(value.clone()),
                FilterOp::IsNull => DocOp::Null,
                FilterOp::IsNotNull => DocOp::NotNull,
                FilterOp::In(values) => DocOp::In(values.clone()),
                FilterOp::Like(pattern) => DocOp::Regex(Regex::new(pattern).map_err(|e| {
                    AdapterError::invalid_query(schema, format!("bad pattern '{}': {}", pattern, e))
                })?),
            };
            clauses.push(Clause {
                field: predicate.field.clone(),
                op,
            });
        }

        if let Some(scope) = spec.scope {
            let cutoff = now - Duration::days(scope.days());
            clauses.push(Clause {
                field: FieldPath::field(CREATED_AT),
                op: DocOp::Gt(Value::String(
                    cutoff.to_rfc3339_opts(SecondsFormat::Millis, true),
                )),
            });
        }

        Ok(Self {
            clauses,
            order: spec.order.clone(),
            offset: spec.offset,
            limit: spec.limit,
        })
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause_matches(&clause.op, path::get(record, &clause.field)))
    }

    /// Stable sort by every order key in turn; missing values sort first.
    pub fn sort(&self, records: &mut [Record]) {
        if self.order.is_empty() {
            return;
        }
        records.sort_by(|left, right| {
            for (field, direction) in &self.order {
                let ordering = sort_cmp(path::get(left, field), path::get(right, field));
                let ordering = match direction {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    pub fn paginate(&self, records: Vec<Record>) -> Vec<Record> {
        let skip = self.offset.unwrap_or(0) as usize;
        let take = self.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
        records.into_iter().skip(skip).take(take).collect()
    }

    /// The query in document-store notation:
    /// `{ "filter": {...}, "sort": {...}, "skip": n, "limit": n }`.
    pub fn to_document(&self) -> Value {
        let mut filter = Map::new();
        for clause in &self.clauses {
            let key = clause.field.raw().to_string();
            let rendered = match &clause.op {
                DocOp::Eq(value) => {
                    filter.insert(key, value.clone());
                    continue;
                }
                DocOp::Null => {
                    filter.insert(key, Value::Null);
                    continue;
                }
                DocOp::Ne(value) => json!({ "$ne": value }),
                DocOp::NotNull => json!({ "$ne": null, "$exists": true }),
                DocOp::Lt(value) => json!({ "$lt": value }),
                DocOp::Gt(value) => json!({ "$gt": value }),
                DocOp::Lte(value) => json!({ "$lte": value }),
                DocOp::Gte(value) => json!({ "$gte": value }),
                DocOp::In(values) => json!({ "$in": values }),
                DocOp::Regex(regex) => json!({ "$regex": regex.as_str() }),
            };
            if let (Some(Value::Object(existing)), Value::Object(more)) =
                (filter.get_mut(&key), &rendered)
            {
                existing.extend(more.clone());
                continue;
            }
            filter.insert(key, rendered);
        }

        let mut document = Map::new();
        document.insert("filter".to_string(), Value::Object(filter));
        if !self.order.is_empty() {
            let sort: Map<String, Value> = self
                .order
                .iter()
                .map(|(field, direction)| {
                    let sign = match direction {
                        SortOrder::Asc => 1,
                        SortOrder::Desc => -1,
                    };
                    (field.raw().to_string(), Value::from(sign))
                })
                .collect();
            document.insert("sort".to_string(), Value::Object(sort));
        }
        if let Some(offset) = self.offset {
            document.insert("skip".to_string(), Value::from(offset));
        }
        if let Some(limit) = self.limit {
            document.insert("limit".to_string(), Value::from(limit));
        }
        Value::Object(document)
    }
}

fn clause_matches(op: &DocOp, actual: Option<&Value>) -> bool {
    match op {
        DocOp::Null => actual.map_or(true, Value::is_null),
        DocOp::NotNull => actual.is_some_and(|value| !value.is_null()),
        DocOp::Eq(expected) => actual.is_some_and(|value| contains_equal(value, expected)),
        DocOp::Ne(expected) => !actual.is_some_and(|value| contains_equal(value, expected)),
        DocOp::In(candidates) => actual.is_some_and(|value| {
            candidates
                .iter()
                .any(|candidate| contains_equal(value, candidate))
        }),
        DocOp::Lt(bound) => any_element(actual, |value| compare(value, bound) == Some(Ordering::Less)),
        DocOp::Gt(bound) => {
            any_element(actual, |value| compare(value, bound) == Some(Ordering::Greater))
        }
        DocOp::Lte(bound) => any_element(actual, |value| {
            matches!(compare(value, bound), Some(Ordering::Less | Ordering::Equal))
        }),
        DocOp::Gte(bound) => any_element(actual, |value| {
            matches!(compare(value, bound), Some(Ordering::Greater | Ordering::Equal))
        }),
        DocOp::Regex(regex) => any_element(actual, |value| {
            value.as_str().is_some_and(|text| regex.is_match(text))
        }),
    }
}

/// Applies `test` to a scalar, or to each element of an array.
fn any_element<F>(actual: Option<&Value>, test: F) -> bool
where
    F: Fn(&Value) -> bool,
{
    match actual {
        None => false,
        Some(Value::Array(items)) => items.iter().any(&test),
        Some(value) => test(value),
    }
}

/// Equality where a stored array matches an element equal to `expected`.
fn contains_equal(actual: &Value, expected: &Value) -> bool {
    if json_eq(actual, expected) {
        return true;
    }
    match (actual, expected) {
        (Value::Array(items), expected) if !expected.is_array() => {
            items.iter().any(|item| json_eq(item, expected))
        }
        _ => false,
    }
}

/// Structural equality with numbers compared by value (`1 == 1.0`).
fn json_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Orders two values of compatible kinds; `None` when they do not compare.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => {
            if let (Some(a), Some(b)) = (as_datetime(left), as_datetime(right)) {
                return Some(a.cmp(&b));
            }
            if let (Some(a), Some(b)) = (as_f64(left), as_f64(right)) {
                return a.partial_cmp(&b);
            }
            Some(a.cmp(b))
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(_), _) | (_, Value::Number(_)) => as_f64(left)?.partial_cmp(&as_f64(right)?),
        _ => None,
    }
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn sort_cmp(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(a), Some(b)) if rank(left) == rank(right) => compare(a, b).unwrap_or(Ordering::Equal),
        _ => rank(left).cmp(&rank(right)),
    }
}

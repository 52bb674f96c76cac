//! SQL rendering for the relational store.
//!
//! Every value reaches SQLite as a bound parameter; only identifiers are
//! spliced into statement text, always double-quoted.

use crate::adapter::error::{AdapterError, AdapterResult};
use crate::constants::{CREATED_AT, ID_FIELD, UPDATED_AT};
use crate::path::{loose_text, FieldPath, Segment};
use crate::query::{FilterOp, Predicate, QuerySpec, SortOrder};
use crate::schema::{FieldDescriptor, FieldKind, PropType, RecordSchema};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

/// How a column is declared and how values are converted on the way in and
/// out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// The autoincrement primary key
    Key,
    /// A reference to another record's key
    Id,
    Text,
    Numeric,
    Boolean,
    /// Lists, objects and nested records, stored as JSON text
    Json,
}

impl ColumnKind {
    pub fn of(field: &FieldDescriptor) -> Self {
        if field.array_of || matches!(field.kind, FieldKind::Nested(_)) {
            return ColumnKind::Json;
        }
        match field.prop_type() {
            PropType::Id => ColumnKind::Id,
            PropType::Number | PropType::Decimal => ColumnKind::Numeric,
            PropType::Boolean => ColumnKind::Boolean,
            PropType::Array | PropType::Object | PropType::Any => ColumnKind::Json,
            PropType::String | PropType::LongStr | PropType::DateTime => ColumnKind::Text,
        }
    }

    fn declaration(&self) -> &'static str {
        match self {
            ColumnKind::Key => "INTEGER PRIMARY KEY AUTOINCREMENT",
            ColumnKind::Id | ColumnKind::Numeric => "NUMERIC",
            ColumnKind::Boolean => "INTEGER",
            ColumnKind::Text | ColumnKind::Json => "TEXT",
        }
    }
}

/// A physical column of a schema's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    /// Element type of a JSON list column
    pub element: Option<PropType>,
    pub index: bool,
}

/// Columns of the table backing `schema`, in declaration order.
pub fn table_columns(schema: &RecordSchema) -> Vec<Column> {
    let mut columns = vec![Column {
        name: ID_FIELD.to_string(),
        kind: ColumnKind::Key,
        element: None,
        index: false,
    }];
    for (name, field) in schema.stored_fields() {
        columns.push(Column {
            name: name.to_string(),
            kind: ColumnKind::of(field),
            element: field.array_of.then(|| field.prop_type()),
            index: field.index,
        });
    }
    if schema.timestamps() {
        for name in [CREATED_AT, UPDATED_AT] {
            columns.push(Column {
                name: name.to_string(),
                kind: ColumnKind::Text,
                element: None,
                index: false,
            });
        }
    }
    columns
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` followed by one `CREATE INDEX` per indexed column.
pub fn create_table_statements(schema: &RecordSchema) -> Vec<String> {
    let columns = table_columns(schema);
    let table = quote_ident(schema.name());
    let definitions: Vec<String> = columns
        .iter()
        .map(|column| format!("{} {}", quote_ident(&column.name), column.kind.declaration()))
        .collect();

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table,
        definitions.join(", ")
    )];
    for column in columns.iter().filter(|column| column.index) {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&format!("idx_{}_{}", schema.name(), column.name)),
            table,
            quote_ident(&column.name)
        ));
    }
    statements
}

pub fn drop_table_statement(schema: &RecordSchema) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(schema.name()))
}

/// Converts a JSON value into the parameter stored in a column of `kind`.
pub fn to_sql(column: &Column, value: &Value) -> AdapterResult<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    Ok(match column.kind {
        ColumnKind::Key | ColumnKind::Id => key_value(value),
        ColumnKind::Numeric => match value {
            Value::Number(number) => number_value(number),
            Value::String(text) => numeric_text(text).unwrap_or_else(|| SqlValue::Text(text.clone())),
            Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
            other => SqlValue::Text(other.to_string()),
        },
        ColumnKind::Boolean => match value {
            Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
            Value::String(text) if text.eq_ignore_ascii_case("true") => SqlValue::Integer(1),
            Value::String(text) if text.eq_ignore_ascii_case("false") => SqlValue::Integer(0),
            Value::Number(number) => SqlValue::Integer(i64::from(number.as_f64() != Some(0.0))),
            other => SqlValue::Text(loose_text(other)),
        },
        ColumnKind::Text => SqlValue::Text(loose_text(value)),
        ColumnKind::Json => {
            let normalized = if column.element == Some(PropType::Id) {
                normalize_keys(value)
            } else {
                value.clone()
            };
            SqlValue::Text(serde_json::to_string(&normalized)?)
        }
    })
}

/// Reads a column back into JSON.
pub fn from_sql(column: &Column, raw: ValueRef<'_>) -> AdapterResult<Value> {
    Ok(match (column.kind, raw) {
        (_, ValueRef::Null) => Value::Null,
        (ColumnKind::Boolean, ValueRef::Integer(flag)) => Value::Bool(flag != 0),
        (ColumnKind::Json, ValueRef::Text(bytes)) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| AdapterError::Serialization(e.to_string()))?;
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        (_, raw) => scalar_from_sql(raw)?,
    })
}

/// Reads an untyped result (aggregates) back into JSON.
pub fn scalar_from_sql(raw: ValueRef<'_>) -> AdapterResult<Value> {
    Ok(match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(
            std::str::from_utf8(bytes)
                .map_err(|e| AdapterError::Serialization(e.to_string()))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    })
}

fn key_value(value: &Value) -> SqlValue {
    match value {
        Value::Number(number) => number_value(number),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(text.clone())),
        other => SqlValue::Text(loose_text(other)),
    }
}

/// Numeric strings in a key list become numbers so they compare with keys.
fn normalize_keys(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(normalize_keys).collect()),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn number_value(number: &Number) -> SqlValue {
    match number.as_i64() {
        Some(integer) => SqlValue::Integer(integer),
        None => SqlValue::Real(number.as_f64().unwrap_or_default()),
    }
}

fn numeric_text(text: &str) -> Option<SqlValue> {
    let text = text.trim();
    if let Ok(integer) = text.parse::<i64>() {
        return Some(SqlValue::Integer(integer));
    }
    text.parse::<f64>()
        .ok()
        .filter(|float| float.is_finite())
        .map(SqlValue::Real)
}

/// A filter operand after coercion of textual tokens.
enum Operand {
    Null,
    Value(SqlValue),
}

/// Bare values: `"null"` tests for NULL, `"true"`/`"false"` become 1/0 and
/// numeric strings compare as numbers.
fn coerce(value: &Value) -> AdapterResult<Operand> {
    Ok(match value {
        Value::Null => Operand::Null,
        Value::Bool(flag) => Operand::Value(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => Operand::Value(number_value(number)),
        Value::String(text) => {
            if text.eq_ignore_ascii_case("null") {
                Operand::Null
            } else if text.eq_ignore_ascii_case("true") {
                Operand::Value(SqlValue::Integer(1))
            } else if text.eq_ignore_ascii_case("false") {
                Operand::Value(SqlValue::Integer(0))
            } else {
                Operand::Value(numeric_text(text).unwrap_or_else(|| SqlValue::Text(text.clone())))
            }
        }
        other => Operand::Value(SqlValue::Text(serde_json::to_string(other)?)),
    })
}

fn coerce_value(value: &Value) -> AdapterResult<SqlValue> {
    Ok(match coerce(value)? {
        Operand::Null => SqlValue::Null,
        Operand::Value(value) => value,
    })
}

/// Statement fragments and their parameters, in statement order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlParts {
    /// ` WHERE ...` or empty
    pub where_clause: String,
    /// ` ORDER BY ...` or empty
    pub order_clause: String,
    /// ` LIMIT ? OFFSET ?` or empty
    pub limit_clause: String,
    pub where_params: Vec<SqlValue>,
    pub order_params: Vec<SqlValue>,
    pub limit_params: Vec<SqlValue>,
}

impl SqlParts {
    /// Parameters for a statement using every fragment
    pub fn all_params(&self) -> Vec<SqlValue> {
        let mut params = self.where_params.clone();
        params.extend(self.order_params.iter().cloned());
        params.extend(self.limit_params.iter().cloned());
        params
    }
}

/// Renders the filter, scope, order and pagination of `spec`.
pub fn render(schema: &RecordSchema, spec: &QuerySpec) -> AdapterResult<SqlParts> {
    let columns = table_columns(schema);
    let mut parts = SqlParts::default();
    let mut conditions = Vec::new();

    if let Some(index) = &spec.index {
        conditions.push(format!("{} = ?", quote_ident(ID_FIELD)));
        parts.where_params.push(key_value(index));
    } else {
        for predicate in &spec.filter {
            conditions.push(render_predicate(schema, &columns, predicate, &mut parts.where_params)?);
        }
        if let Some(scope) = spec.scope {
            conditions.push(format!(
                "julianday('now') - julianday({}) < ?",
                quote_ident(CREATED_AT)
            ));
            parts.where_params.push(SqlValue::Integer(scope.days()));
        }
    }
    if !conditions.is_empty() {
        parts.where_clause = format!(" WHERE {}", conditions.join(" AND "));
    }

    if spec.index.is_none() {
        let mut keys = Vec::with_capacity(spec.order.len());
        for (field, direction) in &spec.order {
            let (expression, _) = column_expr(schema, &columns, field, &mut parts.order_params)?;
            let direction = match direction {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            keys.push(format!("{} {}", expression, direction));
        }
        if !keys.is_empty() {
            parts.order_clause = format!(" ORDER BY {}", keys.join(", "));
        }

        match (spec.limit, spec.offset) {
            (Some(limit), offset) => {
                parts.limit_clause = " LIMIT ? OFFSET ?".to_string();
                parts.limit_params.push(SqlValue::Integer(to_i64(limit)));
                parts.limit_params.push(SqlValue::Integer(to_i64(offset.unwrap_or(0))));
            }
            (None, Some(offset)) => {
                parts.limit_clause = " LIMIT -1 OFFSET ?".to_string();
                parts.limit_params.push(SqlValue::Integer(to_i64(offset)));
            }
            (None, None) => {}
        }
    }

    Ok(parts)
}

/// Expression selecting `field` for an aggregate, with its parameters.
pub fn field_expr(schema: &RecordSchema, field: &FieldPath) -> AdapterResult<(String, Vec<SqlValue>)> {
    let mut params = Vec::new();
    let (expression, _) = column_expr(schema, &table_columns(schema), field, &mut params)?;
    Ok((expression, params))
}

fn to_i64(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// SQL expression for `field`, and whether it is a whole JSON list column.
fn column_expr(
    schema: &RecordSchema,
    columns: &[Column],
    field: &FieldPath,
    params: &mut Vec<SqlValue>,
) -> AdapterResult<(String, bool)> {
    let column = columns
        .iter()
        .find(|column| column.name == field.root_name())
        .ok_or_else(|| {
            AdapterError::invalid_query(
                schema.name(),
                format!("'{}' is not a column", field.root_name()),
            )
        })?;

    if field.is_top_level() {
        let is_list = column.kind == ColumnKind::Json
            && (column.element.is_some()
                || schema
                    .field(&column.name)
                    .is_some_and(|descriptor| descriptor.prop_type() == PropType::Array));
        return Ok((quote_ident(&column.name), is_list));
    }

    if column.kind != ColumnKind::Json {
        return Err(AdapterError::invalid_query(
            schema.name(),
            format!("'{}' has no inner fields", column.name),
        ));
    }

    let mut json_path = String::from("$");
    for segment in &field.segments()[1..] {
        match segment {
            Segment::Name(name) => {
                json_path.push_str(&format!(".\"{}\"", name.replace('"', "\\\"")))
            }
            Segment::Index(index) => json_path.push_str(&format!("[{}]", index)),
            Segment::Predicate { .. } => {
                return Err(AdapterError::invalid_query(
                    schema.name(),
                    format!("element predicates are not supported in filters: '{}'", field),
                ))
            }
        }
    }
    params.push(SqlValue::Text(json_path));
    Ok((format!("json_extract({}, ?)", quote_ident(&column.name)), false))
}

fn render_predicate(
    schema: &RecordSchema,
    columns: &[Column],
    predicate: &Predicate,
    params: &mut Vec<SqlValue>,
) -> AdapterResult<String> {
    let (expression, is_list) = column_expr(schema, columns, &predicate.field, params)?;

    let comparison = |symbol: &str, value: &Value, params: &mut Vec<SqlValue>| -> AdapterResult<String> {
        params.push(coerce_value(value)?);
        Ok(format!("{} {} ?", expression, symbol))
    };

    match &predicate.op {
        FilterOp::Eq(value) | FilterOp::Ne(value) => {
            let negate = matches!(predicate.op, FilterOp::Ne(_));
            match coerce(value)? {
                Operand::Null => Ok(format!(
                    "{} {}",
                    expression,
                    if negate { "IS NOT NULL" } else { "IS NULL" }
                )),
                Operand::Value(_) if is_list && !value.is_array() => {
                    let element = coerce_value(value)?;
                    params.push(element);
                    Ok(format!(
                        "{}EXISTS (SELECT 1 FROM json_each({}) WHERE value = ?)",
                        if negate { "NOT " } else { "" },
                        expression
                    ))
                }
                Operand::Value(operand) => {
                    params.push(operand);
                    Ok(format!("{} {} ?", expression, if negate { "<>" } else { "=" }))
                }
            }
        }
        FilterOp::Lt(value) => comparison("<", value, params),
        FilterOp::Gt(value) => comparison(">", value, params),
        FilterOp::Le(value) => comparison("<=", value, params),
        FilterOp::Ge(value) => comparison(">=", value, params),
        FilterOp::IsNull => Ok(format!("{} IS NULL", expression)),
        FilterOp::IsNotNull => Ok(format!("{} IS NOT NULL", expression)),
        FilterOp::Like(pattern) => {
            params.push(SqlValue::Text(pattern.clone()));
            Ok(format!("{} LIKE ?", expression))
        }
        FilterOp::In(values) => {
            if values.is_empty() {
                return Ok("0 = 1".to_string());
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            for value in values {
                params.push(coerce_value(value)?);
            }
            if is_list {
                Ok(format!(
                    "EXISTS (SELECT 1 FROM json_each({}) WHERE value IN ({}))",
                    expression, placeholders
                ))
            } else {
                Ok(format!("{} IN ({})", expression, placeholders))
            }
        }
    }
}

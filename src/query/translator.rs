use super::error::{TranslationError, TranslationResult};
use super::operator::{FilterOp, Operator};
use super::spec::{Condition, Predicate, QuerySpec, Scope, SelectOptions, SortOrder};
use crate::constants::{INDEX_KEY, LIMIT_KEY, OFFSET_KEY, ORDER_BY_KEY, SCOPE_KEY};
use crate::path::FieldPath;
use serde_json::Value;

/// Builds a read plan from an optional condition object.
///
/// `_index` short-circuits: every other key is ignored and the plan is a
/// primary-key lookup. Reserved keys never become filter predicates.
pub fn translate(condition: Option<&Condition>, options: &SelectOptions) -> TranslationResult<QuerySpec> {
    let mut spec = QuerySpec {
        select_columns: options.select_columns.clone(),
        extend: options.extend.clone(),
        ..QuerySpec::default()
    };

    let condition = match condition {
        Some(condition) => condition,
        None => return Ok(spec),
    };

    if let Some(index) = condition.get(INDEX_KEY).filter(|index| !index.is_null()) {
        spec.index = Some(index.clone());
        return Ok(spec);
    }

    for (key, value) in condition.iter() {
        match key.as_str() {
            INDEX_KEY => {}
            ORDER_BY_KEY => spec.order = parse_order(value)?,
            OFFSET_KEY => spec.offset = parse_count(key, value)?,
            LIMIT_KEY => spec.limit = parse_count(key, value)?,
            SCOPE_KEY => spec.scope = parse_scope(value)?,
            _ => spec.filter.push(parse_predicate(key, value)?),
        }
    }

    Ok(spec)
}

fn parse_predicate(key: &str, value: &Value) -> TranslationResult<Predicate> {
    let field = FieldPath::parse(key)?;
    let op = match value {
        Value::Array(items) => match items.first() {
            Some(Value::String(token)) => {
                let operator = token
                    .parse::<Operator>()
                    .map_err(|_| TranslationError::unknown_operator(key, token.clone()))?;
                build_op(key, operator, &items[1..])?
            }
            _ => FilterOp::Eq(value.clone()),
        },
        Value::Null => FilterOp::IsNull,
        other => FilterOp::Eq(other.clone()),
    };
    Ok(Predicate { field, op })
}

fn build_op(key: &str, operator: Operator, operands: &[Value]) -> TranslationResult<FilterOp> {
    if operator == Operator::In {
        return Ok(match operands {
            [Value::Array(list)] => FilterOp::In(list.clone()),
            _ => FilterOp::In(operands.to_vec()),
        });
    }

    let operand = match operands {
        [operand] => operand,
        _ => {
            return Err(TranslationError::bad_operand(
                key,
                format!("'{}' takes exactly one operand", operator),
            ))
        }
    };

    match operator {
        Operator::Eq | Operator::Ne => {
            let null = match operand {
                Value::Null => true,
                Value::String(text) => text.eq_ignore_ascii_case("null"),
                _ => false,
            };
            Ok(match (operator, null) {
                (Operator::Eq, true) => FilterOp::IsNull,
                (Operator::Eq, false) => FilterOp::Eq(operand.clone()),
                (_, true) => FilterOp::IsNotNull,
                (_, false) => FilterOp::Ne(operand.clone()),
            })
        }
        Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => {
            if !(operand.is_number() || operand.is_string()) {
                return Err(TranslationError::bad_operand(
                    key,
                    format!("'{}' needs a number or a string", operator),
                ));
            }
            let operand = operand.clone();
            Ok(match operator {
                Operator::Lt => FilterOp::Lt(operand),
                Operator::Gt => FilterOp::Gt(operand),
                Operator::Le => FilterOp::Le(operand),
                _ => FilterOp::Ge(operand),
            })
        }
        Operator::Like => match operand {
            Value::String(pattern) => Ok(FilterOp::Like(pattern.clone())),
            _ => Err(TranslationError::bad_operand(key, "'like' needs a string pattern")),
        },
        Operator::In => Ok(FilterOp::In(operands.to_vec())),
    }
}

fn parse_order(value: &Value) -> TranslationResult<Vec<(FieldPath, SortOrder)>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(field) => Ok(vec![(FieldPath::parse(field)?, SortOrder::Asc)]),
        Value::Object(fields) => fields
            .iter()
            .map(|(field, direction)| -> TranslationResult<(FieldPath, SortOrder)> {
                let direction = direction
                    .as_str()
                    .ok_or_else(|| TranslationError::invalid_order(format!("direction of '{}' must be a string", field)))?
                    .parse::<SortOrder>()
                    .map_err(TranslationError::invalid_order)?;
                Ok((FieldPath::parse(field)?, direction))
            })
            .collect(),
        other => Err(TranslationError::invalid_order(format!(
            "expected an object or a field name, got {}",
            other
        ))),
    }
}

fn parse_count(key: &str, value: &Value) -> TranslationResult<Option<u64>> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| TranslationError::invalid_pagination(key, value.to_string()))
}

fn parse_scope(value: &Value) -> TranslationResult<Option<Scope>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => text
            .parse::<Scope>()
            .map(Some)
            .map_err(|_| TranslationError::invalid_scope(text.clone())),
        other => Err(TranslationError::invalid_scope(other.to_string())),
    }
}

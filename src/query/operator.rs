use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operators accepted as the first element of a condition tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    In,
    Like,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::In => "in",
            Operator::Like => "like",
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "<" => Ok(Operator::Lt),
            ">" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Le),
            ">=" => Ok(Operator::Ge),
            "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            "in" => Ok(Operator::In),
            "like" => Ok(Operator::Like),
            _ => Err(format!("Unknown operator: {}", s)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed filter test, ready to be rendered by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Gt(Value),
    Le(Value),
    Ge(Value),
    IsNull,
    IsNotNull,
    In(Vec<Value>),
    /// Text pattern. Rendered as a regular expression by the document store
    /// and as a `LIKE` pattern by the relational store.
    Like(String),
}

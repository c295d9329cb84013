//! SQL expression operators.
//!
//! These structs represent predicates like `col = ?`, `col IN (?, ?)`, etc.
//! Each implements [`Expression`] and binds its own parameters.

use std::{fmt, str::FromStr};

use rusqlite::types::Value as SqlValue;

use crate::{expr::Col, filter::FilterError, traits::Expression};

/// A comparison operator accepted in filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

impl Operator {
    /// Parses an operator token, case-insensitively. `<>` is read as `!=`.
    pub fn parse(token: &str) -> Option<Self> {
        let op = match token.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::parse(s).ok_or_else(|| FilterError::InvalidOperator(s.to_string()))
    }
}

/// Represents a binary comparison (e.g., `=`, `>`, `LIKE`).
pub struct BinaryOp {
    column: Col,
    op: Operator,
    value: SqlValue,
}

impl BinaryOp {
    pub fn new(column: Col, op: Operator, value: SqlValue) -> Self {
        Self { column, op, value }
    }
}

impl Expression for BinaryOp {
    fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        let left_sql = self.column.to_sql(params);
        params.push(self.value.clone());
        format!("{} {} ?", left_sql, self.op.as_sql())
    }
}

/// Represents an `IN` or `NOT IN` clause.
///
/// An empty `IN` list matches nothing and an empty `NOT IN` list matches
/// everything.
pub struct InOp {
    column: Col,
    values: Vec<SqlValue>,
    negated: bool,
}

impl InOp {
    pub fn new(column: Col, values: Vec<SqlValue>, negated: bool) -> Self {
        Self {
            column,
            values,
            negated,
        }
    }
}

impl Expression for InOp {
    fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        if self.values.is_empty() {
            return if self.negated { "1 = 1" } else { "0 = 1" }.to_string();
        }
        let left_sql = self.column.to_sql(params);
        let placeholders = vec!["?"; self.values.len()].join(", ");
        params.extend(self.values.iter().cloned());
        let op = if self.negated { "NOT IN" } else { "IN" };
        format!("{} {} ({})", left_sql, op, placeholders)
    }
}

/// Represents an `IS NULL` or `IS NOT NULL` check.
pub struct NullOp {
    column: Col,
    is_null: bool,
}

impl NullOp {
    pub fn new(column: Col, is_null: bool) -> Self {
        Self { column, is_null }
    }
}

impl Expression for NullOp {
    fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        let left_sql = self.column.to_sql(params);
        let op = if self.is_null {
            "IS NULL"
        } else {
            "IS NOT NULL"
        };
        format!("{} {}", left_sql, op)
    }
}

/// Represents `BETWEEN` or `NOT BETWEEN`, inclusive on both bounds.
pub struct BetweenOp {
    column: Col,
    low: SqlValue,
    high: SqlValue,
    negated: bool,
}

impl BetweenOp {
    pub fn new(column: Col, low: SqlValue, high: SqlValue, negated: bool) -> Self {
        Self {
            column,
            low,
            high,
            negated,
        }
    }
}

impl Expression for BetweenOp {
    fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        let left_sql = self.column.to_sql(params);
        params.push(self.low.clone());
        params.push(self.high.clone());
        let op = if self.negated {
            "NOT BETWEEN"
        } else {
            "BETWEEN"
        };
        format!("{} {} ? AND ?", left_sql, op)
    }
}

/// Membership test against a JSON array column, using SQLite's `json_each`.
///
/// Every needle must be present. No needles matches everything.
pub struct JsonContainsOp {
    column: Col,
    needles: Vec<SqlValue>,
}

impl JsonContainsOp {
    pub fn new(column: Col, needles: Vec<SqlValue>) -> Self {
        Self { column, needles }
    }
}

impl Expression for JsonContainsOp {
    fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        if self.needles.is_empty() {
            return "1 = 1".to_string();
        }
        let left_sql = self.column.to_sql(params);
        let checks = self
            .needles
            .iter()
            .map(|needle| {
                params.push(needle.clone());
                format!("EXISTS (SELECT 1 FROM json_each({left_sql}) WHERE json_each.value = ?)")
            })
            .collect::<Vec<_>>();
        if checks.len() == 1 {
            checks.join("")
        } else {
            format!("({})", checks.join(" AND "))
        }
    }
}

/// Compares the length of a JSON array column.
pub struct JsonLengthOp {
    column: Col,
    op: Operator,
    length: i64,
}

impl JsonLengthOp {
    pub fn new(column: Col, op: Operator, length: i64) -> Self {
        Self { column, op, length }
    }
}

impl Expression for JsonLengthOp {
    fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        let left_sql = self.column.to_sql(params);
        params.push(SqlValue::Integer(self.length));
        format!("json_array_length({}) {} ?", left_sql, self.op.as_sql())
    }
}

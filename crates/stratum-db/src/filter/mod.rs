//! Generic filters and their translation into query predicates.
//!
//! A [`Filter`] is an ordered mapping from column name to [`Condition`].
//! Filters are usually built in code, or parsed from the loose JSON shape
//! callers send over the wire:
//!
//! ```text
//! { "status": 1,                          equality
//!   "age":    [">=", 18],                 comparison
//!   "role":   ["or", "=", "admin"],       OR-joined comparison
//!   "email":  ["null"],                   IS NULL
//!   "id":     ["in", [1, 2, 3]],
//!   "score":  ["between", [10, 20]],
//!   "tags":   ["json_contains", "rust"],
//!   "langs":  ["json_length", ">", 2],
//!   "skip":   [] }                        ignored
//! ```
//!
//! [`translate`] applies a filter to any [`crate::traits::Predicates`] sink.

mod parse;
mod translate;

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

pub use translate::translate;

use crate::expr::Operator;

#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid column name: {0:?}")]
    #[diagnostic(
        code(stratum_db::filter::invalid_column),
        help("Column names must be plain or dotted SQL identifiers")
    )]
    InvalidColumn(String),

    #[error("Invalid comparison operator: {0:?}")]
    #[diagnostic(
        code(stratum_db::filter::invalid_operator),
        help("Use one of: =, !=, <>, <, <=, >, >=, like, not like")
    )]
    InvalidOperator(String),

    #[error("Malformed condition for `{column}`: {reason}")]
    #[diagnostic(code(stratum_db::filter::malformed))]
    Malformed { column: String, reason: String },

    #[error("Filter must be a JSON object, got {0}")]
    #[diagnostic(code(stratum_db::filter::not_an_object))]
    NotAnObject(String),

    #[error("Invalid sort direction: {0:?}")]
    #[diagnostic(
        code(stratum_db::filter::invalid_direction),
        help("Use asc or desc")
    )]
    InvalidDirection(String),
}

impl FilterError {
    pub(crate) fn malformed(column: &str, reason: impl Into<String>) -> Self {
        FilterError::Malformed {
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}

/// A single column condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`, null-safe.
    Eq(Value),
    /// `column op value`, null-safe.
    Compare(Operator, Value),
    /// `OR column op value`, joined to the preceding predicate.
    Or(Operator, Value),
    Null,
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Between(Value, Value),
    NotBetween(Value, Value),
    JsonContains(Value),
    JsonLength(Operator, i64),
}

impl Condition {
    pub fn eq(value: impl Into<Value>) -> Self {
        Condition::Eq(value.into())
    }

    pub fn cmp(op: Operator, value: impl Into<Value>) -> Self {
        Condition::Compare(op, value.into())
    }

    pub fn or(op: Operator, value: impl Into<Value>) -> Self {
        Condition::Or(op, value.into())
    }

    pub fn is_in<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Condition::In(values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Condition::NotIn(values.into_iter().map(Into::into).collect())
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Condition::Between(low.into(), high.into())
    }

    pub fn not_between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Condition::NotBetween(low.into(), high.into())
    }
}

/// An ordered mapping from column name to condition.
///
/// Inserting a column that is already present replaces its condition in
/// place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Filter::insert`].
    pub fn with(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.insert(column, condition);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, condition: Condition) {
        let column = column.into();
        match self.conditions.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = condition,
            None => self.conditions.push((column, condition)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, cond)| cond)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(c, cond)| (c.as_str(), cond))
    }
}

impl<K: Into<String>> FromIterator<(K, Condition)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, Condition)>>(iter: I) -> Self {
        let mut filter = Filter::new();
        for (column, condition) in iter {
            filter.insert(column, condition);
        }
        filter
    }
}

impl TryFrom<&Value> for Filter {
    type Error = FilterError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Filter::from_json(value)
    }
}

//! Core traits that power the query builder.
//!
//! These traits define the contract for:
//! - Rendering SQL fragments with bound parameters (`Expression`)
//! - Receiving the predicates a filter translates into (`Predicates`)

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::expr::{Col, Operator};

/// A SQL fragment that binds its parameters as it renders.
///
/// When `to_sql` is called, it appends bound parameters to the provided `params` vector
/// and returns the SQL fragment (with `?` placeholders).
pub trait Expression {
    fn to_sql(&self, params: &mut Vec<SqlValue>) -> String;
}

/// A sink for query predicates.
///
/// [`crate::filter::translate`] drives one call per filter condition. The
/// [`crate::query::Query`] builder is the production implementation; any
/// other builder can implement it to receive the same calls.
///
/// Every method except [`Predicates::or_where`] joins its predicate to the
/// previous ones with `AND`.
pub trait Predicates {
    /// `column op value`. A `null` value becomes `IS NULL` for `=` and
    /// `IS NOT NULL` for any other operator.
    fn where_cmp(&mut self, column: Col, op: Operator, value: Value);

    /// Same as [`Predicates::where_cmp`] but joined with `OR`.
    fn or_where(&mut self, column: Col, op: Operator, value: Value);

    fn where_null(&mut self, column: Col);

    fn where_in(&mut self, column: Col, values: Vec<Value>);

    fn where_not_in(&mut self, column: Col, values: Vec<Value>);

    /// Inclusive on both bounds.
    fn where_between(&mut self, column: Col, low: Value, high: Value);

    fn where_not_between(&mut self, column: Col, low: Value, high: Value);

    /// The JSON array in `column` contains `value`, or every element of
    /// `value` when it is itself an array.
    fn where_json_contains(&mut self, column: Col, value: Value);

    fn where_json_length(&mut self, column: Col, op: Operator, length: i64);
}

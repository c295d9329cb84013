//! The main query builder implementation.

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use super::{
    clause::{render_wheres, Boolean, OrderClause, OrderDirection, WhereClause},
    quote_table,
};
use crate::{
    expr::{BetweenOp, BinaryOp, Col, InOp, JsonContainsOp, JsonLengthOp, NullOp, Operator},
    filter::{translate, Filter, FilterError},
    helpers::to_sql_value,
    traits::{Expression, Predicates},
};

/// A query against one table: projection, predicates, ordering, paging and
/// the soft-delete scope.
///
/// A `Query` does not execute anything. It renders parameterised SQL that a
/// [`crate::executor::QueryExecutor`] runs.
///
/// When the table has a soft-delete column, rows with that column set are
/// excluded unless [`Query::with_trashed`] or [`Query::only_trashed`] is
/// called. The scope predicate is added at render time; if the caller's
/// predicates contain an `OR` they are parenthesised first so the scope
/// applies to all of them.
///
/// # Example
///
/// ```rust
/// use stratum_db::{expr::{Col, Operator}, query::{OrderDirection, Query}, traits::Predicates};
///
/// let mut query = Query::from("users")
///     .soft_deletes(Col::new("deleted_at").unwrap())
///     .order_by(Col::new("id").unwrap(), OrderDirection::Desc)
///     .page(2, 10);
/// query.where_cmp(Col::new("age").unwrap(), Operator::Ge, 18.into());
///
/// let (sql, params) = query.build_sql();
/// assert_eq!(
///     sql,
///     r#"SELECT * FROM "users" WHERE "age" >= ? AND "deleted_at" IS NULL ORDER BY "id" DESC LIMIT 10 OFFSET 10"#
/// );
/// assert_eq!(params.len(), 1);
/// ```
pub struct Query {
    table: &'static str,
    columns: Vec<Col>,
    wheres: Vec<WhereClause>,
    orders: Vec<OrderClause>,
    limit: Option<u64>,
    offset: Option<u64>,
    soft_delete: Option<Col>,
    scope: Scope,
}

/// Which rows of a soft-delete table a query sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scope {
    /// Live rows only.
    #[default]
    Default,
    WithTrashed,
    OnlyTrashed,
}

impl Query {
    /// Starts a new query on the given table.
    pub fn from(table: &'static str) -> Self {
        Self {
            table,
            columns: vec![],
            wheres: vec![],
            orders: vec![],
            limit: None,
            offset: None,
            soft_delete: None,
            scope: Scope::Default,
        }
    }

    /// Marks `column` as the table's soft-delete column, enabling the
    /// default scope.
    pub fn soft_deletes(mut self, column: Col) -> Self {
        self.soft_delete = Some(column);
        self
    }

    /// Includes soft-deleted rows.
    pub fn with_trashed(mut self) -> Self {
        self.scope = Scope::WithTrashed;
        self
    }

    /// Only soft-deleted rows.
    pub fn only_trashed(mut self) -> Self {
        self.scope = Scope::OnlyTrashed;
        self
    }

    /// Select specific columns. An empty slice selects all columns.
    pub fn select(mut self, cols: &[Col]) -> Self {
        self.columns = cols.to_vec();
        self
    }

    /// Select all columns from the table
    pub fn select_all(mut self) -> Self {
        self.columns.clear();
        self
    }

    /// Applies every condition in `filter`.
    pub fn filter(mut self, filter: &Filter) -> Result<Self, FilterError> {
        translate(filter, &mut self)?;
        Ok(self)
    }

    /// Adds an ORDER BY clause.
    pub fn order_by(mut self, column: Col, direction: OrderDirection) -> Self {
        self.orders.push(OrderClause { column, direction });
        self
    }

    /// Limit the number of results. Values past `i64::MAX` are clamped.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(sql_int(limit));
        self
    }

    /// Set query offset. Values past `i64::MAX` are clamped.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(sql_int(offset));
        self
    }

    /// Set pagination params. Pages start at 1.
    pub fn page(mut self, page: u64, per_page: u64) -> Self {
        self.limit = Some(sql_int(per_page));
        self.offset = Some(sql_int(page.saturating_sub(1).saturating_mul(per_page)));
        self
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn soft_delete_column(&self) -> Option<&Col> {
        self.soft_delete.as_ref()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Whether the rendered WHERE clause will exclude trashed rows.
    pub fn is_scoped(&self) -> bool {
        self.soft_delete.is_some() && self.scope == Scope::Default
    }

    fn push(&mut self, boolean: Boolean, expr: impl Expression + Send + Sync + 'static) {
        self.wheres.push(WhereClause::new(boolean, expr));
    }

    fn push_cmp(&mut self, boolean: Boolean, column: Col, op: Operator, value: Value) {
        if value.is_null() {
            self.push(boolean, NullOp::new(column, op == Operator::Eq));
        } else {
            self.push(boolean, BinaryOp::new(column, op, to_sql_value(&value)));
        }
    }

    /// The WHERE body, scope included, or `None` when nothing constrains the
    /// query.
    pub(crate) fn where_sql(&self, params: &mut Vec<SqlValue>) -> Option<String> {
        let scope = self.soft_delete.as_ref().and_then(|col| match self.scope {
            Scope::Default => Some(format!("{} IS NULL", col.quoted())),
            Scope::OnlyTrashed => Some(format!("{} IS NOT NULL", col.quoted())),
            Scope::WithTrashed => None,
        });

        if self.wheres.is_empty() {
            return scope;
        }

        let user = render_wheres(&self.wheres, params);
        Some(match scope {
            None => user,
            Some(scope) if self.wheres.iter().any(|w| w.boolean == Boolean::Or) => {
                format!("({user}) AND {scope}")
            }
            Some(scope) => format!("{user} AND {scope}"),
        })
    }

    pub(crate) fn push_where(&self, sql: &mut String, params: &mut Vec<SqlValue>) {
        if let Some(conditions) = self.where_sql(params) {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions);
        }
    }

    pub fn build_sql(&self) -> (String, Vec<SqlValue>) {
        let mut params = vec![];

        let select = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(Col::quoted)
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", select, quote_table(self.table));
        self.push_where(&mut sql, &mut params);

        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            let orders = self
                .orders
                .iter()
                .map(|o| format!("{} {}", o.column.quoted(), o.direction.as_sql()))
                .collect::<Vec<_>>();
            sql.push_str(&orders.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        (sql, params)
    }

    /// `SELECT COUNT(*)` over the same predicates. Projection, ordering and
    /// paging are ignored.
    pub fn build_count_sql(&self) -> (String, Vec<SqlValue>) {
        let mut params = vec![];
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote_table(self.table));
        self.push_where(&mut sql, &mut params);
        (sql, params)
    }

    pub fn build_sum_sql(&self, column: &Col) -> (String, Vec<SqlValue>) {
        let mut params = vec![];
        let mut sql = format!(
            "SELECT SUM({}) FROM {}",
            column.quoted(),
            quote_table(self.table)
        );
        self.push_where(&mut sql, &mut params);
        (sql, params)
    }
}

impl Predicates for Query {
    fn where_cmp(&mut self, column: Col, op: Operator, value: Value) {
        self.push_cmp(Boolean::And, column, op, value);
    }

    fn or_where(&mut self, column: Col, op: Operator, value: Value) {
        self.push_cmp(Boolean::Or, column, op, value);
    }

    fn where_null(&mut self, column: Col) {
        self.push(Boolean::And, NullOp::new(column, true));
    }

    fn where_in(&mut self, column: Col, values: Vec<Value>) {
        let values = values.iter().map(to_sql_value).collect();
        self.push(Boolean::And, InOp::new(column, values, false));
    }

    fn where_not_in(&mut self, column: Col, values: Vec<Value>) {
        let values = values.iter().map(to_sql_value).collect();
        self.push(Boolean::And, InOp::new(column, values, true));
    }

    fn where_between(&mut self, column: Col, low: Value, high: Value) {
        self.push(
            Boolean::And,
            BetweenOp::new(column, to_sql_value(&low), to_sql_value(&high), false),
        );
    }

    fn where_not_between(&mut self, column: Col, low: Value, high: Value) {
        self.push(
            Boolean::And,
            BetweenOp::new(column, to_sql_value(&low), to_sql_value(&high), true),
        );
    }

    fn where_json_contains(&mut self, column: Col, value: Value) {
        let needles = match &value {
            Value::Array(items) => items.iter().map(to_sql_value).collect(),
            other => vec![to_sql_value(other)],
        };
        self.push(Boolean::And, JsonContainsOp::new(column, needles));
    }

    fn where_json_length(&mut self, column: Col, op: Operator, length: i64) {
        self.push(Boolean::And, JsonLengthOp::new(column, op, length));
    }
}

/// SQLite integers are signed 64-bit.
fn sql_int(value: u64) -> u64 {
    value.min(i64::MAX as u64)
}

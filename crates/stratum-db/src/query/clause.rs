//! Internal representation of query clauses.

use std::{fmt, str::FromStr};

use rusqlite::types::Value as SqlValue;

use crate::{expr::Col, filter::FilterError, traits::Expression};

/// How a WHERE predicate joins the one before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Boolean {
    And,
    Or,
}

/// A WHERE predicate and the connective that precedes it.
pub(crate) struct WhereClause {
    pub boolean: Boolean,
    pub expr: Box<dyn Expression + Send + Sync>,
}

impl WhereClause {
    pub fn new(boolean: Boolean, expr: impl Expression + Send + Sync + 'static) -> Self {
        Self {
            boolean,
            expr: Box::new(expr),
        }
    }
}

/// Renders a clause list, omitting the connective of the first clause.
pub(crate) fn render_wheres(clauses: &[WhereClause], params: &mut Vec<SqlValue>) -> String {
    let mut sql = String::new();
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            sql.push_str(match clause.boolean {
                Boolean::And => " AND ",
                Boolean::Or => " OR ",
            });
        }
        sql.push_str(&clause.expr.to_sql(params));
    }
    sql
}

/// An ORDER BY clause.
pub(crate) struct OrderClause {
    pub column: Col,
    pub direction: OrderDirection,
}

/// Sort direction for ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "asc"),
            OrderDirection::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for OrderDirection {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            _ => Err(FilterError::InvalidDirection(s.to_string())),
        }
    }
}

//! Query execution.
//!
//! [`QueryExecutor`] is the seam between the repository and the database.
//! [`SqliteExecutor`] runs queries on a shared rusqlite connection.

use std::sync::MutexGuard;

use rusqlite::{types::Value as SqlValue, Connection, ToSql};
use serde_json::{Number, Value};
use tracing::{debug, trace};

use crate::{
    connection::SharedConnection,
    error::{DbError, Result},
    expr::{Col, Operator},
    helpers::{from_sql_value, Row},
    query::{InsertQuery, Query},
    traits::Predicates,
};

/// Runs rendered queries and maps results back to rows.
pub trait QueryExecutor: Send + Sync {
    /// All rows matching the query.
    fn get(&self, query: &Query) -> Result<Vec<Row>>;

    /// The first matching row.
    fn first(&self, query: Query) -> Result<Option<Row>> {
        let mut rows = self.get(&query.limit(1))?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// The row whose `key` equals `id`, within the query's scope.
    fn find(&self, mut query: Query, key: &Col, id: &Value) -> Result<Option<Row>> {
        query.where_cmp(key.clone(), Operator::Eq, id.clone());
        self.first(query)
    }

    fn count(&self, query: &Query) -> Result<u64>;

    /// `SUM(column)`, or `0` when no row matches.
    fn sum(&self, query: &Query, column: &Col) -> Result<Number>;

    /// Inserts the rows and returns the last inserted rowid, if any.
    fn insert(&self, query: &InsertQuery) -> Result<Option<i64>>;

    /// Applies `patch` to every matching row. Returns the number of rows
    /// changed.
    fn update(&self, query: &Query, patch: &Row) -> Result<u64>;

    fn delete(&self, query: &Query) -> Result<u64>;

    /// Clears the soft-delete column on every row the query matches. Pass a
    /// [`Query::only_trashed`] or [`Query::with_trashed`] query; the default
    /// scope never matches a trashed row.
    fn restore(&self, query: Query, column: &Col) -> Result<u64> {
        let mut patch = Row::new();
        patch.insert(column.name().to_string(), Value::Null);
        self.update(&query, &patch)
    }
}

/// Executes queries on a shared SQLite connection.
///
/// The connection lock is held for one statement at a time.
#[derive(Clone)]
pub struct SqliteExecutor {
    db: SharedConnection,
}

impl SqliteExecutor {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &SharedConnection {
        &self.db
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| DbError::ConnectionError(format!("connection lock poisoned: {e}")))
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!(sql = %sql, params = params.len(), "execute");
        let conn = self.lock()?;
        let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let changed = conn.execute(sql, params_ref.as_slice())?;
        trace!(changed, "statement finished");
        Ok(changed as u64)
    }
}

impl QueryExecutor for SqliteExecutor {
    fn get(&self, query: &Query) -> Result<Vec<Row>> {
        let (sql, params) = query.build_sql();
        debug!(sql = %sql, params = params.len(), "select");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let params_ref: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
        let rows = stmt.query_map(params_ref.as_slice(), |row| {
            let mut map = Row::new();
            for (i, name) in names.iter().enumerate() {
                map.insert(name.clone(), from_sql_value(row.get_ref(i)?));
            }
            Ok(map)
        })?;

        let rows = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn count(&self, query: &Query) -> Result<u64> {
        let (sql, params) = query.build_count_sql();
        debug!(sql = %sql, params = params.len(), "count");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
        let count: i64 = stmt.query_row(params_ref.as_slice(), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn sum(&self, query: &Query, column: &Col) -> Result<Number> {
        let (sql, params) = query.build_sum_sql(column);
        debug!(sql = %sql, params = params.len(), "sum");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
        let total = stmt.query_row(params_ref.as_slice(), |row| Ok(from_sql_value(row.get_ref(0)?)))?;

        Ok(match total {
            Value::Number(n) => n,
            _ => Number::from(0),
        })
    }

    fn insert(&self, query: &InsertQuery) -> Result<Option<i64>> {
        if query.is_empty() {
            return Ok(None);
        }
        let (sql, params) = query.build_sql();
        debug!(sql = %sql, rows = query.row_count(), "insert");

        let conn = self.lock()?;
        let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        conn.execute(&sql, params_ref.as_slice())?;
        Ok(Some(conn.last_insert_rowid()))
    }

    fn update(&self, query: &Query, patch: &Row) -> Result<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        let (sql, params) = query.build_update_sql(patch)?;
        self.execute(&sql, &params)
    }

    fn delete(&self, query: &Query) -> Result<u64> {
        let (sql, params) = query.build_delete_sql();
        self.execute(&sql, &params)
    }
}

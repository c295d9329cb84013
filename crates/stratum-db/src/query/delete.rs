use rusqlite::types::Value as SqlValue;

use super::{quote_table, Query};

impl Query {
    /// `DELETE FROM` constrained by this query's predicates and scope.
    pub fn build_delete_sql(&self) -> (String, Vec<SqlValue>) {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", quote_table(self.table()));
        self.push_where(&mut sql, &mut params);
        (sql, params)
    }
}

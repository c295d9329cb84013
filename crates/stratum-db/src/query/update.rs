use rusqlite::types::Value as SqlValue;

use super::{quote_table, Query};
use crate::{expr::Col, filter::FilterError, helpers::{to_sql_value, Row}};

impl Query {
    /// `UPDATE ... SET` for every column in `patch`, constrained by this
    /// query's predicates and scope. SET parameters bind before WHERE
    /// parameters.
    pub fn build_update_sql(&self, patch: &Row) -> Result<(String, Vec<SqlValue>), FilterError> {
        let mut params = Vec::new();

        let sets = patch
            .iter()
            .map(|(column, value)| {
                let col = Col::new(column.as_str())?;
                params.push(to_sql_value(value));
                Ok(format!("{} = ?", col.quoted()))
            })
            .collect::<Result<Vec<_>, FilterError>>()?;

        let mut sql = format!("UPDATE {} SET {}", quote_table(self.table()), sets.join(", "));
        self.push_where(&mut sql, &mut params);

        Ok((sql, params))
    }
}

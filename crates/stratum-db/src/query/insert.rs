use rusqlite::types::Value as SqlValue;

use super::quote_table;
use crate::{
    expr::Col,
    filter::FilterError,
    helpers::{to_sql_value, Row},
};

/// A single or multi-row `INSERT`.
///
/// The column list is the union of every row's keys in first-seen order;
/// a row that lacks one of them binds `NULL` there.
pub struct InsertQuery {
    table: &'static str,
    columns: Vec<Col>,
    rows: Vec<Vec<SqlValue>>,
}

impl InsertQuery {
    pub fn into(table: &'static str) -> Self {
        Self {
            table,
            columns: vec![],
            rows: vec![],
        }
    }

    /// Builds an insert for all of `rows`.
    pub fn rows(table: &'static str, rows: &[Row]) -> Result<Self, FilterError> {
        let mut columns: Vec<Col> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c.name() == key) {
                    columns.push(Col::new(key.as_str())?);
                }
            }
        }

        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| row.get(col.name()).map_or(SqlValue::Null, to_sql_value))
                    .collect()
            })
            .collect();

        Ok(Self {
            table,
            columns,
            rows,
        })
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn build_sql(&self) -> (String, Vec<SqlValue>) {
        if self.columns.is_empty() {
            return (
                format!("INSERT INTO {} DEFAULT VALUES", quote_table(self.table)),
                vec![],
            );
        }

        let columns = self
            .columns
            .iter()
            .map(Col::quoted)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let values = vec![placeholders.as_str(); self.rows.len()].join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_table(self.table),
            columns,
            values
        );

        (sql, self.rows.iter().flatten().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::helpers::row_from_json;

    #[test]
    fn test_multi_row_insert_unions_columns() {
        let rows = vec![
            row_from_json(json!({"title": "a", "body": "x"})),
            row_from_json(json!({"title": "b", "flag": true})),
        ];
        let (sql, params) = InsertQuery::rows("notes", &rows).unwrap().build_sql();

        assert_eq!(
            sql,
            r#"INSERT INTO "notes" ("title", "body", "flag") VALUES (?, ?, ?), (?, ?, ?)"#
        );
        assert_eq!(
            params,
            vec![
                SqlValue::Text("a".into()),
                SqlValue::Text("x".into()),
                SqlValue::Null,
                SqlValue::Text("b".into()),
                SqlValue::Null,
                SqlValue::Integer(1),
            ]
        );
    }

    #[test]
    fn test_empty_row_uses_default_values() {
        let query = InsertQuery::rows("notes", &[Row::new()]).unwrap();
        assert_eq!(query.build_sql().0, r#"INSERT INTO "notes" DEFAULT VALUES"#);
        assert!(InsertQuery::into("notes").is_empty());
    }

    #[test]
    fn test_rejects_bad_column() {
        let rows = vec![row_from_json(json!({"a) VALUES (1); --": 1}))];
        assert!(InsertQuery::rows("notes", &rows).is_err());
    }
}

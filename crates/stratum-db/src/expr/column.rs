//! Validated column references.
//!
//! Column names come from callers at runtime (filter keys, projections,
//! patch maps), so every name is checked against a plain identifier pattern
//! before it is spliced into SQL. Values never are; they are always bound.

use std::{fmt, sync::OnceLock};

use regex::Regex;
use rusqlite::types::Value as SqlValue;

use crate::{filter::FilterError, traits::Expression};

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
            .expect("identifier pattern is valid")
    })
}

/// A column name that is safe to render into SQL.
///
/// Accepts `name` or `table.name`.
///
/// # Example
///
/// ```rust
/// use stratum_db::expr::Col;
///
/// let col = Col::new("users.email").unwrap();
/// assert_eq!(col.quoted(), r#""users"."email""#);
/// assert!(Col::new("email; DROP TABLE users").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Col {
    name: String,
}

impl Col {
    pub fn new(name: impl Into<String>) -> Result<Self, FilterError> {
        let name = name.into();
        if identifier_re().is_match(&name) {
            Ok(Self { name })
        } else {
            Err(FilterError::InvalidColumn(name))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The column as a quoted SQL identifier.
    pub fn quoted(&self) -> String {
        self.name
            .split('.')
            .map(|part| format!("\"{part}\""))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Col {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Expression for Col {
    fn to_sql(&self, _params: &mut Vec<SqlValue>) -> String {
        self.quoted()
    }
}

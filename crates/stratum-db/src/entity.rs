//! Compile-time entity descriptors.
//!
//! An [`Entity`] describes one table: its name, primary key, ordered field
//! list and optional soft-delete, timestamp and transform settings. Most
//! entities are declared with [`crate::define_entity!`]; implement the trait
//! by hand to add [`Entity::appended`] fields.

use serde_json::Value;

use crate::{
    error::{DbError, Result},
    expr::Col,
    helpers::Row,
};

/// How a field is stored and read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Boolean,
    /// Stored as JSON text, parsed back on serialization.
    Json,
    /// Stored as `YYYY-MM-DD HH:MM:SS` in UTC.
    Timestamp,
}

/// One declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub transformed: bool,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            transformed: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Values assigned to this field are encoded at rest.
    pub const fn transformed(mut self) -> Self {
        self.transformed = true;
        self
    }
}

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

pub trait Entity: Send + Sync + 'static {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    const FIELDS: &'static [Field];
    const SOFT_DELETE: Option<&'static str> = None;
    /// Maintain `created_at` and `updated_at`.
    const TIMESTAMPS: bool = false;
    /// Key for transformed fields. May be overridden per table by
    /// configuration.
    const TRANSFORM_KEY: Option<&'static str> = None;

    fn field(name: &str) -> Option<&'static Field> {
        Self::FIELDS.iter().find(|f| f.name == name)
    }

    fn transform_columns() -> Vec<&'static str> {
        Self::FIELDS
            .iter()
            .filter(|f| f.transformed)
            .map(|f| f.name)
            .collect()
    }

    /// Computed output fields, added during serialization after casts.
    fn appended(_attributes: &Row) -> Vec<(String, Value)> {
        Vec::new()
    }

    /// Checks the descriptor for mistakes that would otherwise surface as
    /// broken SQL.
    fn validate() -> Result<()> {
        let table = Self::TABLE;
        Col::new(table).map_err(|_| DbError::configuration(table, "table name is not an identifier"))?;

        for (i, field) in Self::FIELDS.iter().enumerate() {
            Col::new(field.name).map_err(|_| {
                DbError::configuration(table, format!("field `{}` is not an identifier", field.name))
            })?;
            if Self::FIELDS[..i].iter().any(|f| f.name == field.name) {
                return Err(DbError::configuration(
                    table,
                    format!("field `{}` is declared twice", field.name),
                ));
            }
        }

        if Self::field(Self::PRIMARY_KEY).is_none() {
            return Err(DbError::configuration(
                table,
                format!("primary key `{}` is not a declared field", Self::PRIMARY_KEY),
            ));
        }

        if let Some(column) = Self::SOFT_DELETE {
            if Self::field(column).is_none() {
                return Err(DbError::configuration(
                    table,
                    format!("soft delete column `{column}` is not a declared field"),
                ));
            }
        }

        if Self::TIMESTAMPS {
            for column in [CREATED_AT, UPDATED_AT] {
                if Self::field(column).is_none() {
                    return Err(DbError::configuration(
                        table,
                        format!("timestamps enabled but `{column}` is not declared"),
                    ));
                }
            }
        }

        if Self::TRANSFORM_KEY == Some("") {
            return Err(DbError::configuration(table, "transform key is empty"));
        }

        Ok(())
    }
}

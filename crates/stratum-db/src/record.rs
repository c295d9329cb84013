//! A single entity row with assignment casts and output serialization.
//!
//! Assignments go through [`Record::set_attribute`], which encodes
//! transformed columns and applies the field's write cast. Rows loaded from
//! storage are taken as-is. [`Record::to_map`] produces the caller-facing
//! mapping: read casts, then appended fields, then transform decode.

use std::{marker::PhantomData, sync::Arc};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::{
    entity::{Entity, FieldKind},
    error::{DbError, Result},
    helpers::Row,
    transform::FieldTransform,
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current UTC time in storage format.
pub fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

pub struct Record<E: Entity> {
    attributes: Row,
    original: Row,
    exists: bool,
    transform: Arc<FieldTransform>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Record<E> {
    /// A new, unsaved record.
    pub fn new(transform: Arc<FieldTransform>) -> Self {
        Self {
            attributes: Row::new(),
            original: Row::new(),
            exists: false,
            transform,
            _entity: PhantomData,
        }
    }

    /// A record for a row read from storage. Values are kept exactly as
    /// stored.
    pub fn from_row(row: Row, transform: Arc<FieldTransform>) -> Self {
        Self {
            original: row.clone(),
            attributes: row,
            exists: true,
            transform,
            _entity: PhantomData,
        }
    }

    /// Assigns one column.
    ///
    /// Transformed columns are encoded and skip casts; other columns get
    /// their write cast. Undeclared columns are rejected.
    pub fn set_attribute(&mut self, key: &str, value: Value) -> Result<&mut Self> {
        let field = E::field(key).ok_or_else(|| DbError::UnknownColumn {
            table: E::TABLE.to_string(),
            column: key.to_string(),
        })?;

        let stored = if self.transform.applies_to(key) {
            self.transform.encode_value(&value)
        } else {
            cast_for_storage(field.kind, value)
        };

        self.attributes.insert(key.to_string(), stored);
        Ok(self)
    }

    /// Assigns every entry of `data`, in order.
    pub fn fill(&mut self, data: Row) -> Result<&mut Self> {
        for (key, value) in data {
            self.set_attribute(&key, value)?;
        }
        Ok(self)
    }

    /// Stores a value without casts or encoding.
    pub(crate) fn set_raw(&mut self, key: &str, value: Value) {
        self.attributes.insert(key.to_string(), value);
    }

    /// The stored form of a column.
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The logical value of a column: decoded if transformed, read-cast
    /// otherwise.
    pub fn get_attribute(&self, key: &str) -> Result<Option<Value>> {
        let Some(value) = self.attributes.get(key) else {
            return Ok(None);
        };
        if self.transform.applies_to(key) {
            return Ok(Some(self.transform.decode_value(value)?));
        }
        Ok(Some(match E::field(key) {
            Some(field) => cast_for_output(field.kind, value.clone()),
            None => value.clone(),
        }))
    }

    pub fn key(&self) -> Option<&Value> {
        self.attributes.get(E::PRIMARY_KEY).filter(|v| !v.is_null())
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Stored attributes, encoded columns included.
    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Columns whose stored value differs from what was loaded or last
    /// persisted.
    pub fn dirty(&self) -> Row {
        self.attributes
            .iter()
            .filter(|(key, value)| self.original.get(key.as_str()) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes
            .iter()
            .any(|(key, value)| self.original.get(key.as_str()) != Some(value))
    }

    /// Records that the current attributes are what storage holds.
    pub(crate) fn mark_persisted(&mut self) {
        self.original = self.attributes.clone();
        self.exists = true;
    }

    /// The caller-facing mapping.
    pub fn to_map(&self) -> Result<Row> {
        let mut out = Row::new();
        for (key, value) in &self.attributes {
            let value = match E::field(key) {
                Some(field) if !self.transform.applies_to(key) => {
                    cast_for_output(field.kind, value.clone())
                }
                _ => value.clone(),
            };
            out.insert(key.clone(), value);
        }

        for (key, value) in E::appended(&self.attributes) {
            out.insert(key, value);
        }

        for column in self.transform.columns() {
            if let Some(value) = out.get_mut(column) {
                *value = self.transform.decode_value(value)?;
            }
        }

        Ok(out)
    }
}

fn cast_for_storage(kind: FieldKind, value: Value) -> Value {
    match (kind, value) {
        (_, Value::Null) => Value::Null,
        (FieldKind::Json, value) => Value::String(value.to_string()),
        (FieldKind::Timestamp, Value::String(s)) => {
            Value::String(normalize_timestamp(&s).unwrap_or(s))
        }
        (FieldKind::Timestamp, Value::Number(n)) => {
            match n.as_i64().and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)) {
                Some(dt) => Value::String(dt.format(TIMESTAMP_FORMAT).to_string()),
                None => Value::Number(n),
            }
        }
        (_, value) => value,
    }
}

fn cast_for_output(kind: FieldKind, value: Value) -> Value {
    match (kind, value) {
        (FieldKind::Json, Value::String(s)) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        (FieldKind::Boolean, Value::Number(n)) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
        (FieldKind::Boolean, Value::String(s)) => match s.as_str() {
            "0" | "" | "false" => Value::Bool(false),
            "1" | "true" => Value::Bool(true),
            _ => Value::String(s),
        },
        (_, value) => value,
    }
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS` (optionally with a `T`
/// separator) and returns the storage form in UTC.
fn normalize_timestamp(input: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

//! Generic repository access for SQLite-backed entities.
//!
//! Entities are declared with [`define_entity!`]; a [`Repository`] turns
//! JSON-shaped [`Filter`]s into parameterised queries, encodes transformed
//! columns on the way in and decodes them on the way out.

pub mod cache;
pub mod connection;
pub mod entity;
pub mod error;
pub mod executor;
pub mod expr;
pub mod filter;
pub mod helpers;
pub mod logging;
pub mod macros;
pub mod query;
pub mod record;
pub mod repository;
pub mod traits;
pub mod transform;

#[cfg(test)]
mod test_utils;

pub use cache::{EntityCache, MemoryCache};
pub use connection::SharedConnection;
pub use entity::{Entity, Field, FieldKind};
pub use error::{DbError, Result};
pub use executor::{QueryExecutor, SqliteExecutor};
pub use filter::{translate, Condition, Filter, FilterError};
pub use helpers::Row;
pub use query::{InsertQuery, OrderDirection, Query, Scope};
pub use record::Record;
pub use repository::{Columns, ListResult, OrderBy, Repository};
pub use traits::{Expression, Predicates};
pub use transform::{FieldTransform, TransformError};

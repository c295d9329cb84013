//! The query builder.
//!
//! [`Query`] collects a projection, predicates, ordering, paging and the
//! soft-delete scope, and renders them as `SELECT`, `COUNT`, `SUM`, `UPDATE`
//! or `DELETE` statements. [`InsertQuery`] renders single and multi-row
//! inserts. Every value is bound as a parameter; every column name has been
//! validated by [`crate::expr::Col`].
//!
//! # Submodules
//!
//! - [`clause`] - WHERE and ORDER BY clause types.
//! - [`select`] - [`Query`] and its SELECT/COUNT/SUM rendering.
//! - [`insert`] - [`InsertQuery`].
//! - `update` / `delete` - UPDATE and DELETE rendering for [`Query`].

pub mod clause;
mod delete;
pub mod insert;
pub mod select;
mod update;

pub use clause::OrderDirection;
pub use insert::InsertQuery;
pub use select::{Query, Scope};

/// Quotes a table name taken from an entity definition.
pub(crate) fn quote_table(name: &str) -> String {
    format!("\"{name}\"")
}

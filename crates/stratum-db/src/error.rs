//! Error types for stratum-db.

use miette::Diagnostic;
use stratum_config::error::ConfigError;
use thiserror::Error;

use crate::{filter::FilterError, transform::TransformError};

/// Database error type for stratum-db operations.
#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    #[diagnostic(
        code(stratum_db::connection),
        help("Check if the database file exists and is accessible")
    )]
    ConnectionError(String),

    #[error("Database query failed: {0}")]
    #[diagnostic(code(stratum_db::query))]
    QueryError(#[from] rusqlite::Error),

    #[error("Invalid entity configuration for `{entity}`: {message}")]
    #[diagnostic(
        code(stratum_db::configuration),
        help("Fix the entity definition or the [transform.keys] entry for this table")
    )]
    Configuration { entity: String, message: String },

    #[error("Unknown column `{column}` on table `{table}`")]
    #[diagnostic(
        code(stratum_db::unknown_column),
        help("Only columns declared in the entity's field list can be assigned")
    )]
    UnknownColumn { table: String, column: String },

    #[error("Table `{0}` does not support soft deletes")]
    #[diagnostic(
        code(stratum_db::soft_delete_unsupported),
        help("Declare a soft_delete column on the entity to restore or trash rows")
    )]
    SoftDeleteUnsupported(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to install log subscriber: {0}")]
    #[diagnostic(code(stratum_db::logging))]
    Logging(String),

    #[error("IO error: {0}")]
    #[diagnostic(
        code(stratum_db::io),
        help("Check file permissions and disk space")
    )]
    IoError(#[from] std::io::Error),
}

impl DbError {
    pub(crate) fn configuration(entity: &str, message: impl Into<String>) -> Self {
        DbError::Configuration {
            entity: entity.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for stratum-db operations.
pub type Result<T> = std::result::Result<T, DbError>;

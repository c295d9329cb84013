//! Database connection management.
//!
//! A connection is opened once and shared as [`SharedConnection`]; the
//! executor locks it for one statement at a time.

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use rusqlite::{config::DbConfig, Connection};
use stratum_config::{Config, DatabaseConfig, JournalMode};
use tracing::{debug, info};

use crate::error::{DbError, Result};

pub type SharedConnection = Arc<Mutex<Connection>>;

/// Opens the database described by a `[database]` section. Missing values
/// fall back to the defaults: `stratum.db`, 5000 ms busy timeout, WAL.
pub fn open(config: &DatabaseConfig) -> Result<SharedConnection> {
    let path = config.path.as_deref().unwrap_or("stratum.db");
    open_path(
        path,
        config.busy_timeout_ms.unwrap_or(5000),
        config.journal_mode.unwrap_or_default(),
    )
}

/// Like [`open`], but honours the `STRATUM_DB_PATH` override.
pub fn open_from_config(config: &Config) -> Result<SharedConnection> {
    let path = config.get_db_path()?;
    open_path(path, config.busy_timeout_ms(), config.journal_mode())
}

pub fn open_path<P: AsRef<Path>>(
    path: P,
    busy_timeout_ms: u64,
    journal_mode: JournalMode,
) -> Result<SharedConnection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path).map_err(|e| {
        DbError::ConnectionError(format!("failed to open {}: {e}", path.display()))
    })?;
    strict_identifiers(&conn)?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    conn.execute_batch(&format!("PRAGMA journal_mode = {journal_mode};"))?;

    info!(path = %path.display(), %journal_mode, "opened database");
    Ok(Arc::new(Mutex::new(conn)))
}

/// A private in-memory database.
pub fn open_in_memory() -> Result<SharedConnection> {
    let conn = Connection::open_in_memory()
        .map_err(|e| DbError::ConnectionError(format!("failed to open in-memory database: {e}")))?;
    strict_identifiers(&conn)?;
    debug!("opened in-memory database");
    Ok(Arc::new(Mutex::new(conn)))
}

/// Turns off SQLite's fallback that reads an unknown double-quoted
/// identifier as a string literal.
fn strict_identifiers(conn: &Connection) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DML, false)?;
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DDL, false)?;
    Ok(())
}

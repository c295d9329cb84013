use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(stratum_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(stratum_config::toml_deserialize),
        help("Check your stratum.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Empty transform key for table: {0}")]
    #[diagnostic(
        code(stratum_config::empty_transform_key),
        help("Remove the entry from [transform.keys] or give it a non-empty key")
    )]
    EmptyTransformKey(String),

    #[error("Invalid log level: {0}")]
    #[diagnostic(
        code(stratum_config::invalid_log_level),
        help("Use one of: error, warn, info, debug, trace")
    )]
    InvalidLogLevel(String),

    #[error("Invalid database path: {0}")]
    #[diagnostic(
        code(stratum_config::invalid_db_path),
        help("Set database.path or STRATUM_DB_PATH to a non-empty path")
    )]
    InvalidDatabasePath(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(stratum_config::io))]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

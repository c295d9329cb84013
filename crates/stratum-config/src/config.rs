use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Application's configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Where the SQLite database lives and how it is opened.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Field transform keys, one per table.
    #[serde(default)]
    pub transform: TransformConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the database file.
    /// Default: ./stratum.db
    pub path: Option<String>,

    /// How long a statement waits on a locked database, in milliseconds.
    /// Default: 5000
    pub busy_timeout_ms: Option<u64>,

    /// SQLite journal mode.
    /// Default: wal
    pub journal_mode: Option<JournalMode>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    #[default]
    Wal,
    Off,
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        };
        write!(f, "{mode}")
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Minimum level: error, warn, info, debug or trace.
    /// Default: info
    pub level: Option<String>,

    /// Emit JSON lines instead of the compact format.
    /// Default: false
    pub json: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TransformConfig {
    /// Table name to transform key. A key here overrides the key compiled
    /// into the entity and enables the transform for that table.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: Some("stratum.db".to_string()),
                busy_timeout_ms: Some(5000),
                journal_mode: Some(JournalMode::Wal),
            },
            logging: LoggingConfig {
                level: Some("info".to_string()),
                json: Some(false),
            },
            transform: TransformConfig::default(),
        }
    }

    /// Loads `$STRATUM_CONFIG`, or `stratum.toml` in the working directory.
    /// A missing file yields the default configuration.
    pub fn new() -> Result<Self> {
        let config_path = match std::env::var("STRATUM_CONFIG") {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from("stratum.toml"),
        };
        Self::from_path(config_path)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match fs::read_to_string(path) {
            Ok(content) => {
                debug!("loading configuration from {}", path.display());
                toml::from_str(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default_config(),
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    pub fn resolve(&mut self) -> Result<()> {
        self.database
            .path
            .get_or_insert_with(|| "stratum.db".to_string());
        self.database.busy_timeout_ms.get_or_insert(5000);
        self.database.journal_mode.get_or_insert(JournalMode::Wal);

        if self.database.path.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::InvalidDatabasePath(String::new()));
        }

        let level = self
            .logging
            .level
            .get_or_insert_with(|| "info".to_string());
        *level = level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(level.clone()));
        }
        self.logging.json.get_or_insert(false);

        if let Some((table, _)) = self.transform.keys.iter().find(|(_, key)| key.is_empty()) {
            return Err(ConfigError::EmptyTransformKey(table.clone()));
        }

        Ok(())
    }

    pub fn get_db_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("STRATUM_DB_PATH") {
            if env_path.is_empty() {
                return Err(ConfigError::InvalidDatabasePath(env_path));
            }
            return Ok(PathBuf::from(env_path));
        }
        Ok(PathBuf::from(
            self.database.path.as_deref().unwrap_or("stratum.db"),
        ))
    }

    pub fn busy_timeout_ms(&self) -> u64 {
        self.database.busy_timeout_ms.unwrap_or(5000)
    }

    pub fn journal_mode(&self) -> JournalMode {
        self.database.journal_mode.unwrap_or_default()
    }

    /// Effective log level, `STRATUM_LOG` taking precedence over the file.
    pub fn log_level(&self) -> Result<String> {
        if let Ok(level) = std::env::var("STRATUM_LOG") {
            let level = level.to_ascii_lowercase();
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(ConfigError::InvalidLogLevel(level));
            }
            return Ok(level);
        }
        Ok(self
            .logging
            .level
            .clone()
            .unwrap_or_else(|| "info".to_string()))
    }

    pub fn log_json(&self) -> bool {
        self.logging.json.unwrap_or(false)
    }

    pub fn transform_key(&self, table: &str) -> Option<&str> {
        self.transform.keys.get(table).map(String::as_str)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serialized)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

pub mod config;
pub mod error;

pub use config::{Config, DatabaseConfig, JournalMode, LoggingConfig, TransformConfig};

#[cfg(test)]
pub mod test_utils;

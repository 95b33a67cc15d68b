//! Runtime configuration loaded from a JSON file.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{JsonDirBackend, MemoryBackend, StorageBackend};
use crate::DEFAULT_CHANNEL_DIR;

/// Which storage backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Nothing survives a restart.
    Memory,
    /// One JSON document per channel under `data_dir`.
    #[default]
    Json,
    /// A single `SQLite` database inside `data_dir`.
    Sqlite,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid configuration.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The selected backend was compiled out.
    #[error("storage backend `{0:?}` is not available in this build")]
    Unsupported(StorageKind),
}

/// Settings for a [`Wireless`](crate::Wireless) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Backend selection.
    pub storage: StorageKind,
    /// Directory holding persisted channels.
    pub data_dir: PathBuf,
    /// Enables debug logging.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageKind::default(),
            data_dir: PathBuf::from(DEFAULT_CHANNEL_DIR),
            debug: false,
        }
    }
}

impl Config {
    /// Reads configuration from the JSON file at `path`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] when the file cannot be read or
    /// [`ConfigError::Parse`] when it is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses configuration from JSON text. Missing fields take defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Builds the backend named by [`Config::storage`].
    ///
    /// # Errors
    /// Returns [`ConfigError::Unsupported`] when `sqlite` is selected but the
    /// feature is disabled.
    pub fn open_backend(&self) -> Result<Box<dyn StorageBackend>, ConfigError> {
        match self.storage {
            StorageKind::Memory => Ok(Box::new(MemoryBackend::new())),
            StorageKind::Json => Ok(Box::new(JsonDirBackend::new(&self.data_dir))),
            #[cfg(feature = "sqlite")]
            StorageKind::Sqlite => Ok(Box::new(crate::storage::SqliteBackend::new(
                self.data_dir.join(crate::SQLITE_FILE_NAME),
            ))),
            #[cfg(not(feature = "sqlite"))]
            StorageKind::Sqlite => Err(ConfigError::Unsupported(StorageKind::Sqlite)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn empty_object_uses_defaults() {
        let config = Config::parse("{}").expect("empty config is valid");
        assert_eq!(config, Config::default());
        assert_eq!(config.storage, StorageKind::Json);
    }

    #[rstest]
    #[case(r#"{"storage": "memory"}"#, StorageKind::Memory)]
    #[case(r#"{"storage": "sqlite", "data_dir": "/tmp/wr"}"#, StorageKind::Sqlite)]
    fn storage_kind_is_parsed(#[case] json: &str, #[case] expected: StorageKind) {
        let config = Config::parse(json).expect("config should parse");
        assert_eq!(config.storage, expected);
    }

    #[rstest]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            Config::parse(r#"{"storag": "memory"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[rstest]
    fn missing_file_reports_path() {
        let err = Config::load("/nonexistent/wireless.json").expect_err("file is missing");
        assert!(err.to_string().contains("/nonexistent/wireless.json"));
    }
}

//! Server configuration.
//!
//! The config file lives at a platform-appropriate location:
//! - Linux: `~/.config/chatd/config.toml`
//! - macOS: `~/Library/Application Support/chatd/config.toml`
//!
//! On first run no config file exists; [`ServerConfig::default`] supplies
//! every value the CLI doesn't override.
//!
//! # Config File Format (TOML)
//!
//! ```toml
//! port = 8888
//! session_timeout_secs = 3600
//! session_capacity = 1000
//! max_record_bytes = 65536
//! # db_path = "/custom/path/chatd.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to write config file at {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("could not determine config directory for this platform")]
    NoConfigDir,
}

/// The server's runtime configuration: what gets saved to and loaded from
/// the TOML config file, then overridden by CLI positional args.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port the listener binds.
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    /// Seconds a session may sit idle before `validate` expires it.
    #[serde(default = "ServerConfig::default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Maximum number of simultaneously active sessions.
    #[serde(default = "ServerConfig::default_session_capacity")]
    pub session_capacity: usize,

    /// Largest record the line framer will buffer before an unterminated
    /// run of bytes is rejected as oversize.
    #[serde(default = "ServerConfig::default_max_record_bytes")]
    pub max_record_bytes: usize,

    /// Path to the SQLite database file. Defaults to the platform data
    /// directory when not set.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            session_timeout_secs: Self::default_session_timeout_secs(),
            session_capacity: Self::default_session_capacity(),
            max_record_bytes: Self::default_max_record_bytes(),
            db_path: None,
        }
    }
}

impl ServerConfig {
    fn default_port() -> u16 {
        8888
    }

    fn default_session_timeout_secs() -> u64 {
        3600
    }

    fn default_session_capacity() -> usize {
        1000
    }

    fn default_max_record_bytes() -> usize {
        crate::framer::MAX_RECORD_BYTES
    }

    /// Returns the platform-appropriate config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("chatd"))
    }

    /// Returns the full path to the config file.
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("config.toml"))
    }

    /// Returns the platform-appropriate data directory for the database.
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("chatd"))
    }

    /// Resolves `db_path`, falling back to the platform data directory.
    pub fn resolved_db_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.db_path {
            Some(p) => Ok(p.clone()),
            None => Ok(Self::data_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join("chatd.db")),
        }
    }

    /// Loads the config from the default config file path, falling back to
    /// [`ServerConfig::default`] when no file exists yet.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    /// Loads the config from a specific file path. Returns the default
    /// configuration if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_owned(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Saves this config to a specific file path, creating parent
    /// directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
                path: path.to_owned(),
                source: e,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteFile {
            path: path.to_owned(),
            source: e,
        })
    }
}

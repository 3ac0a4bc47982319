//! Server configuration.
//!
//! Values are merged from, highest priority first:
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/kanban-server/config.toml`)
//! 4. Compiled defaults

use std::path::{Path, PathBuf};

use crate::notify::DEFAULT_OUTBOX_CAPACITY;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Dotted config key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerSection,
    storage: StorageSection,
    logging: LoggingSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
    outbox_capacity: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageSection {
    snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LoggingSection {
    level: Option<String>,
    file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Command-line arguments.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban board server with live updates")]
pub struct ServerCliArgs {
    /// Address to listen on.
    #[arg(short, long, env = "KANBAN_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/kanban-server/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON file the board is loaded from and saved to.
    #[arg(long, env = "KANBAN_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Maximum number of pending notification jobs.
    #[arg(long)]
    pub outbox_capacity: Option<usize>,

    /// Log filter (trace, debug, info, warn, error, or a directive list).
    #[arg(long, env = "KANBAN_LOG")]
    pub log_level: Option<String>,

    /// Also write logs to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0:5000`.
    pub bind_addr: String,
    /// Capacity of the notification outbox.
    pub outbox_capacity: usize,
    /// Snapshot file; `None` keeps the board in memory only.
    pub snapshot_path: Option<PathBuf>,
    /// Log filter string.
    pub log_level: String,
    /// Optional log file.
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            snapshot_path: None,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from CLI args, env vars and the config file.
    ///
    /// An explicit `--config` that does not exist is an error; a missing
    /// default file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or a
    /// value is out of range.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, file)
    }

    fn resolve(cli: &ServerCliArgs, file: ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let outbox_capacity = cli
            .outbox_capacity
            .or(file.server.outbox_capacity)
            .unwrap_or(defaults.outbox_capacity);
        if outbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "server.outbox_capacity",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            outbox_capacity,
            snapshot_path: cli.snapshot.clone().or(file.storage.snapshot_path),
            log_level: cli
                .log_level
                .clone()
                .or(file.logging.level)
                .unwrap_or(defaults.log_level),
            log_file: cli.log_file.clone().or(file.logging.file),
        })
    }
}

fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("kanban-server").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

//! Supervisor configuration.
//!
//! The configuration is written once by `supervysor init` to
//! `~/.supervysor/config.toml` and read by `supervysor start`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use supervysor_pool::{parse_endpoint_list, Chain};
use thiserror::Error;

use crate::node::{NodeLaunchConfig, DEFAULT_GHOST_PORT};
use crate::settings::{SettingsError, Thresholds};

/// Directory under the user's home holding config, logs and backups.
pub const SUPERVYSOR_DIR: &str = ".supervysor";

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.toml";

/// Log file written under `logs/`.
pub const LOG_FILE: &str = "supervysor.log";

pub const DEFAULT_METRICS_PORT: u16 = 26660;
pub const DEFAULT_ABCI_ENDPOINT: &str = "http://127.0.0.1:26657";
pub const DEFAULT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PRUNING_INTERVAL_HOURS: u64 = 24;

/// Errors from locating, reading, writing or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid thresholds: {0}")]
    Thresholds(#[from] SettingsError),
}

impl ConfigError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            ConfigError::NoHomeDir => "no_home_dir",
            ConfigError::Read { .. } => "config_read_failed",
            ConfigError::Parse { .. } => "config_parse_failed",
            ConfigError::Serialize(_) => "config_serialize_failed",
            ConfigError::Write { .. } => "config_write_failed",
            ConfigError::Invalid(_) | ConfigError::Thresholds(_) => "invalid_config",
        }
    }
}

/// Persisted supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// KYVE chain id (`kyve-1`, `kaon-1` or `korellia`).
    pub chain_id: String,

    /// Node binary.
    pub binary_path: PathBuf,

    /// Node home directory.
    pub home_path: PathBuf,

    pub pool_id: u64,

    /// Comma-separated seeds exposed in Normal mode.
    #[serde(default)]
    pub seeds: String,

    /// Comma-separated REST endpoints tried after the chain's own.
    #[serde(default)]
    pub fallback_endpoints: String,

    /// Hours between prunes.
    #[serde(default = "default_pruning_interval")]
    pub pruning_interval: u64,

    #[serde(default)]
    pub metrics: bool,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "default_abci_endpoint")]
    pub abci_endpoint: String,

    /// Seconds between height checks.
    #[serde(default = "default_interval")]
    pub interval: u64,

    pub height_difference_max: i64,
    pub height_difference_min: i64,
    pub keep_recent: u64,

    #[serde(default)]
    pub keep_every: u64,

    #[serde(default = "default_ghost_port")]
    pub ghost_port: u16,
}

fn default_pruning_interval() -> u64 {
    DEFAULT_PRUNING_INTERVAL_HOURS
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

fn default_abci_endpoint() -> String {
    DEFAULT_ABCI_ENDPOINT.to_string()
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_ghost_port() -> u16 {
    DEFAULT_GHOST_PORT
}

impl SupervisorConfig {
    /// Read and parse the config at `path`. Does not validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the config to `path`, creating its parent directory.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Chain::from_str(&self.chain_id).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.binary_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("binary_path is empty".to_string()));
        }
        if self.interval == 0 {
            return Err(ConfigError::Invalid("interval must be positive".to_string()));
        }
        if self.keep_recent == 0 {
            return Err(ConfigError::Invalid("keep_recent must be positive".to_string()));
        }

        self.thresholds().validate()?;
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            height_difference_max: self.height_difference_max,
            height_difference_min: self.height_difference_min,
            pruning_interval: self.pruning_interval(),
            keep_recent: self.keep_recent,
            keep_every: self.keep_every,
        }
    }

    pub fn pruning_interval(&self) -> Duration {
        Duration::from_secs(self.pruning_interval * 60 * 60)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn fallback_endpoint_list(&self) -> Vec<String> {
        parse_endpoint_list(&self.fallback_endpoints)
    }

    pub fn launch_config(&self) -> NodeLaunchConfig {
        let mut launch = NodeLaunchConfig::new(&self.binary_path, &self.home_path, &self.seeds);
        launch.ghost_port = self.ghost_port;
        launch
    }
}

/// `~/.supervysor`.
pub fn supervysor_dir() -> Result<PathBuf, ConfigError> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(SUPERVYSOR_DIR))
        .ok_or(ConfigError::NoHomeDir)
}

/// `~/.supervysor/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(supervysor_dir()?.join(CONFIG_FILE))
}

pub fn logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}

pub fn backups_dir(root: &Path) -> PathBuf {
    root.join("backups")
}

/// Create `dir` with its `logs/` and `backups/` subdirectories.
pub fn ensure_app_dirs(dir: &Path) -> Result<(), ConfigError> {
    for sub in [logs_dir(dir), backups_dir(dir)] {
        fs::create_dir_all(&sub).map_err(|source| ConfigError::Write { path: sub, source })?;
    }
    Ok(())
}

/// Open `{root}/logs/supervysor.log` for appending, creating it if needed.
pub fn open_log_file(root: &Path) -> Result<fs::File, ConfigError> {
    ensure_app_dirs(root)?;
    let path = logs_dir(root).join(LOG_FILE);
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| ConfigError::Write { path, source })
}

/// `~/.{binary name}`, the conventional home of a Cosmos SDK node.
pub fn default_home_path(binary_path: &Path) -> Result<PathBuf, ConfigError> {
    let name = binary_path
        .file_name()
        .ok_or_else(|| ConfigError::Invalid(format!("{} has no file name", binary_path.display())))?;
    let mut dir = std::ffi::OsString::from(".");
    dir.push(name);

    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(dir))
        .ok_or(ConfigError::NoHomeDir)
}

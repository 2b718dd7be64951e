//! Service configuration loaded from `config.toml`.
//!
//! Every field has a default so a missing file, or a file that only sets a few
//! keys, still produces a complete [`AppConfig`].

mod defaults;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;
use defaults::*;

/// Default filename used to store the service configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "DOCRANK_CONFIG";
/// Environment variable overriding `dataset.path`.
pub const DATASET_PATH_ENV: &str = "DOCRANK_DATASET";
/// Environment variable overriding `server.bind_addr`.
pub const BIND_ADDR_ENV: &str = "DOCRANK_BIND";

/// Aggregate configuration for the service and the training utility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dataset: DatasetSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where the tabular source lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSettings {
    /// `.csv` or Excel workbook path.
    #[serde(default = "default_dataset_path")]
    pub path: PathBuf,
    /// Worksheet name for workbooks; the first sheet is used when unset.
    #[serde(default)]
    pub sheet: Option<String>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            sheet: None,
        }
    }
}

/// Classifier hyperparameters and the holdout protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Number of boosting rounds (trees per class).
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// Histogram bins used for split search.
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default = "default_reg_lambda")]
    pub reg_lambda: f32,
    #[serde(default = "default_min_child_weight")]
    pub min_child_weight: f32,
    /// Fraction of rows held out from training.
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,
    #[serde(default = "default_split_seed")]
    pub split_seed: u64,
    /// Training thread count override (0 = auto).
    #[serde(default)]
    pub threads: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            max_depth: default_max_depth(),
            learning_rate: default_learning_rate(),
            bins: default_bins(),
            reg_lambda: default_reg_lambda(),
            min_child_weight: default_min_child_weight(),
            holdout_fraction: default_holdout_fraction(),
            split_seed: default_split_seed(),
            threads: 0,
        }
    }
}

impl ModelSettings {
    /// Resolve the training thread count, leaving one core for request handling.
    pub fn resolved_threads(&self) -> usize {
        if self.threads >= 1 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .saturating_sub(1)
            .max(1)
    }
}

/// HTTP listener and request dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Maximum number of predictions computed concurrently.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Wait budget per request, queueing included.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// `limit` used when the query omits it or it does not parse.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Origins echoed in CORS headers; `*` allows any origin.
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            worker_pool_size: default_worker_pool_size(),
            request_timeout_ms: default_request_timeout_ms(),
            default_limit: default_limit(),
            cors_allowed_origins: default_cors_allowed_origins(),
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Log output preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Also write a per-launch log file under the app directory.
    #[serde(default = "default_true")]
    pub file_logging: bool,
    /// Maximum number of log files to retain.
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file_logging: true,
            max_log_files: default_max_log_files(),
        }
    }
}

/// Errors that may occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("No suitable config directory found: {0}")]
    NoConfigDir(#[from] app_dirs::AppDirError),
}

/// Resolve the configuration file path.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from disk, returning defaults if the file is missing.
///
/// Environment overrides are applied after the file is parsed.
pub fn load_or_default() -> Result<AppConfig, ConfigError> {
    let path = config_path()?;
    let mut config = if path.exists() {
        load_from(&path)?
    } else {
        AppConfig::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a specific config file.
pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(text: &str) -> Result<AppConfig, toml::de::Error> {
    let mut config: AppConfig = toml::from_str(text)?;
    normalize(&mut config);
    Ok(config)
}

fn normalize(config: &mut AppConfig) {
    config.server.worker_pool_size = clamp_worker_pool_size(config.server.worker_pool_size);
    config.server.request_timeout_ms = config.server.request_timeout_ms.max(MIN_REQUEST_TIMEOUT_MS);
    config.model.holdout_fraction = clamp_holdout_fraction(config.model.holdout_fraction);
    config.model.rounds = config.model.rounds.max(1);
    config.model.bins = config.model.bins.clamp(2, 256);
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(path) = std::env::var(DATASET_PATH_ENV) {
        if !path.trim().is_empty() {
            config.dataset.path = PathBuf::from(path);
        }
    }
    if let Ok(addr) = std::env::var(BIND_ADDR_ENV) {
        if !addr.trim().is_empty() {
            config.server.bind_addr = addr.trim().to_string();
        }
    }
}

//! CLI configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use airq_core::{DEFAULT_BASE_URL, RemoteConfig, RetryConfig, SyncOptions, Thresholds};
use airq_types::Series;

/// Largest number of sites synced at once.
pub const MAX_CONCURRENCY: usize = 32;

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API settings.
    pub remote: RemoteSection,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Batch sync settings.
    pub sync: SyncConfig,
    /// Outlier thresholds per series.
    pub thresholds: Thresholds,
    /// Daily guideline limits per series.
    pub limits: DailyLimits,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - The remote base URL is http(s) and the timeout is non-zero
    /// - Storage path is not empty
    /// - Sync concurrency is between 1 and [`MAX_CONCURRENCY`]
    /// - Thresholds and daily limits are positive numbers
    ///
    /// # Example
    ///
    /// ```
    /// use airq_cli::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.remote.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.sync.validate());

        for series in Series::ALL {
            errors.extend(positive(
                format!("thresholds.{series}"),
                self.thresholds.get(series),
            ));
            errors.extend(positive(format!("limits.{series}"), self.limits.get(series)));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

fn positive(field: String, value: f64) -> Option<ValidationError> {
    (!value.is_finite() || value <= 0.0).then(|| ValidationError {
        field,
        message: format!("{value} must be a positive number"),
    })
}

/// Remote API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// API root URL.
    pub base_url: String,
    /// API key, sent as the `key` query parameter.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause before each retry, in milliseconds.
    pub retry_pause_ms: u64,
    /// Double the pause after each retry and add jitter.
    pub exponential_backoff: bool,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: 30,
            max_retries: 3,
            retry_pause_ms: 1000,
            exponential_backoff: false,
        }
    }
}

impl RemoteSection {
    /// Validate remote configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError {
                field: "remote.base_url".to_string(),
                message: format!(
                    "invalid URL '{}': must start with http:// or https://",
                    self.base_url
                ),
            });
        }

        if let Some(key) = &self.api_key
            && key.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "remote.api_key".to_string(),
                message: "API key cannot be empty string (omit it instead)".to_string(),
            });
        }

        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.timeout_secs".to_string(),
                message: "timeout cannot be 0".to_string(),
            });
        }

        errors
    }

    /// Retry policy described by this section.
    pub fn retry(&self) -> RetryConfig {
        let pause = Duration::from_millis(self.retry_pause_ms);
        if self.exponential_backoff {
            RetryConfig::exponential(self.max_retries, pause)
        } else {
            RetryConfig::fixed(self.max_retries, pause)
        }
    }

    /// Client configuration described by this section.
    pub fn client_config(&self) -> RemoteConfig {
        RemoteConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            retry: self.retry(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: airq_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Batch sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sites synced at the same time.
    pub concurrency: usize,
    /// Abort `sync-all` on the first failed job.
    pub stop_on_error: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            stop_on_error: false,
        }
    }
}

impl SyncConfig {
    /// Validate sync configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            errors.push(ValidationError {
                field: "sync.concurrency".to_string(),
                message: format!(
                    "concurrency {} is out of range (1 to {})",
                    self.concurrency, MAX_CONCURRENCY
                ),
            });
        }

        errors
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            concurrency: self.concurrency,
            stop_on_error: self.stop_on_error,
        }
    }
}

/// Daily mean limits per series, in µg/m³.
///
/// Defaults are the WHO 2021 24-hour guideline levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyLimits {
    pub pm25: f64,
    pub no2: f64,
}

impl Default for DailyLimits {
    fn default() -> Self {
        Self {
            pm25: 15.0,
            no2: 25.0,
        }
    }
}

impl DailyLimits {
    pub fn get(&self, series: Series) -> f64 {
        match series {
            Series::Pm25 => self.pm25,
            Series::No2 => self.no2,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field path (e.g., `remote.base_url` or `thresholds.pm25`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airq")
        .join("airq.toml")
}

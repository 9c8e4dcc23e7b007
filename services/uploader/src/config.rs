//! Configuration types and loading
//!
//! Config precedence: CLI args > config file > defaults.
//! The file is optional: when neither `--config` nor `UPLOADER_CONFIG` names
//! one and `rotating-uploader.toml` does not exist in the working directory,
//! built-in defaults apply.

use rotation::{ClassificationTable, RetryPolicy, SelectionPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Default config file name looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "rotating-uploader.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub rclone: RcloneConfig,
    pub accounts: AccountsConfig,
    pub rotation: RotationConfig,
    pub run: RunConfig,
    pub classification: ClassificationTable,
}

/// External tool settings
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RcloneConfig {
    /// Explicit rclone path; looked up on PATH when unset
    pub binary: Option<PathBuf>,
    pub remote_name: String,
    pub chunk_size: String,
    pub extra_args: Vec<String>,
}

impl Default for RcloneConfig {
    fn default() -> Self {
        Self {
            binary: None,
            remote_name: "gdrive".into(),
            chunk_size: "8M".into(),
            extra_args: [
                "--drive-stop-on-upload-limit",
                "--stats-one-line",
                "--stats",
                "5s",
                "-v",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// Credential discovery settings
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccountsConfig {
    pub dir: PathBuf,
    pub extension: String,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("accounts"),
            extension: credentials::DEFAULT_EXTENSION.into(),
        }
    }
}

/// Selection policy name as written in config and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    Sequential,
    RoundRobin,
    Shuffled,
}

/// Retry and selection settings
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotationConfig {
    pub max_transient_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub selection: Selection,
    /// Seed for `shuffled`; a random seed is drawn (and logged) when unset
    pub seed: Option<u64>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_transient_retries: retry.max_transient_retries,
            backoff_base_ms: retry.backoff_base.as_millis() as u64,
            backoff_max_ms: retry.backoff_max.as_millis() as u64,
            selection: Selection::default(),
            seed: None,
        }
    }
}

impl RotationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_transient_retries: self.max_transient_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }

    /// Resolve the selection policy, drawing a seed for `shuffled` if needed.
    pub fn selection_policy(&self) -> SelectionPolicy {
        match self.selection {
            Selection::Sequential => SelectionPolicy::Sequential,
            Selection::RoundRobin => SelectionPolicy::RoundRobin,
            Selection::Shuffled => SelectionPolicy::Shuffled {
                seed: self.seed.unwrap_or_else(rand::random),
            },
        }
    }
}

/// Whole-run settings
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Overall deadline; the in-flight attempt is killed when it passes
    pub timeout_secs: Option<u64>,
}

impl RunConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, else validated defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Resolve the config file path from CLI arg, UPLOADER_CONFIG env var, or
    /// the default file name if it exists. `None` means "use defaults".
    pub fn resolve_path(cli_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(p.to_path_buf());
        }
        if let Ok(p) = std::env::var("UPLOADER_CONFIG") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }

    /// Reject values the scheduler or rclone would choke on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rclone.chunk_size.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "rclone.chunk_size must not be empty".into(),
            ));
        }
        if self.rclone.remote_name.trim().is_empty() || self.rclone.remote_name.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "rclone.remote_name must be a non-empty name without ':', got: {:?}",
                self.rclone.remote_name
            )));
        }
        if self.accounts.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid(
                "accounts.extension must not be empty".into(),
            ));
        }
        if self.rotation.max_transient_retries == 0 {
            return Err(ConfigError::Invalid(
                "rotation.max_transient_retries must be greater than 0".into(),
            ));
        }
        if self.rotation.backoff_base_ms > self.rotation.backoff_max_ms {
            return Err(ConfigError::Invalid(
                "rotation.backoff_base_ms must not exceed rotation.backoff_max_ms".into(),
            ));
        }
        if self.run.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "run.timeout_secs must be greater than 0".into(),
            ));
        }
        self.classification
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("classification: {e}")))?;
        Ok(())
    }
}

//! Service-specific error types

use thiserror::Error;

/// Startup errors of the uploader binary.
///
/// Per-file transfer failures are `rotation::Error` values collected in the
/// batch report; they never propagate as service errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("rclone executable not found: {0}")]
    RcloneNotFound(String),

    #[error("input directory not found: {0}")]
    InputNotFound(String),

    #[error("failed to walk input directory: {0}")]
    Walk(String),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

/// Config file problems. All of them exit with EX_CONFIG.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

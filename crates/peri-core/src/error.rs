//! Core error types for periscope

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the device-directory API
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Credentials rejected. Fatal, never retried.
    #[error("authentication failed")]
    Auth,

    /// No device registered under the requested endpoint name
    #[error("no device registered with endpoint '{0}'")]
    DeviceNotFound(String),

    /// More than one device matches the endpoint name
    #[error("endpoint '{0}' matches more than one device")]
    Ambiguous(String),

    /// The API answered with a non-success status
    #[error("directory API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never completed
    #[error("directory request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected shape
    #[error("unexpected directory response: {0}")]
    Decode(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(String),
}

//! Error types and handling for agilewatch
//!
//! This module defines the error taxonomy shared by the tariff client, the
//! rate cache and the polling loop.

use thiserror::Error;

/// Result type alias for agilewatch operations
pub type Result<T> = std::result::Result<T, AgileWatchError>;

/// Main error type for agilewatch
#[derive(Debug, Error)]
pub enum AgileWatchError {
    /// Configuration file missing or malformed
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Upstream tariff data could not be fetched (transport or status failure)
    #[error("Data unavailable: {message}")]
    DataUnavailable { message: String },

    /// The requested rate window is absent even after a refresh
    #[error("Data unavailable: no published rate for window starting {window}")]
    CacheGap { window: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl AgileWatchError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        AgileWatchError::Config {
            message: message.into(),
        }
    }

    /// Create a new data-unavailable error
    pub fn data_unavailable<S: Into<String>>(message: S) -> Self {
        AgileWatchError::DataUnavailable {
            message: message.into(),
        }
    }

    /// Create a new cache-gap error for the given window start
    pub fn cache_gap<S: Into<String>>(window: S) -> Self {
        AgileWatchError::CacheGap {
            window: window.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        AgileWatchError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        AgileWatchError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        AgileWatchError::Generic {
            message: message.into(),
        }
    }

    /// True for both transport failures and upstream publication gaps.
    pub fn is_data_unavailable(&self) -> bool {
        matches!(
            self,
            AgileWatchError::DataUnavailable { .. } | AgileWatchError::CacheGap { .. }
        )
    }
}

impl From<std::io::Error> for AgileWatchError {
    fn from(err: std::io::Error) -> Self {
        AgileWatchError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AgileWatchError {
    fn from(err: serde_yaml::Error) -> Self {
        AgileWatchError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgileWatchError {
    fn from(err: serde_json::Error) -> Self {
        AgileWatchError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AgileWatchError {
    fn from(err: reqwest::Error) -> Self {
        AgileWatchError::data_unavailable(format!("Network exception: {}", err))
    }
}

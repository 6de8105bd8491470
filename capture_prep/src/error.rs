//! Error types for capture preparation
//!
//! Readiness checks never fail with an error: they report a tri-state
//! [`CheckResult`](crate::CheckResult). These errors cover the
//! surrounding plumbing: loading and validating configuration, and inputs a
//! check needs but the caller never supplied.

use thiserror::Error;

/// Errors raised outside the readiness check flow
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Observer location unknown, cannot compute wall position")]
    MissingObserverLocation,

    #[error("No wall position configured for wall flat source")]
    MissingWallPosition,
}

impl PrepareError {
    pub(crate) fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::InvalidConfig {
            field,
            value: value.to_string(),
            reason,
        }
    }
}

/// Result type for preparation plumbing
pub type PrepareResult<T> = Result<T, PrepareError>;

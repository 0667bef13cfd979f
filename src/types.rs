//! Shared error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single call against one daemon's management API.
///
/// Callers decide whether a given failure is fatal to the enclosing node or
/// merely disables one optional field.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The daemon answered with a non-2xx status.
    #[error("HTTP {0}")]
    Status(StatusCode),

    /// The call was cancelled by the shared batch deadline.
    #[error("deadline exceeded")]
    Timeout,

    /// Transport-level failure (connect, TLS, body decode).
    #[error(transparent)]
    Network(#[from] reqwest::Error),
}

impl DaemonError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DaemonError::Timeout)
    }
}

/// Failure while loading the instance registry or server settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid instance registry: {0}")]
    Registry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

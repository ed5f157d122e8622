//! Application-wide error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    /// Bad operator input. Reported before anything on disk is touched.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("keystore not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("malformed keystore {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("keystore decryption failed: {0}")]
    Decrypt(String),

    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported environment '{0}'")]
    UnsupportedEnvironment(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl FleetError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FleetError::Io { path: path.into(), source }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FleetError::Malformed { path: path.into(), reason: reason.into() }
    }
}

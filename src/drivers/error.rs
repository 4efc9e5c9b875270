//! Driver errors

use std::io;

/// Errors raised at the driver seam
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Configuration that can never work; raised at construction
    #[error("invalid driver config for '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("connect to {target} timed out after {timeout_ms}ms")]
    ConnectTimeout { target: String, timeout_ms: u64 },

    #[error("encode failed: {0}")]
    Encode(String),

    /// The link died before it could be used
    #[error("link lost: {0}")]
    LinkLost(String),

    /// Writer task for the current link is gone
    #[error("link closed")]
    LinkClosed,
}

impl DriverError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        DriverError::InvalidConfig {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

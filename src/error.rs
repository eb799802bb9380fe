//! Error types surfaced by the gateway.
//!
//! Only construction and bind failures are returned to callers. Everything
//! that goes wrong while logging a request is swallowed at the sink.

use thiserror::Error;

use crate::lifecycle::gateway::LifecycleState;

/// Invalid or unreadable configuration. Fatal at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {0:?}")]
    InvalidLevel(String),

    #[error("invalid custom time format: {0:?}")]
    InvalidTimeFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors returned by [`Gateway`](crate::Gateway) operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind address {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gateway cannot start from state {0:?}")]
    InvalidState(LifecycleState),
}

impl GatewayError {
    /// Whether this is a listener bind failure.
    pub fn is_bind(&self) -> bool {
        matches!(self, GatewayError::Bind { .. })
    }
}

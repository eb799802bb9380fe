//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default access line, one record per request.
pub const DEFAULT_ACCESS_FORMAT: &str = "${time_rfc3339} ${status} ${method} ${latency_human} ${host} ${remote_ip} ${bytes_in} ${bytes_out} ${uri} ${id} ${error}\n";

/// Default layout for the `${time_custom}` access tag.
pub const DEFAULT_CUSTOM_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind ip and port).
    pub listener: ListenerConfig,

    /// Log sink settings.
    pub log: LogConfig,

    /// Access log formatting.
    pub access: AccessLogConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub ip: String,

    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
}

impl ListenerConfig {
    /// Address in `<ip>:<port>` form.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Rotating file at the given path.
    File(PathBuf),
}

impl From<&str> for LogOutput {
    fn from(value: &str) -> Self {
        match value {
            "stdout" | "" => LogOutput::Stdout,
            "stderr" => LogOutput::Stderr,
            path => LogOutput::File(PathBuf::from(path)),
        }
    }
}

impl From<String> for LogOutput {
    fn from(value: String) -> Self {
        LogOutput::from(value.as_str())
    }
}

impl From<LogOutput> for String {
    fn from(value: LogOutput) -> Self {
        match value {
            LogOutput::Stdout => "stdout".to_string(),
            LogOutput::Stderr => "stderr".to_string(),
            LogOutput::File(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// Log sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Destination: "stdout", "stderr", "" (stdout) or a file path.
    pub output: LogOutput,

    /// Minimum severity (trace, debug, info, warn, error, fatal, panic).
    pub level: String,

    /// Megabytes written to the file before it is rotated.
    pub size_limit_mb: u64,

    /// Rotated files to keep (0 keeps all).
    pub backup_count: usize,

    /// Days a rotated file is kept (0 keeps forever).
    pub max_age_days: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stdout,
            level: "info".to_string(),
            size_limit_mb: 100,
            backup_count: 0,
            max_age_days: 0,
        }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Access line template with `${tag}` placeholders.
    pub format: String,

    /// strftime layout used by `${time_custom}`.
    pub custom_time_format: String,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_ACCESS_FORMAT.to_string(),
            custom_time_format: DEFAULT_CUSTOM_TIME_FORMAT.to_string(),
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Seconds in-flight requests get to finish before connections are dropped.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
        }
    }
}

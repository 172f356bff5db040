//! Infrastructure configuration - things that cannot change once the gateway is built.

use serde::{Deserialize, Serialize};

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry. Empty disables export.
    /// Default: "" (stdout logging only)
    #[serde(default)]
    pub otlp_endpoint: String,

    /// Log level or EnvFilter directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Whether an OTLP endpoint has been configured.
    pub fn otlp_enabled(&self) -> bool {
        !self.otlp_endpoint.trim().is_empty()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            log_level: Self::default_log_level(),
        }
    }
}

/// Connection dialing and transport limits.
///
/// Zero-valued timeouts mean "unbounded": only the caller's own cancellation
/// applies to the dial and schema resolution stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialConfig {
    /// Maximum size of a decoded response message.
    /// Default: 50 MiB
    #[serde(default = "DialConfig::default_max_recv_message_bytes")]
    pub max_recv_message_bytes: usize,

    /// Bound on establishing a new connection, in milliseconds.
    /// Default: 0 (unbounded)
    #[serde(default)]
    pub connect_timeout_ms: u64,

    /// Bound on the reflection round trips of one resolution, in milliseconds.
    /// Default: 0 (unbounded)
    #[serde(default)]
    pub resolve_timeout_ms: u64,

    /// TCP keepalive interval in seconds.
    /// Default: 0 (off)
    #[serde(default)]
    pub tcp_keepalive_secs: u64,
}

impl DialConfig {
    fn default_max_recv_message_bytes() -> usize {
        50 * 1024 * 1024
    }
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            max_recv_message_bytes: Self::default_max_recv_message_bytes(),
            connect_timeout_ms: 0,
            resolve_timeout_ms: 0,
            tcp_keepalive_secs: 0,
        }
    }
}

/// Infrastructure configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraConfig {
    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Dial and transport settings.
    #[serde(default)]
    pub dial: DialConfig,
}

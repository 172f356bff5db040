//! Per-call defaults - seed values applied when a request leaves a field out.

use serde::{Deserialize, Serialize};

/// Defaults for fields an inbound call may omit, plus response rendering knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Call timeout in seconds when `timeout_seconds` is absent or non-positive.
    /// Default: 30
    #[serde(default = "DefaultsConfig::default_timeout_seconds")]
    pub timeout_seconds: f64,

    /// Whether to dial with TLS when `tls` is absent.
    /// Default: false
    #[serde(default)]
    pub tls: bool,

    /// Render fields holding their default value in decoded responses.
    /// Default: false
    #[serde(default)]
    pub emit_default_fields: bool,

    /// Render responses with proto field names instead of lowerCamelCase.
    /// Default: false
    #[serde(default)]
    pub proto_field_names: bool,

    /// Render 64-bit integers as JSON numbers instead of strings.
    /// Default: false
    #[serde(default)]
    pub int64_as_numbers: bool,
}

impl DefaultsConfig {
    fn default_timeout_seconds() -> f64 {
        30.0
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: Self::default_timeout_seconds(),
            tls: false,
            emit_default_fields: false,
            proto_field_names: false,
            int64_as_numbers: false,
        }
    }
}

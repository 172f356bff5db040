//! Minimal configuration loading for grpcall.
//!
//! This crate provides configuration loading with minimal dependencies so
//! both the gateway library and the CLI can share it.
//!
//! # Configuration Philosophy
//!
//! - **Infrastructure** (`InfraConfig`): telemetry endpoints and dial limits,
//!   fixed once the gateway is constructed.
//!
//! - **Defaults** (`DefaultsConfig`): values applied to a call when the caller
//!   leaves a field out (timeout, TLS) and response rendering options.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/grpcall/config.toml` (system)
//! 2. `~/.config/grpcall/config.toml` (user)
//! 3. `./grpcall.toml` (local override, or `--config PATH`)
//! 4. Environment variables (`GRPCALL_*`)
//!
//! # Example Config
//!
//! ```toml
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//!
//! [dial]
//! max_recv_message_bytes = 52428800
//! connect_timeout_ms = 0
//! resolve_timeout_ms = 0
//!
//! [defaults]
//! timeout_seconds = 30
//! tls = false
//! ```

pub mod defaults;
pub mod infra;
pub mod loader;

pub use defaults::DefaultsConfig;
pub use infra::{DialConfig, InfraConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete grpcall configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrpcallConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl GrpcallConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` replacing the local `./grpcall.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = GrpcallConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            config = loader::load_from_file(&path, config)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# grpcall configuration\n\n");

        output.push_str("[telemetry]\n");
        output.push_str(&format!(
            "otlp_endpoint = \"{}\"\n",
            self.infra.telemetry.otlp_endpoint
        ));
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.infra.telemetry.log_level
        ));

        output.push_str("\n[dial]\n");
        output.push_str(&format!(
            "max_recv_message_bytes = {}\n",
            self.infra.dial.max_recv_message_bytes
        ));
        output.push_str(&format!(
            "connect_timeout_ms = {}\n",
            self.infra.dial.connect_timeout_ms
        ));
        output.push_str(&format!(
            "resolve_timeout_ms = {}\n",
            self.infra.dial.resolve_timeout_ms
        ));
        output.push_str(&format!(
            "tcp_keepalive_secs = {}\n",
            self.infra.dial.tcp_keepalive_secs
        ));

        output.push_str("\n[defaults]\n");
        output.push_str(&format!(
            "timeout_seconds = {:?}\n",
            self.defaults.timeout_seconds
        ));
        output.push_str(&format!("tls = {}\n", self.defaults.tls));
        output.push_str(&format!(
            "emit_default_fields = {}\n",
            self.defaults.emit_default_fields
        ));
        output.push_str(&format!(
            "proto_field_names = {}\n",
            self.defaults.proto_field_names
        ));
        output.push_str(&format!(
            "int64_as_numbers = {}\n",
            self.defaults.int64_as_numbers
        ));

        output
    }
}

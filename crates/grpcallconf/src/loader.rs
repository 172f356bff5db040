//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, GrpcallConfig};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations, optionally with a CLI override path.
///
/// Returns paths in load order (system, user, local). Only returns files that exist.
/// If `cli_path` is provided and exists, it replaces the local override; `~/` and
/// `$VAR/` prefixes in it are expanded.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/grpcall/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("grpcall/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path.map(|p| expand_path(&p.to_string_lossy())) {
        if path.exists() {
            files.push(path);
            return files;
        }
    }

    let local = PathBuf::from("grpcall.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load a TOML file on top of `base`. Keys absent from the file keep their base value.
pub fn load_from_file(path: &Path, base: GrpcallConfig) -> Result<GrpcallConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path, base)
}

fn parse_error(path: &Path, message: impl Into<String>) -> ConfigError {
    ConfigError::Parse {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Overlay a TOML document onto `base`.
fn parse_toml(contents: &str, path: &Path, base: GrpcallConfig) -> Result<GrpcallConfig, ConfigError> {
    let table: toml::Table = contents
        .parse()
        .map_err(|e: toml::de::Error| parse_error(path, e.to_string()))?;

    let mut config = base;

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.infra.telemetry.otlp_endpoint = v.to_string();
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.infra.telemetry.log_level = v.to_string();
        }
    }

    if let Some(dial) = table.get("dial").and_then(|v| v.as_table()) {
        if let Some(v) = dial.get("max_recv_message_bytes").and_then(|v| v.as_integer()) {
            config.infra.dial.max_recv_message_bytes = usize::try_from(v)
                .map_err(|_| parse_error(path, format!("dial.max_recv_message_bytes out of range: {}", v)))?;
        }
        if let Some(v) = dial.get("connect_timeout_ms").and_then(|v| v.as_integer()) {
            config.infra.dial.connect_timeout_ms = non_negative(path, "dial.connect_timeout_ms", v)?;
        }
        if let Some(v) = dial.get("resolve_timeout_ms").and_then(|v| v.as_integer()) {
            config.infra.dial.resolve_timeout_ms = non_negative(path, "dial.resolve_timeout_ms", v)?;
        }
        if let Some(v) = dial.get("tcp_keepalive_secs").and_then(|v| v.as_integer()) {
            config.infra.dial.tcp_keepalive_secs = non_negative(path, "dial.tcp_keepalive_secs", v)?;
        }
    }

    if let Some(defaults) = table.get("defaults").and_then(|v| v.as_table()) {
        // Accept both `timeout_seconds = 30` and `timeout_seconds = 2.5`
        if let Some(v) = defaults.get("timeout_seconds") {
            config.defaults.timeout_seconds = v
                .as_float()
                .or_else(|| v.as_integer().map(|i| i as f64))
                .ok_or_else(|| parse_error(path, "defaults.timeout_seconds must be a number"))?;
        }
        if let Some(v) = defaults.get("tls").and_then(|v| v.as_bool()) {
            config.defaults.tls = v;
        }
        if let Some(v) = defaults.get("emit_default_fields").and_then(|v| v.as_bool()) {
            config.defaults.emit_default_fields = v;
        }
        if let Some(v) = defaults.get("proto_field_names").and_then(|v| v.as_bool()) {
            config.defaults.proto_field_names = v;
        }
        if let Some(v) = defaults.get("int64_as_numbers").and_then(|v| v.as_bool()) {
            config.defaults.int64_as_numbers = v;
        }
    }

    Ok(config)
}

fn non_negative(path: &Path, key: &str, v: i64) -> Result<u64, ConfigError> {
    u64::try_from(v).map_err(|_| parse_error(path, format!("{} must be non-negative, got {}", key, v)))
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut GrpcallConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, env::vars());
}

/// Apply overrides from an arbitrary set of variables.
///
/// Unparseable numeric or boolean values are skipped rather than failing the load.
pub fn apply_overrides_from<I>(config: &mut GrpcallConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: HashMap<String, String> = vars.into_iter().collect();

    if let Some(v) = take(&vars, sources, "GRPCALL_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v.clone();
    }
    // Also support standard OTEL env var
    if let Some(v) = take(&vars, sources, "OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v.clone();
    }
    if let Some(v) = take(&vars, sources, "GRPCALL_LOG_LEVEL") {
        config.infra.telemetry.log_level = v.clone();
    }
    if let Some(v) = take(&vars, sources, "RUST_LOG") {
        config.infra.telemetry.log_level = v.clone();
    }

    if let Some(Ok(v)) = take(&vars, sources, "GRPCALL_MAX_RECV_MESSAGE_BYTES").map(|v| v.parse()) {
        config.infra.dial.max_recv_message_bytes = v;
    }
    if let Some(Ok(v)) = take(&vars, sources, "GRPCALL_CONNECT_TIMEOUT_MS").map(|v| v.parse()) {
        config.infra.dial.connect_timeout_ms = v;
    }
    if let Some(Ok(v)) = take(&vars, sources, "GRPCALL_RESOLVE_TIMEOUT_MS").map(|v| v.parse()) {
        config.infra.dial.resolve_timeout_ms = v;
    }

    if let Some(Ok(v)) = take(&vars, sources, "GRPCALL_TIMEOUT_SECONDS").map(|v| v.parse()) {
        config.defaults.timeout_seconds = v;
    }
    if let Some(Ok(v)) = take(&vars, sources, "GRPCALL_TLS").map(|v| v.parse()) {
        config.defaults.tls = v;
    }
}

/// Look up `key`, recording it as an override source when present.
fn take<'a>(
    vars: &'a HashMap<String, String>,
    sources: &mut ConfigSources,
    key: &str,
) -> Option<&'a String> {
    let v = vars.get(key);
    if v.is_some() {
        sources.env_overrides.push(key.to_string());
    }
    v
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        PathBuf::from(path)
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            match env::var(var_name) {
                Ok(var_value) => PathBuf::from(var_value).join(&stripped[slash_pos + 1..]),
                Err(_) => PathBuf::from(path),
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

//! CLI command implementations

use anyhow::{bail, Context, Result};
use grpcallconf::{ConfigSources, GrpcallConfig};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::request::Target;
use crate::tool::GrpcCallTool;

/// Run one call built from flags. Returns whether it succeeded.
pub async fn call(
    config: &GrpcallConfig,
    address: &str,
    service: &str,
    method: &str,
    request: Option<&str>,
    timeout: Option<f64>,
    tls: bool,
) -> Result<bool> {
    let request: Value = match request {
        Some(text) => serde_json::from_str(text).context("Failed to parse --request as JSON")?,
        None => json!({}),
    };

    let mut params = json!({
        "address": address,
        "service": service,
        "method": method,
        "request": request,
    });
    if let Some(secs) = timeout {
        params["timeout_seconds"] = json!(secs);
    }
    if tls {
        params["tls"] = json!(true);
    }

    run_tool(config, &params).await
}

/// Run a raw tool parameter record. Returns whether it succeeded.
pub async fn exec(config: &GrpcallConfig, params_json: &str) -> Result<bool> {
    let params: Value =
        serde_json::from_str(params_json).context("Failed to parse parameters as JSON")?;
    run_tool(config, &params).await
}

async fn run_tool(config: &GrpcallConfig, params: &Value) -> Result<bool> {
    let tool = GrpcCallTool::new(config);
    let cancel = CancellationToken::new();

    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling call");
            on_interrupt.cancel();
        }
    });

    let result = tool.execute_with_cancel(params, &cancel).await;
    interrupt.abort();
    tool.close().await;

    println!("{}", serde_json::to_string_pretty(&result.to_json())?);
    Ok(result.success)
}

/// List the services a server advertises through reflection
pub async fn services(config: &GrpcallConfig, address: &str, tls: bool) -> Result<()> {
    if address.trim().is_empty() {
        bail!("--address is required (e.g., 'localhost:9090')");
    }

    let tool = GrpcCallTool::new(config);
    let gateway = tool.gateway();
    let listed: Result<Vec<String>> = async {
        let conn = gateway.pool().acquire(&Target::new(address, tls)).await?;
        let services = gateway
            .resolver()
            .list_services(&conn)
            .await
            .with_context(|| format!("Failed to list services on {}", address))?;
        Ok(services)
    }
    .await;
    tool.close().await;

    let services = listed?;
    println!("{}", serde_json::to_string_pretty(&services)?);
    Ok(())
}

/// Print the tool's input schema
pub fn schema() -> Result<()> {
    let tool = GrpcCallTool::default();
    let schema = json!({
        "name": tool.name(),
        "description": tool.description(),
        "input_schema": tool.input_schema(),
    });
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Print the effective configuration and where it came from
pub fn show_config(config: &GrpcallConfig, sources: &ConfigSources) -> Result<()> {
    if sources.files.is_empty() {
        println!("# no config files found, using defaults");
    }
    for path in &sources.files {
        println!("# loaded: {}", path.display());
    }
    for var in &sources.env_overrides {
        println!("# override: {}", var);
    }
    println!();
    print!("{}", config.to_toml());
    Ok(())
}

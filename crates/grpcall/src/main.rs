//! grpcall - call any reflection-enabled gRPC server with JSON
//!
//! Subcommands:
//! - `grpcall call` - Invoke one unary method
//! - `grpcall exec <json>` - Run a raw `grpc_call` parameter record
//! - `grpcall services` - List services advertised through reflection
//! - `grpcall schema` - Print the tool's input schema
//! - `grpcall config` - Show the effective configuration

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grpcall::{commands, telemetry};
use grpcallconf::GrpcallConfig;

#[derive(Parser)]
#[command(name = "grpcall")]
#[command(about = "Dynamic gRPC client driven by server reflection")]
#[command(version)]
struct Cli {
    /// Config file replacing ./grpcall.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// OTLP gRPC endpoint for OpenTelemetry (e.g., "localhost:4317")
    #[arg(long, global = true)]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a unary method
    Call {
        /// gRPC server address (e.g., localhost:9090)
        #[arg(short, long)]
        address: String,

        /// Fully qualified service name (e.g., loom.v1.LoomService)
        #[arg(short, long)]
        service: String,

        /// Method name (e.g., Weave)
        #[arg(short, long)]
        method: String,

        /// Request message as a JSON object
        #[arg(short, long)]
        request: Option<String>,

        /// Call timeout in seconds
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Use TLS
        #[arg(long)]
        tls: bool,
    },

    /// Run a raw grpc_call parameter record
    Exec {
        /// JSON object with address, service, method, request, timeout_seconds, tls
        json: String,
    },

    /// List services exposed through reflection
    Services {
        /// gRPC server address
        #[arg(short, long)]
        address: String,

        /// Use TLS
        #[arg(long)]
        tls: bool,
    },

    /// Print the grpc_call tool schema
    Schema,

    /// Show the effective configuration and its sources
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (mut config, sources) = GrpcallConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(endpoint) = cli.otlp_endpoint {
        config.infra.telemetry.otlp_endpoint = endpoint;
    }

    let _telemetry = telemetry::init(&config.infra.telemetry)?;

    let success = match cli.command {
        Commands::Call {
            address,
            service,
            method,
            request,
            timeout,
            tls,
        } => {
            commands::call(
                &config,
                &address,
                &service,
                &method,
                request.as_deref(),
                timeout,
                tls,
            )
            .await?
        }
        Commands::Exec { json } => commands::exec(&config, &json).await?,
        Commands::Services { address, tls } => {
            commands::services(&config, &address, tls).await?;
            true
        }
        Commands::Schema => {
            commands::schema()?;
            true
        }
        Commands::Config => {
            commands::show_config(&config, &sources)?;
            true
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

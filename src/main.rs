//! Storage gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!   RPC clients ────────▶│  rpc listener ──┐                            │
//!                        │                 ├──▶ buffer pool             │
//!   HTTP clients ───────▶│  http listener ─┘        │                   │
//!                        │                          ▼                   │
//!                        │                 storage connection ──────────┼──▶ management
//!                        │                                              │    servers
//!                        │  ┌────────────────────────────────────────┐  │
//!                        │  │ lifecycle: startup chain, shutdown     │  │
//!                        │  │ trigger, signals, buffer audit         │  │
//!                        │  └────────────────────────────────────────┘  │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use storage_gateway::buffers::BufferPool;
use storage_gateway::config::{load_or_default, ServiceConfig};
use storage_gateway::lifecycle::audit::audit_buffers;
use storage_gateway::lifecycle::signals::forward_os_signals;
use storage_gateway::lifecycle::{start_default_servers, ShutdownReason, ShutdownTrigger, StartupContext};
use storage_gateway::observability::{logging, metrics};
use storage_gateway::security::ApiKeyCache;
use storage_gateway::storage::MgmConnection;
use storage_gateway::version;

#[derive(Parser)]
#[command(name = "storage-gateway")]
#[command(about = "RPC and HTTP gateway in front of a storage cluster", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print version information and exit
    #[arg(long)]
    version: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", version::version_line());
        return ExitCode::SUCCESS;
    }

    let (config, source) = match load_or_default(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(error) => {
            eprintln!("storage-gateway: {error}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = logging::init_logging(&config.log) {
        eprintln!("storage-gateway: {error}");
        return ExitCode::FAILURE;
    }

    tracing::info!(version = version::VERSION, api_version = version::API_VERSION, "storage-gateway starting");
    tracing::info!(
        source = %source,
        rpc = %format!("{}:{}", config.rpc.server_ip, config.rpc.server_port),
        rest = %format!("{}:{}", config.rest.server_ip, config.rest.server_port),
        storage = %config.storage.connect_string(),
        tls = config.security.enable_tls,
        "Configuration loaded"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if config.internal.worker_threads > 0 {
        builder.worker_threads(config.internal.worker_threads);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(error = %error, "Failed building runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(Arc::new(config))) {
        Ok(ShutdownReason::ListenerFailure { .. }) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Arc<ServiceConfig>) -> Result<ShutdownReason, Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(error) = metrics::init_metrics(addr) {
                    tracing::warn!(error = %error, "Metrics exporter not installed");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (trigger, shutdown) = ShutdownTrigger::new();
    let _signals = forward_os_signals(trigger.clone())?;

    let buffers = BufferPool::open(&config.internal)?;
    let storage = Arc::new(MgmConnection::new(config.storage.connect_timeout()));

    let servers = match start_default_servers(StartupContext {
        config: Arc::clone(&config),
        storage,
        buffers: Arc::clone(&buffers),
        auth_cache: ApiKeyCache::new(),
        trigger,
    })
    .await
    {
        Ok(servers) => servers,
        Err(error) => {
            buffers.release();
            return Err(error.into());
        }
    };

    let reason = shutdown.wait().await;
    tracing::info!(reason = %reason, "Shutting down server...");

    servers.teardown().await;
    audit_buffers(&*buffers);
    buffers.release();

    tracing::info!("Shutdown complete");
    Ok(reason)
}

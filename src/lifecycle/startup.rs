//! Startup orchestration.
//!
//! # Responsibilities
//! - Acquire the shared resources in dependency order
//! - Register one rollback action per acquired resource before moving on
//! - Undo exactly what was acquired when a step fails
//! - Hand back a single composite teardown when everything is up
//!
//! # Design Decisions
//! - Fail fast: the first failing step ends startup
//! - Steps run sequentially, not concurrently
//! - Listeners start last (traffic only when storage is ready)
//!
//! # Data Flow
//! ```text
//! storage connect ──► TLS material (if enabled) ──► RPC listener ──► HTTP listener
//!       │                     │                          │                 │
//!   disconnect             discard                     stop              stop
//!       └──────────── CleanupChain (runs in reverse) ─────────────────────┘
//!                                                       + auth cache reset (last)
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::buffers::BufferPool;
use crate::config::ServiceConfig;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::cleanup::{BoxError, CleanupChain, CleanupReport};
use crate::lifecycle::shutdown::ShutdownTrigger;
use crate::net::listener::ListenerError;
use crate::net::tls::{TlsError, TlsMaterial};
use crate::rpc::RpcServer;
use crate::security::ApiKeyCache;
use crate::storage::{StorageEngine, StorageError};

/// Everything the orchestrator needs, owned by the caller.
pub struct StartupContext<S> {
    pub config: Arc<ServiceConfig>,
    pub storage: Arc<S>,
    pub buffers: Arc<BufferPool>,
    pub auth_cache: ApiKeyCache,
    pub trigger: ShutdownTrigger,
}

/// The acquisition steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStep {
    StorageConnection,
    TlsMaterial,
    RpcListener,
    HttpListener,
}

impl fmt::Display for StartupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StartupStep::StorageConnection => "storage connection",
            StartupStep::TlsMaterial => "TLS material",
            StartupStep::RpcListener => "RPC listener",
            StartupStep::HttpListener => "HTTP listener",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed creating storage connection; error: {0}")]
    Storage(#[source] StorageError),

    #[error("failed generating TLS material; error: {0}")]
    Tls(#[source] TlsError),

    #[error("failed starting RPC server; error: {0}")]
    RpcListener(#[source] ListenerError),

    #[error("failed starting HTTP server; error: {0}")]
    HttpListener(#[source] ListenerError),
}

impl StartupError {
    pub fn step(&self) -> StartupStep {
        match self {
            StartupError::Storage(_) => StartupStep::StorageConnection,
            StartupError::Tls(_) => StartupStep::TlsMaterial,
            StartupError::RpcListener(_) => StartupStep::RpcListener,
            StartupError::HttpListener(_) => StartupStep::HttpListener,
        }
    }
}

/// Both listeners up; owns the composite teardown.
pub struct RunningServers {
    chain: CleanupChain,
    rpc_addr: SocketAddr,
    http_addr: SocketAddr,
}

impl RunningServers {
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Teardown actions in the order they will run.
    pub fn teardown_plan(&self) -> Vec<&str> {
        self.chain.pending()
    }

    /// Stop both listeners, close storage, reset the auth cache.
    pub async fn teardown(self) -> CleanupReport {
        tracing::info!("Tearing down servers");
        let report = self.chain.run().await;
        if report.failed.is_empty() {
            tracing::info!(steps = report.completed.len(), "Teardown complete");
        } else {
            tracing::warn!(failed = ?report.failed, "Teardown finished with errors");
        }
        report
    }
}

/// Bring up storage, TLS, the RPC listener and the HTTP listener, in that
/// order. On failure every resource acquired so far is released, last
/// acquired first, before the error is returned.
pub async fn start_default_servers<S: StorageEngine>(
    ctx: StartupContext<S>,
) -> Result<RunningServers, StartupError> {
    let mut chain = CleanupChain::new();

    match acquire(&ctx, &mut chain).await {
        Ok((rpc_addr, http_addr)) => {
            let auth_cache = ctx.auth_cache.clone();
            chain.push_final("auth cache reset", move || {
                auth_cache.reset();
                Ok::<(), BoxError>(())
            });

            tracing::info!(rpc = %rpc_addr, http = %http_addr, "Servers started");
            Ok(RunningServers {
                chain,
                rpc_addr,
                http_addr,
            })
        }
        Err(error) => {
            tracing::error!(step = %error.step(), error = %error, "Startup failed, rolling back");
            let report = chain.run().await;
            tracing::info!(
                rolled_back = report.completed.len(),
                failed = report.failed.len(),
                "Rollback complete"
            );
            Err(error)
        }
    }
}

async fn acquire<S: StorageEngine>(
    ctx: &StartupContext<S>,
    chain: &mut CleanupChain,
) -> Result<(SocketAddr, SocketAddr), StartupError> {
    let config = &ctx.config;
    let shutdown_timeout = config.lifecycle.shutdown_timeout();

    // 1. Storage
    let connect_string = config.storage.connect_string();
    tracing::info!(connect_string = %connect_string, "Connecting to storage");
    let storage = Arc::clone(&ctx.storage);
    tokio::task::spawn_blocking(move || storage.connect(&connect_string))
        .await
        .map_err(|join_error| StorageError::Task(join_error.to_string()))
        .and_then(|connected| connected)
        .map_err(StartupError::Storage)?;

    let storage = Arc::clone(&ctx.storage);
    chain.push("storage connection", move || async move {
        tokio::task::spawn_blocking(move || storage.disconnect()).await??;
        Ok::<(), BoxError>(())
    });

    // 2. TLS
    let tls = if config.security.enable_tls {
        let security = &config.security;
        let material = TlsMaterial::generate(
            security.require_and_verify_client_cert,
            Path::new(&security.root_ca_cert_file),
            Path::new(&security.certificate_file),
            Path::new(&security.private_key_file),
        )
        .map_err(StartupError::Tls)?;

        let held = material.clone();
        chain.push_sync("TLS material", move || {
            drop(held);
            tracing::debug!("TLS material discarded");
            Ok::<(), BoxError>(())
        });
        Some(material)
    } else {
        None
    };

    // 3. RPC listener
    let mut rpc = RpcServer::new(&config.rpc, Arc::clone(&ctx.buffers));
    if let Some(tls) = &tls {
        rpc = rpc.with_tls(tls);
    }
    let rpc = rpc
        .start(ctx.trigger.clone())
        .await
        .map_err(StartupError::RpcListener)?;
    let rpc_addr = rpc.local_addr();
    chain.push("RPC listener", move || rpc.stop(shutdown_timeout));

    // 4. HTTP listener
    let state = AppState {
        buffers: Arc::clone(&ctx.buffers),
    };
    let http = HttpServer::new(&config.rest, state)
        .start(tls.as_ref(), ctx.trigger.clone())
        .await
        .map_err(StartupError::HttpListener)?;
    let http_addr = http.local_addr();
    chain.push("HTTP listener", move || http.stop(shutdown_timeout));

    Ok((rpc_addr, http_addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_their_step() {
        let error = StartupError::Storage(StorageError::EmptyConnectString);
        assert_eq!(error.step(), StartupStep::StorageConnection);
        assert_eq!(
            error.to_string(),
            "failed creating storage connection; error: connect string is empty"
        );

        let error = StartupError::HttpListener(ListenerError::LimiterClosed);
        assert_eq!(error.step().to_string(), "HTTP listener");
    }
}

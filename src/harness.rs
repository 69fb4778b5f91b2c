//! Integration environment bring-up.
//!
//! Generates throwaway TLS certificates when TLS is enabled without
//! certificate files, creates the schema fixtures, opens the buffer pool and
//! starts both listeners, each step registering its undo on one
//! [`CleanupChain`]. Teardown runs in reverse: servers, buffer audit and
//! release, databases, certificates.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use thiserror::Error;

use crate::buffers::{BufferPool, BufferPoolError};
use crate::config::{SecurityConfig, ServiceConfig};
use crate::lifecycle::audit::{audit_buffers, AuditOutcome};
use crate::lifecycle::cleanup::{BoxError, CleanupChain, CleanupReport};
use crate::lifecycle::shutdown::{ShutdownListener, ShutdownTrigger};
use crate::lifecycle::startup::{start_default_servers, StartupContext, StartupError};
use crate::provisioning::{
    create_databases, MySqlConnector, ProvisionError, SchemaConnector, SchemaFixture,
};
use crate::security::ApiKeyCache;
use crate::storage::StorageEngine;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("schema provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("failed generating TLS certificates: {0}")]
    Certificates(#[from] rcgen::Error),

    #[error("failed writing TLS certificates: {0}")]
    CertificateFiles(#[from] std::io::Error),

    #[error("buffer pool unavailable: {0}")]
    Buffers(#[from] BufferPoolError),

    #[error(transparent)]
    Startup(#[from] StartupError),
}

#[derive(Debug, Error)]
#[error("{failed} teardown step(s) failed: {steps:?}")]
struct TeardownFailed {
    failed: usize,
    steps: Vec<String>,
}

#[derive(Debug, Error)]
#[error("buffers leaked: {0:?}")]
struct BuffersLeaked(AuditOutcome);

/// A running gateway plus its disposable databases.
pub struct TestEnvironment {
    chain: CleanupChain,
    buffers: Arc<BufferPool>,
    auth_cache: ApiKeyCache,
    trigger: ShutdownTrigger,
    shutdown: Option<ShutdownListener>,
    rpc_addr: SocketAddr,
    http_addr: SocketAddr,
    databases: Vec<String>,
    certificates: Option<PathBuf>,
}

impl TestEnvironment {
    /// Bring everything up. A failure undoes whatever was already created.
    pub async fn start<S, K>(
        config: ServiceConfig,
        storage: Arc<S>,
        connector: Arc<K>,
        fixtures: &[SchemaFixture],
    ) -> Result<Self, HarnessError>
    where
        S: StorageEngine,
        K: SchemaConnector,
    {
        let mut chain = CleanupChain::new();
        match Self::acquire(config, storage, connector, fixtures, &mut chain).await {
            Ok(mut env) => {
                env.chain = chain;
                Ok(env)
            }
            Err(error) => {
                tracing::error!(error = %error, "Test environment failed to start");
                chain.run().await;
                Err(error)
            }
        }
    }

    /// [`start`](Self::start) against the MySQL server named in
    /// `config.provisioning`.
    pub async fn start_with_mysql<S>(
        config: ServiceConfig,
        storage: Arc<S>,
        fixtures: &[SchemaFixture],
    ) -> Result<Self, HarnessError>
    where
        S: StorageEngine,
    {
        let connector = Arc::new(MySqlConnector::from_config(&config.provisioning));
        Self::start(config, storage, connector, fixtures).await
    }

    async fn acquire<S, K>(
        mut config: ServiceConfig,
        storage: Arc<S>,
        connector: Arc<K>,
        fixtures: &[SchemaFixture],
        chain: &mut CleanupChain,
    ) -> Result<Self, HarnessError>
    where
        S: StorageEngine,
        K: SchemaConnector,
    {
        let mut certificates = None;
        if config.security.enable_tls && config.security.certificate_file.is_empty() {
            let dir = generate_certificates(&mut config.security)?;
            certificates = Some(dir.path().to_path_buf());
            chain.push_sync("TLS certificates", move || dir.close());
        }

        let mut databases = Vec::new();
        if !fixtures.is_empty() {
            let teardown = create_databases(connector, fixtures).await?;
            databases = teardown.databases().to_vec();
            chain.push("schema fixtures", move || teardown.run());
        }

        let buffers = BufferPool::open(&config.internal)?;
        let pool = Arc::clone(&buffers);
        chain.push_sync("buffer pool", move || {
            let outcome = audit_buffers(&*pool);
            pool.release();
            if outcome.is_clean() {
                Ok(())
            } else {
                Err(BuffersLeaked(outcome))
            }
        });

        let auth_cache = ApiKeyCache::new();
        let (trigger, shutdown) = ShutdownTrigger::new();
        let servers = start_default_servers(StartupContext {
            config: Arc::new(config),
            storage,
            buffers: Arc::clone(&buffers),
            auth_cache: auth_cache.clone(),
            trigger: trigger.clone(),
        })
        .await?;

        let rpc_addr = servers.rpc_addr();
        let http_addr = servers.http_addr();
        chain.push("servers", move || async move {
            let report = servers.teardown().await;
            if report.failed.is_empty() {
                Ok::<(), BoxError>(())
            } else {
                Err(TeardownFailed {
                    failed: report.failed.len(),
                    steps: report.failed,
                }
                .into())
            }
        });

        Ok(Self {
            chain: CleanupChain::new(),
            buffers,
            auth_cache,
            trigger,
            shutdown: Some(shutdown),
            rpc_addr,
            http_addr,
            databases,
            certificates,
        })
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn buffers(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    pub fn auth_cache(&self) -> &ApiKeyCache {
        &self.auth_cache
    }

    pub fn trigger(&self) -> &ShutdownTrigger {
        &self.trigger
    }

    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    /// Directory holding the generated certificates, if any were generated.
    pub fn certificate_dir(&self) -> Option<&Path> {
        self.certificates.as_deref()
    }

    /// The single consumer of shutdown requests; `None` once taken.
    pub fn take_shutdown_listener(&mut self) -> Option<ShutdownListener> {
        self.shutdown.take()
    }

    /// Stop servers, audit and release buffers, drop the databases.
    pub async fn teardown(self) -> CleanupReport {
        self.chain.run().await
    }
}

/// Write a self-signed certificate for `localhost` into a fresh temporary
/// directory and point `security` at it. The certificate doubles as the root
/// CA when client certificates are required.
fn generate_certificates(security: &mut SecurityConfig) -> Result<TempDir, HarnessError> {
    let generated =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])?;
    let dir = tempfile::Builder::new().prefix("gateway-tls-").tempdir()?;

    let cert_path = dir.path().join("server.pem");
    let key_path = dir.path().join("server.key");
    std::fs::write(&cert_path, generated.cert.pem())?;
    std::fs::write(&key_path, generated.key_pair.serialize_pem())?;

    security.certificate_file = cert_path.display().to_string();
    security.private_key_file = key_path.display().to_string();
    if security.root_ca_cert_file.is_empty() {
        security.root_ca_cert_file = security.certificate_file.clone();
    }

    tracing::info!(dir = %dir.path().display(), "Generated TLS certificates");
    Ok(dir)
}

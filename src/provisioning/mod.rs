//! Disposable database provisioning for integration environments.
//!
//! # Data Flow
//! ```text
//! fixtures[0..n] ──► create on one shared connection
//!                        │ success: append "DROP DATABASE `<name>`;" to the drop batch
//!                        │ failure: close shared connection,
//!                        │          run drop batch on a fresh connection,
//!                        │          return error naming the fixture
//!                        ▼
//!                 FixtureTeardown (fresh connection, whole drop batch)
//! ```
//!
//! # Design Decisions
//! - The drop batch only ever names databases whose creation succeeded
//! - Rollback uses a new connection; the shared one may be in a bad state

mod fixture;
pub mod mysql;

pub use fixture::{split_statements, SchemaFixture};
pub use mysql::MySqlConnector;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::lifecycle::cleanup::BoxError;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed reading schema file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' is not a valid database name")]
    InvalidName(String),

    #[error("failed connecting to the schema database: {0}")]
    Connect(#[source] BoxError),

    #[error("failed executing '{statement}': {source}")]
    Execute {
        statement: String,
        #[source]
        source: BoxError,
    },

    #[error("failed closing schema connection: {0}")]
    Close(#[source] BoxError),

    #[error("failed creating database '{fixture}'; error: {source}")]
    Create {
        fixture: String,
        #[source]
        source: Box<ProvisionError>,
    },
}

/// An open session that executes one statement at a time.
pub trait SchemaConnection: Send {
    fn execute(&mut self, statement: &str) -> impl Future<Output = Result<(), ProvisionError>> + Send;

    fn close(self) -> impl Future<Output = Result<(), ProvisionError>> + Send;
}

/// Opens [`SchemaConnection`]s.
pub trait SchemaConnector: Send + Sync + 'static {
    type Connection: SchemaConnection;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection, ProvisionError>> + Send;
}

async fn run_batch<C: SchemaConnection>(conn: &mut C, batch: &str) -> Result<(), ProvisionError> {
    for statement in split_statements(batch) {
        conn.execute(statement).await?;
    }
    Ok(())
}

/// Run `batch` on a connection of its own, then close it.
async fn run_on_fresh_connection<K: SchemaConnector>(
    connector: &K,
    batch: &str,
) -> Result<(), ProvisionError> {
    let mut conn = connector.connect().await?;
    let result = run_batch(&mut conn, batch).await;
    if let Err(error) = conn.close().await {
        tracing::warn!(error = %error, "Failed closing schema connection");
    }
    result
}

/// Create every fixture in order.
///
/// If one fails, the databases created before it are dropped and the error
/// names the failing fixture; later fixtures are never attempted. Fixture
/// names are checked before any connection is opened.
pub async fn create_databases<K: SchemaConnector>(
    connector: Arc<K>,
    fixtures: &[SchemaFixture],
) -> Result<FixtureTeardown<K>, ProvisionError> {
    for fixture in fixtures {
        fixture.validate()?;
    }

    let mut conn = connector.connect().await?;
    let mut drop_batch = String::new();
    let mut created = Vec::new();

    for fixture in fixtures {
        match run_batch(&mut conn, &fixture.create_script).await {
            Ok(()) => {
                tracing::info!(database = %fixture.name, "Database created");
                drop_batch.push_str(&fixture.drop_script());
                created.push(fixture.name.clone());
            }
            Err(error) => {
                tracing::error!(database = %fixture.name, error = %error, "Failed creating database");
                if let Err(close_error) = conn.close().await {
                    tracing::warn!(error = %close_error, "Failed closing schema connection");
                }

                if !drop_batch.is_empty() {
                    match run_on_fresh_connection(&*connector, &drop_batch).await {
                        Ok(()) => tracing::info!(databases = ?created, "Dropped databases created so far"),
                        Err(drop_error) => tracing::error!(
                            databases = ?created,
                            error = %drop_error,
                            "Failed dropping databases created so far"
                        ),
                    }
                }

                return Err(ProvisionError::Create {
                    fixture: fixture.name.clone(),
                    source: Box::new(error),
                });
            }
        }
    }

    if let Err(error) = conn.close().await {
        tracing::warn!(error = %error, "Failed closing schema connection");
    }

    Ok(FixtureTeardown {
        connector,
        drop_batch,
        databases: created,
    })
}

/// Drops every database created by [`create_databases`].
pub struct FixtureTeardown<K> {
    connector: Arc<K>,
    drop_batch: String,
    databases: Vec<String>,
}

impl<K: SchemaConnector> FixtureTeardown<K> {
    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    pub fn drop_batch(&self) -> &str {
        &self.drop_batch
    }

    /// Drop all databases on a new connection.
    pub async fn run(self) -> Result<(), ProvisionError> {
        if self.drop_batch.is_empty() {
            return Ok(());
        }
        run_on_fresh_connection(&*self.connector, &self.drop_batch).await?;
        tracing::info!(databases = ?self.databases, "Databases dropped");
        Ok(())
    }
}

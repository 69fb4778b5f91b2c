//! Storage engine connection.
//!
//! # Data Flow
//! ```text
//! StorageConfig.connect_string()  ("ip:port,ip:port")
//!     → StorageEngine::connect (first reachable management server wins)
//!     → one shared connection used by both listeners
//!     → StorageEngine::disconnect (orchestrator teardown only)
//! ```
//!
//! # Design Decisions
//! - The wire protocol is not spoken here; the engine only has to be
//!   opened once and closed once
//! - Calls are blocking and run on the blocking pool
//! - `disconnect` is idempotent so it is safe as a rollback action

mod connection;

pub use connection::MgmConnection;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connect string is empty")]
    EmptyConnectString,

    #[error("no management server in '{connect_string}' is reachable: {source}")]
    Unreachable {
        connect_string: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage connection is already open")]
    AlreadyConnected,

    #[error("failed closing storage connection: {0}")]
    Close(#[source] std::io::Error),

    #[error("storage task did not complete: {0}")]
    Task(String),
}

/// The single shared handle to the backing database.
pub trait StorageEngine: Send + Sync + 'static {
    /// Open the connection. Blocking.
    fn connect(&self, connect_string: &str) -> Result<(), StorageError>;

    /// Close the connection if open. Blocking and idempotent.
    fn disconnect(&self) -> Result<(), StorageError>;

    fn is_connected(&self) -> bool;
}

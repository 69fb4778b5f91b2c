//! Storage gateway library.
//!
//! Startup and shutdown orchestration for a gateway that serves an RPC and
//! an HTTP listener over one shared storage connection and buffer pool.

pub mod buffers;
pub mod config;
pub mod harness;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod provisioning;
pub mod rpc;
pub mod security;
pub mod storage;
pub mod version;

pub use buffers::BufferPool;
pub use config::ServiceConfig;
pub use lifecycle::{start_default_servers, RunningServers, ShutdownReason, ShutdownTrigger, StartupContext};
pub use storage::{MgmConnection, StorageEngine};

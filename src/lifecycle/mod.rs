//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Storage → TLS → RPC listener → HTTP listener, each pushing a rollback
//!     action onto the CleanupChain (cleanup.rs)
//!
//! Running:
//!     OS signals (signals.rs) and listener failures post to one
//!     ShutdownTrigger (shutdown.rs); the first post wins
//!
//! Shutdown:
//!     Trigger fires → composite teardown (chain in reverse) → buffer audit
//!     (audit.rs) → release buffer pool → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup, reverse-ordered teardown
//! - A failed startup step rolls back only what was acquired
//! - Listener stop has a timeout: forced close after the deadline

pub mod audit;
pub mod cleanup;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use cleanup::{BoxError, CleanupChain, CleanupReport};
pub use shutdown::{OsSignal, ShutdownListener, ShutdownReason, ShutdownTrigger};
pub use startup::{start_default_servers, RunningServers, StartupContext, StartupError, StartupStep};

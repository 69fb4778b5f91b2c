//! RPC listener subsystem.
//!
//! # Data Flow
//! ```text
//! TCP (optionally TLS) connection
//!     → server.rs (bounded accept, one task per connection)
//!     → protocol.rs (one JSON request per line)
//!     → dispatch (ping, stat)
//!     → response encoded into a pooled buffer
//! ```
//!
//! # Design Decisions
//! - Each response borrows a buffer from the shared pool, so the leak audit
//!   covers this listener
//! - On stop, connections finish the request they are on and then close;
//!   stragglers are aborted when the drain deadline passes

pub mod protocol;
pub mod server;

pub use protocol::{RpcRequest, RpcResponse};
pub use server::RpcServer;

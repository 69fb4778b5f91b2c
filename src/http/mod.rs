//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum-server, Router under /{API_VERSION})
//!     → middleware/error_envelope.rs (installs the request's ErrorLog)
//!     → handler (ping, stat, fallback)
//!     → error envelope renders the last recorded error, if any
//!     → Send to client
//! ```

pub mod errors;
pub mod middleware;
pub mod server;

pub use errors::{ApiError, ErrorLog};
pub use server::{AppState, HttpServer};

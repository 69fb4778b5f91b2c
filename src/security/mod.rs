//! Security subsystem.
//!
//! TLS material lives in `net::tls`; this module holds the credential
//! caches the listeners share.

pub mod auth_cache;

pub use auth_cache::{ApiKeyCache, CachedApiKey};

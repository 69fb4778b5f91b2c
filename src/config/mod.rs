//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! --config <path> (TOML, optional)
//!     → loader.rs (read, parse & deserialize, or defaults)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via Arc to every acquisition step
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults so an absent file is a valid config
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError, ConfigSource};
pub use schema::{
    InternalConfig, LifecycleConfig, LogConfig, LogFormat, ManagementServer, ObservabilityConfig,
    ProvisioningConfig, RestConfig, RpcConfig, SecurityConfig, ServiceConfig, StorageConfig,
};
pub use validation::ValidationError;

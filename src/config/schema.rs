//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files, and
//! every section falls back to its defaults so a missing file is a valid
//! configuration.

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Runtime sizing and buffer pool settings.
    pub internal: InternalConfig,

    /// RPC listener settings.
    pub rpc: RpcConfig,

    /// HTTP listener settings.
    pub rest: RestConfig,

    /// Storage engine connection settings.
    pub storage: StorageConfig,

    /// TLS settings shared by both listeners.
    pub security: SecurityConfig,

    /// Startup and shutdown timing.
    pub lifecycle: LifecycleConfig,

    /// Log sink settings.
    pub log: LogConfig,

    /// Metrics exporter settings.
    pub observability: ObservabilityConfig,

    /// Disposable schema provisioning (test environments only).
    pub provisioning: ProvisioningConfig,
}

/// Runtime and buffer pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct InternalConfig {
    /// Tokio worker threads. `0` keeps the runtime default (one per core).
    pub worker_threads: usize,

    /// Size of each pooled buffer in bytes.
    pub buffer_size: usize,

    /// Number of buffers allocated when the pool opens.
    pub preallocated_buffers: usize,
}

impl Default for InternalConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            buffer_size: 32 * 1024,
            preallocated_buffers: 32,
        }
    }
}

/// RPC listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    pub server_ip: String,
    pub server_port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            server_ip: "0.0.0.0".to_string(),
            server_port: 4406,
            max_connections: 10_000,
        }
    }
}

impl RpcConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        socket_addr(&self.server_ip, self.server_port)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RestConfig {
    pub server_ip: String,
    pub server_port: u16,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            server_ip: "0.0.0.0".to_string(),
            server_port: 5406,
            request_timeout_secs: 30,
        }
    }
}

impl RestConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        socket_addr(&self.server_ip, self.server_port)
    }
}

fn socket_addr(ip: &str, port: u16) -> Result<SocketAddr, AddrParseError> {
    let ip: IpAddr = ip.parse()?;
    Ok(SocketAddr::new(ip, port))
}

/// A single storage management server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ManagementServer {
    pub ip: String,
    pub port: u16,
}

/// Storage engine connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Management servers, tried in order.
    pub management_servers: Vec<ManagementServer>,

    /// Per-server connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            management_servers: vec![ManagementServer {
                ip: "localhost".to_string(),
                port: 1186,
            }],
            connect_timeout_secs: 5,
        }
    }
}

impl StorageConfig {
    /// Comma-separated `ip:port` list handed to the storage engine.
    pub fn connect_string(&self) -> String {
        self.management_servers
            .iter()
            .map(|server| format!("{}:{}", server.ip, server.port))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// TLS configuration shared by both listeners.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Serve both listeners over TLS.
    pub enable_tls: bool,

    /// Reject clients that do not present a certificate signed by the root CA.
    pub require_and_verify_client_cert: bool,

    /// Path to the root CA certificate (PEM).
    pub root_ca_cert_file: String,

    /// Path to the server certificate chain (PEM).
    pub certificate_file: String,

    /// Path to the server private key (PEM).
    pub private_key_file: String,
}

/// Startup and shutdown timing.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long each listener may drain in-flight work before it is forced closed.
    pub shutdown_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 10,
        }
    }
}

impl LifecycleConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines, for development.
    #[default]
    Pretty,
    /// One JSON object per event, for log shipping.
    Json,
}

/// Log sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive (trace, debug, info, warn, error, or a full `EnvFilter` string).
    pub level: String,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Connection settings for disposable schema fixtures.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// SQL endpoint used to create and drop fixture databases.
    pub database_url: String,

    /// How long to keep retrying a refused connection.
    pub connect_timeout_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            database_url: "mysql://root@127.0.0.1:3306".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl ProvisioningConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffer sizes, timeouts)
//! - Check TLS settings reference the files they need
//! - Detect listener address conflicts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before any resource is acquired

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("storage.management_servers must list at least one server")]
    NoManagementServers,

    #[error("{listener}.server_ip '{ip}' is not a valid IP address")]
    InvalidIp { listener: &'static str, ip: String },

    #[error("rpc and rest listeners both bind {ip}:{port}")]
    PortConflict { ip: String, port: u16 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("security.{field} is required when {reason}")]
    MissingTlsFile {
        field: &'static str,
        reason: &'static str,
    },
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.storage.management_servers.is_empty() {
        errors.push(ValidationError::NoManagementServers);
    }

    if config.rpc.socket_addr().is_err() {
        errors.push(ValidationError::InvalidIp {
            listener: "rpc",
            ip: config.rpc.server_ip.clone(),
        });
    }
    if config.rest.socket_addr().is_err() {
        errors.push(ValidationError::InvalidIp {
            listener: "rest",
            ip: config.rest.server_ip.clone(),
        });
    }
    // Port 0 asks the OS for an ephemeral port, so two zeros never clash.
    if config.rpc.server_port != 0
        && config.rpc.server_port == config.rest.server_port
        && config.rpc.server_ip == config.rest.server_ip
    {
        errors.push(ValidationError::PortConflict {
            ip: config.rpc.server_ip.clone(),
            port: config.rpc.server_port,
        });
    }

    if config.internal.buffer_size == 0 {
        errors.push(ValidationError::Zero { field: "internal.buffer_size" });
    }
    if config.rpc.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "rpc.max_connections" });
    }
    if config.rest.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "rest.request_timeout_secs",
        });
    }
    if config.lifecycle.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "lifecycle.shutdown_timeout_secs",
        });
    }

    let security = &config.security;
    if security.enable_tls {
        if security.certificate_file.is_empty() {
            errors.push(ValidationError::MissingTlsFile {
                field: "certificate_file",
                reason: "enable_tls is set",
            });
        }
        if security.private_key_file.is_empty() {
            errors.push(ValidationError::MissingTlsFile {
                field: "private_key_file",
                reason: "enable_tls is set",
            });
        }
        if security.require_and_verify_client_cert && security.root_ca_cert_file.is_empty() {
            errors.push(ValidationError::MissingTlsFile {
                field: "root_ca_cert_file",
                reason: "require_and_verify_client_cert is set",
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let mut config = ServiceConfig::default();
        config.rest.request_timeout_secs = 0;

        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::Zero {
                field: "rest.request_timeout_secs"
            }])
        );
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ServiceConfig::default();
        config.storage.management_servers.clear();
        config.internal.buffer_size = 0;
        config.rest.server_port = config.rpc.server_port;
        config.security.enable_tls = true;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::NoManagementServers));
        assert!(errors.contains(&ValidationError::Zero { field: "internal.buffer_size" }));
        assert!(errors.contains(&ValidationError::PortConflict {
            ip: "0.0.0.0".into(),
            port: 4406
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::MissingTlsFile { field: "certificate_file", .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::MissingTlsFile { field: "private_key_file", .. })));
    }

    #[test]
    fn ephemeral_ports_do_not_conflict() {
        let mut config = ServiceConfig::default();
        config.rpc.server_port = 0;
        config.rest.server_port = 0;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn client_verification_needs_a_ca() {
        let mut config = ServiceConfig::default();
        config.security.enable_tls = true;
        config.security.require_and_verify_client_cert = true;
        config.security.certificate_file = "server.pem".into();
        config.security.private_key_file = "server.key".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MissingTlsFile {
                field: "root_ca_cert_file",
                reason: "require_and_verify_client_cert is set",
            }]
        );
    }

    #[test]
    fn rejects_unparsable_listener_ip() {
        let mut config = ServiceConfig::default();
        config.rpc.server_ip = "not-an-ip".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidIp {
                listener: "rpc",
                ip: "not-an-ip".into()
            }]
        );
    }
}

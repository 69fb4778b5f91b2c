//! TLS configuration and certificate loading.
//!
//! One rustls `ServerConfig` is built from the configured PEM files and
//! shared by both listeners: the RPC listener wraps accepted streams with a
//! `tokio_rustls::TlsAcceptor`, the HTTP listener hands it to axum-server.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("{what} file not found: {path:?}")]
    NotFound { what: &'static str, path: PathBuf },

    #[error("failed reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS material: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("failed building client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Server-side TLS state shared by the RPC and HTTP listeners.
#[derive(Clone)]
pub struct TlsMaterial {
    server_config: Arc<ServerConfig>,
}

impl TlsMaterial {
    /// Load the certificate chain and key, and when `require_client_cert`
    /// is set, a client verifier rooted at `root_ca`.
    pub fn generate(
        require_client_cert: bool,
        root_ca: &Path,
        certificate: &Path,
        private_key: &Path,
    ) -> Result<Self, TlsError> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let certs = load_certs(certificate, "Certificate")?;
        let key = load_private_key(private_key)?;

        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?;

        let builder = if require_client_cert {
            let roots = load_roots(root_ca)?;
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()?;
            builder.with_client_cert_verifier(verifier)
        } else {
            builder.with_no_client_auth()
        };

        let server_config = builder.with_single_cert(certs, key)?;

        tracing::info!(
            certificate = %certificate.display(),
            client_auth = require_client_cert,
            "TLS material loaded"
        );

        Ok(Self {
            server_config: Arc::new(server_config),
        })
    }

    /// Acceptor for the raw TCP (RPC) listener.
    pub fn rpc_acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(Arc::clone(&self.server_config))
    }

    /// Config for the HTTP listener, advertising h2 and http/1.1.
    pub fn http_config(&self) -> RustlsConfig {
        let mut config = (*self.server_config).clone();
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        RustlsConfig::from_config(Arc::new(config))
    }
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial").finish_non_exhaustive()
    }
}

fn open(path: &Path, what: &'static str) -> Result<BufReader<File>, TlsError> {
    if !path.exists() {
        return Err(TlsError::NotFound {
            what,
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &Path, what: &'static str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path, what)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path, "Private key")?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

fn load_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path, "Root CA")? {
        roots.add(cert)?;
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_pem(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_certificate_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = TlsMaterial::generate(
            false,
            Path::new(""),
            &dir.path().join("absent.pem"),
            &dir.path().join("absent.key"),
        )
        .unwrap_err();
        assert!(matches!(err, TlsError::NotFound { what: "Certificate", .. }));
    }

    #[test]
    fn empty_pem_has_no_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let cert = write_pem(dir.path(), "cert.pem", "");
        let key = write_pem(dir.path(), "key.pem", "");
        let err = TlsMaterial::generate(false, Path::new(""), &cert, &key).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }

    #[test]
    fn loads_self_signed_material_with_client_auth() {
        let dir = tempfile::tempdir().unwrap();
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let cert = write_pem(dir.path(), "cert.pem", &generated.cert.pem());
        let key = write_pem(dir.path(), "key.pem", &generated.key_pair.serialize_pem());

        let material = TlsMaterial::generate(true, &cert, &cert, &key).unwrap();
        let _acceptor = material.rpc_acceptor();
        let _http = material.http_config();
    }
}

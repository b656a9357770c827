//! mTLS configuration for the task channel
//!
//! Builds the client identity and trust root used to reach the trusted
//! execution node.

use thiserror::Error;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use zeroize::Zeroizing;

use crate::NodeConfig;

/// mTLS configuration errors
#[derive(Debug, Error)]
pub enum MtlsError {
    /// No client certificate available
    #[error("missing client certificate")]
    MissingCertificate,

    /// No client private key available
    #[error("missing client private key")]
    MissingKey,

    /// No certificate to verify the server against
    #[error("missing trusted execution peer certificate")]
    MissingTrustRoot,

    /// Material is not PEM text
    #[error("{0} is not valid UTF-8 PEM")]
    InvalidEncoding(&'static str),
}

/// Client-side mTLS configuration
#[derive(Clone)]
pub struct ClientMtlsConfig {
    /// Client certificate PEM
    pub client_cert_pem: String,
    /// Client private key PEM (zeroized on drop)
    pub client_key_pem: Zeroizing<String>,
    /// CA certificate PEM for verifying the server
    pub ca_cert_pem: String,
    /// Server domain name for verification
    pub server_domain: String,
}

impl ClientMtlsConfig {
    /// Create a new client mTLS config
    pub fn new(
        client_cert_pem: String,
        client_key_pem: Zeroizing<String>,
        ca_cert_pem: String,
        server_domain: String,
    ) -> Self {
        Self {
            client_cert_pem,
            client_key_pem,
            ca_cert_pem,
            server_domain,
        }
    }

    /// Build the config from a resolved [`NodeConfig`]
    ///
    /// The node's own certificate and key become the client identity and the
    /// trusted execution peer's certificate becomes the trust root.
    pub fn from_node_config(
        config: &NodeConfig,
        server_domain: impl Into<String>,
    ) -> Result<Self, MtlsError> {
        if config.cert().is_empty() {
            return Err(MtlsError::MissingCertificate);
        }
        if config.key().is_empty() {
            return Err(MtlsError::MissingKey);
        }
        if config.target_cert().is_empty() {
            return Err(MtlsError::MissingTrustRoot);
        }

        let client_cert_pem = pem_text(config.cert(), "client certificate")?;
        let client_key_pem = Zeroizing::new(pem_text(config.key(), "client private key")?);
        let ca_cert_pem = pem_text(config.target_cert(), "peer certificate")?;

        Ok(Self::new(
            client_cert_pem,
            client_key_pem,
            ca_cert_pem,
            server_domain.into(),
        ))
    }

    /// Build a tonic ClientTlsConfig
    pub fn to_tonic_config(&self) -> ClientTlsConfig {
        let identity = Identity::from_pem(&self.client_cert_pem, self.client_key_pem.as_bytes());
        let ca_cert = Certificate::from_pem(&self.ca_cert_pem);

        ClientTlsConfig::new()
            .identity(identity)
            .ca_certificate(ca_cert)
            .domain_name(&self.server_domain)
    }
}

impl std::fmt::Debug for ClientMtlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMtlsConfig")
            .field("server_domain", &self.server_domain)
            .field("client_key_pem", &"<redacted>")
            .finish_non_exhaustive()
    }
}

fn pem_text(bytes: &[u8], what: &'static str) -> Result<String, MtlsError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| MtlsError::InvalidEncoding(what))
}

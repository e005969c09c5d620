//! Server configuration.

use std::sync::Arc;

use tls_core::msgs::enums::HashAlgorithm;
use tls_core::suites::{Tls12CipherSuite, ALL_CIPHER_SUITES};

use crate::kx::{DhmParams, SupportedKxGroup, ALL_KX_GROUPS};
use crate::resolver::ResolvesServerConfig;
use crate::sign::ClientCertVerifier;
use crate::ticket::TicketSealer;

/// Server-wide, connection-independent configuration.
pub struct ServerConfig {
    /// Ciphersuites in server preference order; the server's order wins
    /// over the client's.
    pub cipher_suites: Vec<&'static Tls12CipherSuite>,

    /// Key-exchange groups in server preference order.
    pub kx_groups: Vec<&'static SupportedKxGroup>,

    /// Finite-field DH parameters for the DHE suites.
    pub dhm_params: Option<DhmParams>,

    /// SNI vhost resolver; also supplies the certificates.
    pub cert_resolver: Arc<dyn ResolvesServerConfig>,

    /// Session-ticket sealer; absent disables RFC 5077 entirely.
    pub ticketer: Option<Arc<dyn TicketSealer>>,

    /// ALPN protocols in server preference order; empty disables ALPN,
    /// in which case the extension is ignored.
    pub alpn_protocols: Vec<Vec<u8>>,

    /// Hash algorithms acceptable for handshake signatures, in
    /// preference order.
    pub allowed_hashes: Vec<HashAlgorithm>,

    /// Highest protocol minor version this deployment will ever offer;
    /// the FALLBACK_SCSV check compares the ClientHello against it.
    pub max_minor_version: u8,

    /// Ask clients for a certificate. The CertificateRequest writer does
    /// not serialise a CA-name list; clients pick by signature type.
    pub request_client_certificate: bool,

    /// Verifier for the client certificate chain; required when
    /// `request_client_certificate` is set.
    pub client_cert_verifier: Option<Arc<dyn ClientCertVerifier>>,
}

impl ServerConfig {
    pub fn new(cert_resolver: Arc<dyn ResolvesServerConfig>) -> Self {
        Self {
            cipher_suites: ALL_CIPHER_SUITES.to_vec(),
            kx_groups: ALL_KX_GROUPS.to_vec(),
            dhm_params: Some(DhmParams::modp2048()),
            cert_resolver,
            ticketer: None,
            alpn_protocols: Vec::new(),
            allowed_hashes: vec![
                HashAlgorithm::SHA256,
                HashAlgorithm::SHA384,
                HashAlgorithm::SHA512,
                HashAlgorithm::SHA1,
            ],
            max_minor_version: 3,
            request_client_certificate: false,
            client_cert_verifier: None,
        }
    }
}

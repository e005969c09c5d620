//! SNI vhost resolution.

use std::sync::Arc;

use crate::sign::CertifiedKey;

/// Per-vhost configuration bound by the SNI callback: the certificates
/// (and keys) this name may serve.
pub struct VhostConfig {
    pub certs: Vec<Arc<CertifiedKey>>,
}

impl VhostConfig {
    pub fn new(certs: Vec<Arc<CertifiedKey>>) -> Self {
        Self { certs }
    }
}

/// Binds a ClientHello to a vhost configuration.
pub trait ResolvesServerConfig: Send + Sync {
    /// Called once with the SNI hostname when the extension is present,
    /// and once with `None` after ClientHello parsing when no vhost was
    /// bound. Returning `None` refuses the connection.
    fn resolve(&self, server_name: Option<&[u8]>) -> Option<Arc<VhostConfig>>;
}

/// Serves one configuration to every name; useful for single-host servers
/// and tests.
pub struct SingleVhostResolver {
    vhost: Arc<VhostConfig>,
}

impl SingleVhostResolver {
    pub fn new(certs: Vec<Arc<CertifiedKey>>) -> Self {
        Self {
            vhost: Arc::new(VhostConfig::new(certs)),
        }
    }
}

impl ResolvesServerConfig for SingleVhostResolver {
    fn resolve(&self, _server_name: Option<&[u8]>) -> Option<Arc<VhostConfig>> {
        Some(self.vhost.clone())
    }
}

//! Asymmetric-key collaborator traits.
//!
//! Private-key operations (sign, static-RSA decrypt) and peer-certificate
//! verification are delegated to the embedding application; only the
//! algorithm dispatch lives here.

use std::sync::Arc;

use tls_core::key::Certificate;
use tls_core::msgs::enums::{HashAlgorithm, SignatureAlgorithm};
use tls_core::Error;
use tls_ecp::GroupId;

/// A server private key.
pub trait SigningKey: Send + Sync {
    /// Can this key produce (or, for static RSA, consume) material for
    /// the given signature algorithm?
    fn can_do(&self, alg: SignatureAlgorithm) -> bool;

    /// Key length in bytes; frames the encrypted premaster for RSA keys.
    fn key_len(&self) -> usize;

    /// Sign a digest computed with `hash`, returning the raw signature.
    fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<u8>, Error>;

    /// PKCS#1 v1.5 decryption of an encrypted premaster. Returns the
    /// plaintext length on success. The unit error carries no detail on
    /// purpose: the caller folds it into a branch-free select and any
    /// richer signal would become a padding oracle.
    fn decrypt(&self, _ciphertext: &[u8], _out: &mut [u8]) -> Result<usize, ()> {
        Err(())
    }

    /// The curve of an ECDSA key, consulted during certificate selection.
    fn curve(&self) -> Option<GroupId> {
        None
    }
}

/// A certificate chain with its private key.
pub struct CertifiedKey {
    pub cert_chain: Vec<Certificate>,
    pub key: Arc<dyn SigningKey>,
}

impl CertifiedKey {
    pub fn new(cert_chain: Vec<Certificate>, key: Arc<dyn SigningKey>) -> Self {
        Self { cert_chain, key }
    }

    /// The end-entity certificate.
    pub fn end_entity_cert(&self) -> Option<&Certificate> {
        self.cert_chain.first()
    }
}

/// The public key out of a verified peer certificate.
pub trait VerifyingKey: Send + Sync {
    fn can_do(&self, alg: SignatureAlgorithm) -> bool;

    /// Verify `signature` over a digest computed with `hash`.
    fn verify(&self, hash: HashAlgorithm, digest: &[u8], signature: &[u8]) -> Result<(), Error>;
}

/// A verified client certificate.
pub struct PeerCertificate {
    pub cert: Certificate,
    pub key: Arc<dyn VerifyingKey>,
}

/// Parses and verifies the client Certificate message; X.509 itself is
/// out of scope for this stack.
pub trait ClientCertVerifier: Send + Sync {
    fn verify_chain(&self, chain: &[Certificate]) -> Result<PeerCertificate, Error>;
}

//! TLS 1.2 ciphersuite tables.
//!
//! The record protection itself (AEAD keys, nonces) lives behind the
//! record-layer collaborator; these rows carry what suite selection and
//! key-block sizing need.

use std::fmt;

use crate::msgs::enums::{
    CipherSuite, HashAlgorithm, KeyExchangeAlgorithm, SignatureAlgorithm,
};

/// An AEAD algorithm label plus key-block sizing.
#[derive(Debug, PartialEq, Eq)]
pub struct AeadAlgorithm {
    pub name: &'static str,
    pub key_len: usize,
}

pub static AEAD_AES_128_GCM: AeadAlgorithm = AeadAlgorithm {
    name: "AES_128_GCM",
    key_len: 16,
};

pub static AEAD_AES_256_GCM: AeadAlgorithm = AeadAlgorithm {
    name: "AES_256_GCM",
    key_len: 32,
};

/// A TLS 1.2 cipher suite supported by this stack.
pub struct Tls12CipherSuite {
    pub suite: CipherSuite,
    /// How to exchange/agree keys.
    pub kx: KeyExchangeAlgorithm,
    /// The signature algorithm the server authenticates with, or None for
    /// static-RSA key exchange where the decryption is the authentication.
    pub sign: Option<SignatureAlgorithm>,
    pub aead_algorithm: &'static AeadAlgorithm,
    pub hash_algorithm: HashAlgorithm,

    /// How long the fixed part of the nonce is.
    pub fixed_iv_len: usize,
    /// Per-record explicit nonce bytes; GCM uses 8.
    pub explicit_nonce_len: usize,
}

impl Tls12CipherSuite {
    /// Which signature algorithm authenticates the server for this suite;
    /// static RSA still needs an RSA key, so report that.
    pub fn sig_alg(&self) -> Option<SignatureAlgorithm> {
        match self.kx {
            KeyExchangeAlgorithm::RSA => Some(SignatureAlgorithm::RSA),
            _ => self.sign,
        }
    }

    /// Does the ServerKeyExchange flight carry a signature?
    pub fn uses_server_signature(&self) -> bool {
        self.kx.uses_ephemeral_keys() && self.sign.is_some()
    }
}

impl PartialEq for Tls12CipherSuite {
    fn eq(&self, other: &Self) -> bool {
        self.suite == other.suite
    }
}

impl fmt::Debug for Tls12CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tls12CipherSuite")
            .field("suite", &self.suite)
            .field("algorithm", &self.aead_algorithm.name)
            .finish()
    }
}

/// The TLS1.2 ciphersuite TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256.
pub static TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256: Tls12CipherSuite = Tls12CipherSuite {
    suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    kx: KeyExchangeAlgorithm::ECDHE,
    sign: Some(SignatureAlgorithm::ECDSA),
    aead_algorithm: &AEAD_AES_128_GCM,
    hash_algorithm: HashAlgorithm::SHA256,
    fixed_iv_len: 4,
    explicit_nonce_len: 8,
};

/// The TLS1.2 ciphersuite TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384.
pub static TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384: Tls12CipherSuite = Tls12CipherSuite {
    suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    kx: KeyExchangeAlgorithm::ECDHE,
    sign: Some(SignatureAlgorithm::ECDSA),
    aead_algorithm: &AEAD_AES_256_GCM,
    hash_algorithm: HashAlgorithm::SHA384,
    fixed_iv_len: 4,
    explicit_nonce_len: 8,
};

/// The TLS1.2 ciphersuite TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256.
pub static TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: Tls12CipherSuite = Tls12CipherSuite {
    suite: CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    kx: KeyExchangeAlgorithm::ECDHE,
    sign: Some(SignatureAlgorithm::RSA),
    aead_algorithm: &AEAD_AES_128_GCM,
    hash_algorithm: HashAlgorithm::SHA256,
    fixed_iv_len: 4,
    explicit_nonce_len: 8,
};

/// The TLS1.2 ciphersuite TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384.
pub static TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384: Tls12CipherSuite = Tls12CipherSuite {
    suite: CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    kx: KeyExchangeAlgorithm::ECDHE,
    sign: Some(SignatureAlgorithm::RSA),
    aead_algorithm: &AEAD_AES_256_GCM,
    hash_algorithm: HashAlgorithm::SHA384,
    fixed_iv_len: 4,
    explicit_nonce_len: 8,
};

/// The TLS1.2 ciphersuite TLS_DHE_RSA_WITH_AES_128_GCM_SHA256.
pub static TLS_DHE_RSA_WITH_AES_128_GCM_SHA256: Tls12CipherSuite = Tls12CipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_128_GCM_SHA256,
    kx: KeyExchangeAlgorithm::DHE,
    sign: Some(SignatureAlgorithm::RSA),
    aead_algorithm: &AEAD_AES_128_GCM,
    hash_algorithm: HashAlgorithm::SHA256,
    fixed_iv_len: 4,
    explicit_nonce_len: 8,
};

/// The TLS1.2 ciphersuite TLS_DHE_RSA_WITH_AES_256_GCM_SHA384.
pub static TLS_DHE_RSA_WITH_AES_256_GCM_SHA384: Tls12CipherSuite = Tls12CipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_256_GCM_SHA384,
    kx: KeyExchangeAlgorithm::DHE,
    sign: Some(SignatureAlgorithm::RSA),
    aead_algorithm: &AEAD_AES_256_GCM,
    hash_algorithm: HashAlgorithm::SHA384,
    fixed_iv_len: 4,
    explicit_nonce_len: 8,
};

/// The TLS1.2 ciphersuite TLS_RSA_WITH_AES_128_GCM_SHA256.
pub static TLS_RSA_WITH_AES_128_GCM_SHA256: Tls12CipherSuite = Tls12CipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
    kx: KeyExchangeAlgorithm::RSA,
    sign: None,
    aead_algorithm: &AEAD_AES_128_GCM,
    hash_algorithm: HashAlgorithm::SHA256,
    fixed_iv_len: 4,
    explicit_nonce_len: 8,
};

/// The TLS1.2 ciphersuite TLS_RSA_WITH_AES_256_GCM_SHA384.
pub static TLS_RSA_WITH_AES_256_GCM_SHA384: Tls12CipherSuite = Tls12CipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
    kx: KeyExchangeAlgorithm::RSA,
    sign: None,
    aead_algorithm: &AEAD_AES_256_GCM,
    hash_algorithm: HashAlgorithm::SHA384,
    fixed_iv_len: 4,
    explicit_nonce_len: 8,
};

/// All suites this stack can negotiate, in default preference order.
pub static ALL_CIPHER_SUITES: &[&Tls12CipherSuite] = &[
    &TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    &TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    &TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    &TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    &TLS_DHE_RSA_WITH_AES_256_GCM_SHA384,
    &TLS_DHE_RSA_WITH_AES_128_GCM_SHA256,
    &TLS_RSA_WITH_AES_256_GCM_SHA384,
    &TLS_RSA_WITH_AES_128_GCM_SHA256,
];

pub fn lookup_suite(suite: CipherSuite) -> Option<&'static Tls12CipherSuite> {
    ALL_CIPHER_SUITES.iter().find(|cs| cs.suite == suite).copied()
}

pub fn join_randoms(first: &[u8; 32], second: &[u8; 32]) -> [u8; 64] {
    let mut randoms = [0u8; 64];
    randoms[..32].copy_from_slice(first);
    randoms[32..].copy_from_slice(second);
    randoms
}

/// Decode length-checked key-exchange parameters: the reader must consume
/// the input exactly.
pub fn decode_kx_params<T: crate::msgs::codec::Codec>(kx_params: &[u8]) -> Option<T> {
    let mut rd = crate::msgs::codec::Reader::init(kx_params);
    let params = T::read(&mut rd)?;
    match rd.any_left() {
        false => Some(params),
        true => None,
    }
}

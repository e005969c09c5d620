//! Running hash of the handshake transcript.
//!
//! Messages are buffered until the ciphersuite (and with it the hash
//! function) is known, then hashing switches to incremental. A full copy
//! of the transcript is additionally kept while client authentication is
//! possible, since CertificateVerify may need a different digest.

use digest::Digest as _;
use tls_core::msgs::enums::HashAlgorithm;

#[derive(Clone)]
pub(crate) enum Hasher {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl Hasher {
    pub(crate) fn new_from_alg(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::SHA1 => Self::Sha1(sha1::Sha1::default()),
            HashAlgorithm::SHA256 => Self::Sha256(sha2::Sha256::default()),
            HashAlgorithm::SHA384 => Self::Sha384(sha2::Sha384::default()),
            HashAlgorithm::SHA512 => Self::Sha512(sha2::Sha512::default()),
            alg => unreachable!("no hasher for {alg:?}"),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(hasher) => hasher.update(data),
            Self::Sha256(hasher) => hasher.update(data),
            Self::Sha384(hasher) => hasher.update(data),
            Self::Sha512(hasher) => hasher.update(data),
        }
    }

    pub(crate) fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(hasher) => hasher.finalize().to_vec(),
            Self::Sha256(hasher) => hasher.finalize().to_vec(),
            Self::Sha384(hasher) => hasher.finalize().to_vec(),
            Self::Sha512(hasher) => hasher.finalize().to_vec(),
        }
    }

    pub(crate) fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha1(_) => HashAlgorithm::SHA1,
            Self::Sha256(_) => HashAlgorithm::SHA256,
            Self::Sha384(_) => HashAlgorithm::SHA384,
            Self::Sha512(_) => HashAlgorithm::SHA512,
        }
    }
}

/// One-shot digest with the given algorithm.
pub(crate) fn hash(alg: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    let mut h = Hasher::new_from_alg(alg);
    h.update(data);
    h.finalize()
}

/// Early-stage buffering of handshake bytes, before the negotiated suite
/// fixes the transcript hash.
pub(crate) struct HandshakeHashBuffer {
    buffer: Vec<u8>,
    client_auth_enabled: bool,
}

impl HandshakeHashBuffer {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Vec::new(),
            client_auth_enabled: false,
        }
    }

    /// We might be doing client auth, so need to keep a full log of the
    /// handshake.
    pub(crate) fn set_client_auth_enabled(&mut self) {
        self.client_auth_enabled = true;
    }

    pub(crate) fn update_raw(&mut self, buf: &[u8]) {
        self.buffer.extend_from_slice(buf);
    }

    /// We now know what hash function the transcript uses.
    pub(crate) fn start_hash(self, alg: HashAlgorithm) -> HandshakeHash {
        let mut hasher = Hasher::new_from_alg(alg);
        hasher.update(&self.buffer);
        HandshakeHash {
            hasher,
            client_auth: match self.client_auth_enabled {
                true => Some(self.buffer),
                false => None,
            },
        }
    }
}

/// The running transcript hash, incremental once the suite is known.
pub(crate) struct HandshakeHash {
    hasher: Hasher,

    /// Full transcript copy for client-auth digests.
    client_auth: Option<Vec<u8>>,
}

impl HandshakeHash {
    pub(crate) fn update_raw(&mut self, buf: &[u8]) -> &mut Self {
        self.hasher.update(buf);
        if let Some(buffer) = &mut self.client_auth {
            buffer.extend_from_slice(buf);
        }
        self
    }

    /// We decided not to do client auth after all.
    pub(crate) fn abandon_client_auth(&mut self) {
        self.client_auth = None;
    }

    /// The current transcript hash with the negotiated algorithm.
    pub(crate) fn get_current_hash(&self) -> Vec<u8> {
        self.hasher.clone().finalize()
    }

    /// The current transcript hash with an alternative algorithm; only
    /// possible while the full transcript is retained.
    pub(crate) fn get_hash_with(&self, alg: HashAlgorithm) -> Option<Vec<u8>> {
        if alg == self.hasher.algorithm() {
            return Some(self.get_current_hash());
        }
        self.client_auth.as_ref().map(|buf| hash(alg, buf))
    }

    pub(crate) fn algorithm(&self) -> HashAlgorithm {
        self.hasher.algorithm()
    }
}

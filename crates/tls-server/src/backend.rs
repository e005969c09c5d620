//! Record-layer key schedule collaborator.
//!
//! The PRF, key-block expansion and record protection are owned by the
//! record layer; the handshake machine only sequences them. The seams are
//! narrow: master-secret computation, key installation, and Finished
//! verify-data.

use tls_core::suites::Tls12CipherSuite;
use tls_core::Error;

pub const LABEL_CLIENT_FINISHED: &[u8] = b"client finished";
pub const LABEL_SERVER_FINISHED: &[u8] = b"server finished";

pub trait KeySchedule: Send {
    /// Compute the 48-byte master secret from the premaster. `seed` is
    /// client_random || server_random, or the session hash when the
    /// extended master secret is in use (`ems` set).
    fn master_secret(
        &mut self,
        suite: &'static Tls12CipherSuite,
        premaster: &[u8],
        ems: bool,
        seed: &[u8],
    ) -> [u8; 48];

    /// Expand the key block and install record keys for both directions.
    /// `randoms` is client_random || server_random.
    fn derive_keys(
        &mut self,
        suite: &'static Tls12CipherSuite,
        master: &[u8; 48],
        randoms: &[u8; 64],
    ) -> Result<(), Error>;

    /// The 12-byte Finished verify_data for the given transcript hash.
    fn verify_data(
        &mut self,
        suite: &'static Tls12CipherSuite,
        master: &[u8; 48],
        label: &'static [u8],
        transcript_hash: &[u8],
    ) -> [u8; 12];
}

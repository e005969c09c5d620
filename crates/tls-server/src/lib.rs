//! Server-side TLS 1.2 handshake state machine.
//!
//! The core is [`ServerHandshake`]: an incremental, restartable machine
//! that accepts handshake bytes in arbitrary chunks, postpones when a
//! message is incomplete, and emits its flights as scatter-gather
//! fragments for the record layer to frame and send. Symmetric record
//! protection, X.509 parsing, ticket sealing and the PRF live behind the
//! collaborator traits in [`sign`], [`resolver`], [`ticket`] and
//! [`backend`].

// log for logging (optional).
#[cfg(feature = "logging")]
use log;

#[cfg(not(feature = "logging"))]
#[macro_use]
mod log {
    macro_rules! trace {
        ($($tt:tt)*) => {};
    }
    macro_rules! debug {
        ($($tt:tt)*) => {};
    }
    macro_rules! warn {
        ($($tt:tt)*) => {};
    }
}

pub(crate) mod bs_debug;

pub mod backend;
mod check;
mod cke;
pub mod config;
mod conn;
mod flight;
mod hash_hs;
mod hello;
pub mod kx;
mod rand;
pub mod resolver;
mod select;
pub mod sign;
pub mod ticket;

pub use conn::{MsgChunk, OutFrag, ServerHandshake, ServerState, Status};
pub use tls_core::Error;

/// Most ciphersuite bytes accepted from one ClientHello; the overflow is
/// skipped, not rejected, since clients put their preferred suites first.
pub const MAX_CIPHERSUITE_BYTES: usize = 256;

/// Most curves remembered from the `elliptic_curves` extension.
pub const MAX_CURVES: usize = 11;

/// Most ALPN names considered from one ClientHello.
pub const MAX_ALPN_PROTOCOLS: usize = 16;

/// Largest single ClientHello extension body we will buffer.
pub const MAX_EXT_SIZE: usize = 2048;

/// Largest ClientKeyExchange we will coalesce when it arrives fragmented.
pub const MAX_CKE_SIZE: usize = 2048;

/// TLS 1.2 Finished verify_data length.
pub const FINISHED_BODY_LEN: usize = 12;

/// Premaster secret length for the static-RSA key exchange.
pub const RSA_PREMASTER_LEN: usize = 48;

//! Session-ticket collaborator (RFC 5077).

use tls_core::msgs::enums::CipherSuite;
use zeroize::Zeroize;

/// What a ticket seals: enough to resume without the server keeping
/// state.
pub struct SessionState {
    pub suite: CipherSuite,
    pub master: [u8; 48],
    /// Unix seconds when the session was established.
    pub start: u64,
    pub extended_ms: bool,
}

impl Clone for SessionState {
    fn clone(&self) -> Self {
        Self {
            suite: self.suite,
            master: self.master,
            start: self.start,
            extended_ms: self.extended_ms,
        }
    }
}

impl Zeroize for SessionState {
    fn zeroize(&mut self) {
        self.master.zeroize();
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Seals sessions into opaque blobs and opens them again. Open failures
/// are not errors: the handshake falls back to a full exchange and issues
/// a fresh ticket.
pub trait TicketSealer: Send + Sync {
    /// Lifetime hint carried in NewSessionTicket, in seconds.
    fn lifetime_hint(&self) -> u32;

    fn seal(&self, sess: &SessionState) -> Option<Vec<u8>>;

    fn open(&self, blob: &[u8]) -> Option<SessionState>;
}

//! Core types for the TLS 1.2 stack: wire enums and codecs, handshake
//! message payloads, ciphersuite tables and the shared error type.

pub mod key;
pub mod msgs;
pub mod suites;

use std::fmt;

use msgs::enums::{AlertDescription, ContentType, HandshakeType};

/// The stack reports protocol errors using this type.
#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// We received a TLS message that isn't valid right now.
    /// `expect_types` lists the message types we can expect right now.
    /// `got_type` is the type we found. This error is typically caused by
    /// a buggy TLS stack (the peer or this one), a broken network, or an
    /// attack.
    InappropriateMessage {
        /// Which types we expected
        expect_types: Vec<ContentType>,
        /// What type we received
        got_type: ContentType,
    },

    /// We received a TLS handshake message that isn't valid right now.
    InappropriateHandshakeMessage {
        /// Which handshake type we expected
        expect_types: Vec<HandshakeType>,
        /// What handshake type we received
        got_type: HandshakeType,
    },

    /// A handshake message of the given type failed validation.
    BadHandshakeMessage(HandshakeType),

    /// The peer sent us a syntactically incorrect TLS message.
    CorruptMessage,

    /// The peer sent us a TLS message with invalid contents.
    CorruptMessagePayload(ContentType),

    /// The peer doesn't support a protocol version/feature we require.
    /// The parameter gives a hint as to what version/feature it is.
    PeerIncompatibleError(String),

    /// The peer deviated from the standard TLS protocol.
    /// The parameter gives a hint where.
    PeerMisbehavedError(String),

    /// We received a fatal alert. This means the peer is unhappy.
    AlertReceived(AlertDescription),

    /// An incoming connection did not support any known application
    /// protocol.
    NoApplicationProtocol,

    /// The verification of the peer's Finished MAC failed; with the
    /// static-RSA countermeasure this is also where bad premaster padding
    /// surfaces.
    DecryptError,

    /// We failed to figure out what time it currently is.
    FailedToGetCurrentTime,

    /// We failed to acquire random bytes from the system.
    FailedToGetRandomBytes,

    /// This function doesn't work until the TLS handshake is complete.
    HandshakeNotComplete,

    /// The peer sent an oversized record/fragment.
    PeerSentOversizedRecord,

    /// No server certificate or key is usable for the negotiated
    /// parameters.
    NoSuitableCertificate,

    /// A catch-all error for unlikely errors.
    General(String),
}

fn join<T: fmt::Debug>(items: &[T]) -> String {
    items
        .iter()
        .map(|x| format!("{:?}", x))
        .collect::<Vec<String>>()
        .join(" or ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InappropriateMessage {
                ref expect_types,
                ref got_type,
            } => write!(
                f,
                "received unexpected message: got {:?} when expecting {}",
                got_type,
                join::<ContentType>(expect_types)
            ),
            Error::InappropriateHandshakeMessage {
                ref expect_types,
                ref got_type,
            } => write!(
                f,
                "received unexpected handshake message: got {:?} when expecting {}",
                got_type,
                join::<HandshakeType>(expect_types)
            ),
            Error::BadHandshakeMessage(ref typ) => {
                write!(f, "invalid {:?} handshake message", typ)
            }
            Error::CorruptMessage => write!(f, "received corrupt message"),
            Error::CorruptMessagePayload(ref typ) => {
                write!(f, "received corrupt message of type {:?}", typ)
            }
            Error::PeerIncompatibleError(ref why) => write!(f, "peer is incompatible: {}", why),
            Error::PeerMisbehavedError(ref why) => write!(f, "peer misbehaved: {}", why),
            Error::AlertReceived(ref alert) => write!(f, "received fatal alert: {:?}", alert),
            Error::NoApplicationProtocol => write!(f, "peer doesn't support any known protocol"),
            Error::DecryptError => write!(f, "cannot decrypt peer's message"),
            Error::FailedToGetCurrentTime => write!(f, "failed to get current time"),
            Error::FailedToGetRandomBytes => write!(f, "failed to get random bytes"),
            Error::HandshakeNotComplete => write!(f, "handshake not complete"),
            Error::PeerSentOversizedRecord => write!(f, "peer sent excess record size"),
            Error::NoSuitableCertificate => {
                write!(f, "no certificate usable for the negotiated parameters")
            }
            Error::General(ref err) => write!(f, "unexpected error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::msgs::enums::{AlertDescription, ContentType, HandshakeType};

    #[test]
    fn smoke() {
        let all = vec![
            Error::InappropriateMessage {
                expect_types: vec![ContentType::Alert],
                got_type: ContentType::Handshake,
            },
            Error::InappropriateHandshakeMessage {
                expect_types: vec![HandshakeType::ClientHello, HandshakeType::Finished],
                got_type: HandshakeType::ServerHello,
            },
            Error::BadHandshakeMessage(HandshakeType::ClientHello),
            Error::CorruptMessage,
            Error::CorruptMessagePayload(ContentType::Alert),
            Error::PeerIncompatibleError("no tls1.2".to_string()),
            Error::PeerMisbehavedError("inconsistent something".to_string()),
            Error::AlertReceived(AlertDescription::HandshakeFailure),
            Error::NoApplicationProtocol,
            Error::DecryptError,
            Error::FailedToGetCurrentTime,
            Error::FailedToGetRandomBytes,
            Error::HandshakeNotComplete,
            Error::PeerSentOversizedRecord,
            Error::NoSuitableCertificate,
            Error::General("undocumented error".to_string()),
        ];

        for err in all {
            println!("{:?}:", err);
            println!("  fmt '{}'", err);
        }
    }
}

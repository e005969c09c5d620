//! Small message-sequencing checks.

use tls_core::msgs::enums::HandshakeType;
use tls_core::Error;

pub(crate) fn inappropriate_handshake_message(
    got_type: HandshakeType,
    expect_types: &[HandshakeType],
) -> Error {
    Error::InappropriateHandshakeMessage {
        expect_types: expect_types.to_vec(),
        got_type,
    }
}

/// Require the inbound message to have the expected type.
pub(crate) fn require_msg_type(
    got: HandshakeType,
    expect: HandshakeType,
) -> Result<(), Error> {
    if got == expect {
        Ok(())
    } else {
        Err(inappropriate_handshake_message(got, &[expect]))
    }
}

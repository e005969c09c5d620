//! Key material holders.

use crate::msgs::codec::{u24, Codec, Reader};

/// A DER-encoded X.509 certificate. Parsing and verification belong to an
/// external collaborator; this is an opaque blob with its wire framing.
#[derive(Clone, Eq, PartialEq)]
pub struct Certificate(pub Vec<u8>);

impl Certificate {
    pub fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Codec for Certificate {
    fn encode(&self, bytes: &mut Vec<u8>) {
        u24(self.0.len() as u32).encode(bytes);
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let len = u24::read(r)?.into();
        let body = r.take(len)?;
        Some(Self(body.to_vec()))
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Certificate({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Certificate {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let c = Certificate(vec![0x30, 0x82, 0x01, 0x02]);
        let enc = c.get_encoding();
        assert_eq!(enc[..3], [0, 0, 4]);
        assert_eq!(Certificate::read_bytes(&enc), Some(c));
    }
}

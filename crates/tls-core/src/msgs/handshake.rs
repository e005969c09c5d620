//! Handshake message payloads.
//!
//! The server emits ServerHello, Certificate, ServerKeyExchange,
//! CertificateRequest, ServerHelloDone and NewSessionTicket through the
//! encode side; the decode side covers the extension bodies a ClientHello
//! carries (dispatched one at a time by the incremental parser) and enough
//! of the client messages to build test fixtures.

use crate::key::Certificate;
use crate::msgs::base::{Payload, PayloadU16, PayloadU8};
use crate::msgs::codec::{self, Codec, Reader, u24};
use crate::msgs::enums::{
    CipherSuite, ClientCertificateType, Compression, ECPointFormat, ExtensionType,
    HandshakeType, HashAlgorithm, NamedGroup, ProtocolVersion, SignatureAlgorithm,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Random(pub [u8; 32]);

impl Codec for Random {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let bytes = r.take(32)?;
        let mut opaque = [0; 32];
        opaque.copy_from_slice(bytes);
        Some(Self(opaque))
    }
}

impl From<[u8; 32]> for Random {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct SessionID {
    len: usize,
    data: [u8; 32],
}

impl SessionID {
    pub fn new(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= 32);
        let mut data = [0; 32];
        data[..bytes.len()].copy_from_slice(bytes);
        Self {
            len: bytes.len(),
            data,
        }
    }

    pub fn empty() -> Self {
        Self {
            len: 0,
            data: [0; 32],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl Codec for SessionID {
    fn encode(&self, bytes: &mut Vec<u8>) {
        debug_assert!(self.len <= 32);
        bytes.push(self.len as u8);
        bytes.extend_from_slice(self.as_ref());
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let len = u8::read(r)? as usize;
        if len > 32 {
            return None;
        }
        let bytes = r.take(len)?;
        Some(Self::new(bytes))
    }
}

impl std::fmt::Debug for SessionID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.as_ref() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A TLS 1.2 (hash, signature) algorithm pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureAndHashAlgorithm {
    pub hash: HashAlgorithm,
    pub sign: SignatureAlgorithm,
}

impl Codec for SignatureAndHashAlgorithm {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.hash.encode(bytes);
        self.sign.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let hash = HashAlgorithm::read(r)?;
        let sign = SignatureAlgorithm::read(r)?;
        Some(Self { hash, sign })
    }
}

/// The `supported_signature_algorithms` extension body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupportedSignatureAlgorithms(pub Vec<SignatureAndHashAlgorithm>);

impl Codec for SupportedSignatureAlgorithms {
    fn encode(&self, bytes: &mut Vec<u8>) {
        codec::encode_vec_u16(bytes, &self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        codec::read_vec_u16(r).map(Self)
    }
}

/// The `elliptic_curves` / `supported_groups` extension body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedGroups(pub Vec<NamedGroup>);

impl Codec for NamedGroups {
    fn encode(&self, bytes: &mut Vec<u8>) {
        codec::encode_vec_u16(bytes, &self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        codec::read_vec_u16(r).map(Self)
    }
}

/// The `ec_point_formats` extension body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ECPointFormatList(pub Vec<ECPointFormat>);

impl ECPointFormatList {
    pub fn supported() -> Self {
        Self(vec![ECPointFormat::Uncompressed])
    }
}

impl Codec for ECPointFormatList {
    fn encode(&self, bytes: &mut Vec<u8>) {
        codec::encode_vec_u8(bytes, &self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        codec::read_vec_u8(r).map(Self)
    }
}

/// One entry of the `server_name` extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerName {
    pub typ: u8,
    pub payload: PayloadU16,
}

pub const SNI_HOSTNAME: u8 = 0;

impl Codec for ServerName {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);
        self.payload.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = u8::read(r)?;
        let payload = PayloadU16::read(r)?;
        Some(Self { typ, payload })
    }
}

/// The `server_name` extension body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerNameRequest(pub Vec<ServerName>);

impl ServerNameRequest {
    /// The first DNS hostname entry, if any.
    pub fn hostname(&self) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|n| n.typ == SNI_HOSTNAME)
            .map(|n| n.payload.0.as_slice())
    }
}

impl Codec for ServerNameRequest {
    fn encode(&self, bytes: &mut Vec<u8>) {
        let inner_offset = bytes.len();
        bytes.extend_from_slice(&[0, 0]);
        for name in &self.0 {
            name.encode(bytes);
        }
        let len = bytes.len() - inner_offset - 2;
        codec::put_u16(len as u16, &mut bytes[inner_offset..]);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;
        let mut ret = Vec::new();
        while sub.any_left() {
            ret.push(ServerName::read(&mut sub)?);
        }
        if r.any_left() {
            return None;
        }
        Some(Self(ret))
    }
}

/// The ALPN `protocol_name_list`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolNameList(pub Vec<PayloadU8>);

impl ProtocolNameList {
    pub fn from_slices(names: &[&[u8]]) -> Self {
        Self(names.iter().map(|s| PayloadU8::new(s.to_vec())).collect())
    }

    pub fn to_vecs(&self) -> Vec<Vec<u8>> {
        self.0.iter().map(|p| p.0.clone()).collect()
    }
}

impl Codec for ProtocolNameList {
    fn encode(&self, bytes: &mut Vec<u8>) {
        codec::encode_vec_u16(bytes, &self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let list = codec::read_vec_u16::<PayloadU8>(r)?;
        // Empty protocol names MUST NOT be included.
        if list.iter().any(|p| p.0.is_empty()) {
            return None;
        }
        Some(Self(list))
    }
}

/// Extensions the server may attach to its ServerHello.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerExtension {
    RenegotiationInfo(PayloadU8),
    ExtendedMasterSecretAck,
    SessionTicketAck,
    ECPointFormats(ECPointFormatList),
    Protocols(ProtocolNameList),
}

impl ServerExtension {
    pub fn get_type(&self) -> ExtensionType {
        match self {
            Self::RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            Self::ExtendedMasterSecretAck => ExtensionType::ExtendedMasterSecret,
            Self::SessionTicketAck => ExtensionType::SessionTicket,
            Self::ECPointFormats(_) => ExtensionType::ECPointFormats,
            Self::Protocols(_) => ExtensionType::ALProtocolNegotiation,
        }
    }

    /// The empty renegotiation-info response.
    pub fn make_empty_renegotiation_info() -> Self {
        Self::RenegotiationInfo(PayloadU8::empty())
    }

    pub fn make_alpn(proto: &[u8]) -> Self {
        Self::Protocols(ProtocolNameList::from_slices(&[proto]))
    }
}

impl Codec for ServerExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.get_type().encode(bytes);

        let mut sub: Vec<u8> = Vec::new();
        match self {
            Self::RenegotiationInfo(r) => r.encode(&mut sub),
            Self::ExtendedMasterSecretAck | Self::SessionTicketAck => {}
            Self::ECPointFormats(r) => r.encode(&mut sub),
            Self::Protocols(r) => r.encode(&mut sub),
        }

        (sub.len() as u16).encode(bytes);
        bytes.append(&mut sub);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::RenegotiationInfo => Self::RenegotiationInfo(PayloadU8::read(&mut sub)?),
            ExtensionType::ExtendedMasterSecret => Self::ExtendedMasterSecretAck,
            ExtensionType::SessionTicket => Self::SessionTicketAck,
            ExtensionType::ECPointFormats => Self::ECPointFormats(ECPointFormatList::read(&mut sub)?),
            ExtensionType::ALProtocolNegotiation => Self::Protocols(ProtocolNameList::read(&mut sub)?),
            _ => return None,
        };
        if sub.any_left() {
            return None;
        }
        Some(ext)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerHelloPayload {
    pub legacy_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionID,
    pub cipher_suite: CipherSuite,
    pub compression_method: Compression,
    pub extensions: Vec<ServerExtension>,
}

impl Codec for ServerHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.legacy_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        self.compression_method.encode(bytes);

        if !self.extensions.is_empty() {
            codec::encode_vec_u16(bytes, &self.extensions);
        }
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let legacy_version = ProtocolVersion::read(r)?;
        let random = Random::read(r)?;
        let session_id = SessionID::read(r)?;
        let cipher_suite = CipherSuite::read(r)?;
        let compression_method = Compression::read(r)?;
        let extensions = if r.any_left() {
            codec::read_vec_u16(r)?
        } else {
            Vec::new()
        };
        Some(Self {
            legacy_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }
}

pub type CertificatePayload = Vec<Certificate>;

impl Codec for CertificatePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        let len: usize = self.iter().map(|c| c.0.len() + 3).sum();
        u24(len as u32).encode(bytes);
        for cert in self {
            cert.encode(bytes);
        }
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let len = u24::read(r)?.into();
        let mut sub = r.sub(len)?;
        let mut certs = Vec::new();
        while sub.any_left() {
            certs.push(Certificate::read(&mut sub)?);
        }
        Some(certs)
    }
}

/// The algorithm-tagged signature trailing a ServerKeyExchange or carried
/// by a CertificateVerify.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigitallySigned {
    pub alg: SignatureAndHashAlgorithm,
    pub signature: PayloadU16,
}

impl Codec for DigitallySigned {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.alg.encode(bytes);
        self.signature.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let alg = SignatureAndHashAlgorithm::read(r)?;
        let signature = PayloadU16::read(r)?;
        Some(Self { alg, signature })
    }
}

/// ECDHE `ServerECDHParams`: named-curve parameters plus the ephemeral
/// public point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerECDHParams {
    pub named_group: NamedGroup,
    pub public: PayloadU8,
}

/// The only ECCurveType allowed by RFC 8422 5.4.
const NAMED_CURVE_TYPE: u8 = 3;

impl ServerECDHParams {
    pub fn new(named_group: NamedGroup, pubkey: &[u8]) -> Self {
        Self {
            named_group,
            public: PayloadU8::new(pubkey.to_vec()),
        }
    }
}

impl Codec for ServerECDHParams {
    fn encode(&self, bytes: &mut Vec<u8>) {
        NAMED_CURVE_TYPE.encode(bytes);
        self.named_group.encode(bytes);
        self.public.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let ct = u8::read(r)?;
        if ct != NAMED_CURVE_TYPE {
            return None;
        }
        let named_group = NamedGroup::read(r)?;
        let public = PayloadU8::read(r)?;
        Some(Self { named_group, public })
    }
}

/// DHE `ServerDHParams`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerDHParams {
    pub dh_p: PayloadU16,
    pub dh_g: PayloadU16,
    pub dh_ys: PayloadU16,
}

impl Codec for ServerDHParams {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.dh_p.encode(bytes);
        self.dh_g.encode(bytes);
        self.dh_ys.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let dh_p = PayloadU16::read(r)?;
        let dh_g = PayloadU16::read(r)?;
        let dh_ys = PayloadU16::read(r)?;
        Some(Self { dh_p, dh_g, dh_ys })
    }
}

/// The client's ECDHE leg: a bare ECPoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientECDHParams {
    pub public: PayloadU8,
}

impl Codec for ClientECDHParams {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.public.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let public = PayloadU8::read(r)?;
        Some(Self { public })
    }
}

/// The client's DHE leg: `Yc` with a two-byte length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientDHParams {
    pub public: PayloadU16,
}

impl Codec for ClientDHParams {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.public.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let public = PayloadU16::read(r)?;
        Some(Self { public })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSessionTicketPayload {
    pub lifetime_hint: u32,
    pub ticket: PayloadU16,
}

impl NewSessionTicketPayload {
    pub fn new(lifetime_hint: u32, ticket: Vec<u8>) -> Self {
        Self {
            lifetime_hint,
            ticket: PayloadU16::new(ticket),
        }
    }
}

impl Codec for NewSessionTicketPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.lifetime_hint.encode(bytes);
        self.ticket.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let lifetime_hint = u32::read(r)?;
        let ticket = PayloadU16::read(r)?;
        Some(Self {
            lifetime_hint,
            ticket,
        })
    }
}

/// CertificateRequest, without the CA-name list (never serialised here).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateRequestPayload {
    pub certtypes: Vec<ClientCertificateType>,
    pub sigalgs: Vec<SignatureAndHashAlgorithm>,
    pub canames: PayloadU16,
}

impl Codec for CertificateRequestPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        codec::encode_vec_u8(bytes, &self.certtypes);
        codec::encode_vec_u16(bytes, &self.sigalgs);
        self.canames.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let certtypes = codec::read_vec_u8(r)?;
        let sigalgs = codec::read_vec_u16(r)?;
        let canames = PayloadU16::read(r)?;
        Some(Self {
            certtypes,
            sigalgs,
            canames,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakePayload {
    HelloRequest,
    ServerHello(ServerHelloPayload),
    Certificate(CertificatePayload),
    ServerKeyExchange(Payload),
    CertificateRequest(CertificateRequestPayload),
    ServerHelloDone,
    NewSessionTicket(NewSessionTicketPayload),
    Finished(Payload),
    Unknown(Payload),
}

impl HandshakePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        match self {
            HandshakePayload::HelloRequest | HandshakePayload::ServerHelloDone => {}
            HandshakePayload::ServerHello(x) => x.encode(bytes),
            HandshakePayload::Certificate(x) => x.encode(bytes),
            HandshakePayload::ServerKeyExchange(x) => x.encode(bytes),
            HandshakePayload::CertificateRequest(x) => x.encode(bytes),
            HandshakePayload::NewSessionTicket(x) => x.encode(bytes),
            HandshakePayload::Finished(x) => x.encode(bytes),
            HandshakePayload::Unknown(x) => x.encode(bytes),
        }
    }
}

/// A handshake message: type, u24 length, body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessagePayload {
    pub typ: HandshakeType,
    pub payload: HandshakePayload,
}

impl Codec for HandshakeMessagePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);

        let len_offset = bytes.len();
        u24(0).encode(bytes);
        self.payload.encode(bytes);

        let len = bytes.len() - len_offset - 3;
        let out = u24(len as u32).get_encoding();
        bytes[len_offset..len_offset + 3].copy_from_slice(&out);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = HandshakeType::read(r)?;
        let len = u24::read(r)?.into();
        let mut sub = r.sub(len)?;

        let payload = match typ {
            HandshakeType::HelloRequest if sub.left() == 0 => HandshakePayload::HelloRequest,
            HandshakeType::ServerHello => {
                HandshakePayload::ServerHello(ServerHelloPayload::read(&mut sub)?)
            }
            HandshakeType::Certificate => {
                HandshakePayload::Certificate(CertificatePayload::read(&mut sub)?)
            }
            HandshakeType::ServerKeyExchange => {
                HandshakePayload::ServerKeyExchange(Payload::read_all(&mut sub))
            }
            HandshakeType::CertificateRequest => {
                HandshakePayload::CertificateRequest(CertificateRequestPayload::read(&mut sub)?)
            }
            HandshakeType::ServerHelloDone if sub.left() == 0 => HandshakePayload::ServerHelloDone,
            HandshakeType::NewSessionTicket => {
                HandshakePayload::NewSessionTicket(NewSessionTicketPayload::read(&mut sub)?)
            }
            HandshakeType::Finished => HandshakePayload::Finished(Payload::read_all(&mut sub)),
            _ => HandshakePayload::Unknown(Payload::read_all(&mut sub)),
        };
        if sub.any_left() {
            return None;
        }
        Some(Self { typ, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_limits() {
        let sid = SessionID::new(&[7u8; 32]);
        assert_eq!(sid.len(), 32);
        let enc = sid.get_encoding();
        assert_eq!(enc.len(), 33);
        assert_eq!(SessionID::read_bytes(&enc), Some(sid));

        // 33-byte id is rejected.
        let mut bad = vec![33u8];
        bad.extend_from_slice(&[0u8; 33]);
        assert!(SessionID::read_bytes(&bad).is_none());
    }

    #[test]
    fn server_hello_roundtrip() {
        let sh = ServerHelloPayload {
            legacy_version: ProtocolVersion::TLSv1_2,
            random: Random([0x42; 32]),
            session_id: SessionID::new(&[1, 2, 3]),
            cipher_suite: CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            compression_method: Compression::Null,
            extensions: vec![
                ServerExtension::make_empty_renegotiation_info(),
                ServerExtension::ExtendedMasterSecretAck,
                ServerExtension::ECPointFormats(ECPointFormatList::supported()),
                ServerExtension::make_alpn(b"h2"),
            ],
        };
        let enc = sh.get_encoding();
        assert_eq!(ServerHelloPayload::read_bytes(&enc), Some(sh));
    }

    #[test]
    fn handshake_header_framing() {
        let hmp = HandshakeMessagePayload {
            typ: HandshakeType::ServerHelloDone,
            payload: HandshakePayload::ServerHelloDone,
        };
        assert_eq!(hmp.get_encoding(), vec![0x0e, 0, 0, 0]);

        let back = HandshakeMessagePayload::read_bytes(&[0x0e, 0, 0, 0]).unwrap();
        assert_eq!(back, hmp);
    }

    #[test]
    fn ecdh_params_reject_trailing_bytes() {
        let params = ServerECDHParams::new(NamedGroup::secp256r1, &[4, 1, 2]);
        let mut enc = params.get_encoding();
        assert_eq!(ServerECDHParams::read_bytes(&enc), Some(params));
        enc.push(34);
        // The reader itself stops early; decode_kx_params wraps this with
        // an any_left check.
        let mut r = Reader::init(&enc);
        assert!(ServerECDHParams::read(&mut r).is_some());
        assert!(r.any_left());
    }

    #[test]
    fn sni_hostname_extraction() {
        let req = ServerNameRequest(vec![ServerName {
            typ: SNI_HOSTNAME,
            payload: PayloadU16::new(b"example.com".to_vec()),
        }]);
        let enc = req.get_encoding();
        let back = ServerNameRequest::read_bytes(&enc).unwrap();
        assert_eq!(back.hostname(), Some(&b"example.com"[..]));
    }

    #[test]
    fn alpn_rejects_empty_names() {
        let mut bytes = Vec::new();
        // list length 1, name length 0
        codec::encode_vec_u16::<PayloadU8>(&mut bytes, &[PayloadU8::empty()]);
        assert!(ProtocolNameList::read_bytes(&bytes).is_none());
    }
}

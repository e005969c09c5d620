//! End-to-end handshake scenarios, with the record layer and PRF replaced
//! by deterministic fakes.

use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use tls_core::key::Certificate;
use tls_core::msgs::codec::{Codec, Reader};
use tls_core::msgs::enums::{
    AlertDescription, CipherSuite, ContentType, HandshakeType, HashAlgorithm,
    SignatureAlgorithm,
};
use tls_core::msgs::handshake::{
    HandshakeMessagePayload, HandshakePayload, ServerDHParams, ServerECDHParams,
};
use tls_core::suites::Tls12CipherSuite;
use tls_core::Error;
use tls_ecp::{Group, GroupId};
use tls_mpi::{ExpModScratch, Mpi};

use tls_server::backend::KeySchedule;
use tls_server::config::ServerConfig;
use tls_server::resolver::{ResolvesServerConfig, VhostConfig};
use tls_server::sign::{CertifiedKey, SigningKey};
use tls_server::ticket::{SessionState, TicketSealer};
use tls_server::{MsgChunk, OutFrag, ServerHandshake, ServerState, Status};

// ---------------------------------------------------------------- fakes

struct EcdsaTestKey;

impl SigningKey for EcdsaTestKey {
    fn can_do(&self, alg: SignatureAlgorithm) -> bool {
        alg == SignatureAlgorithm::ECDSA
    }

    fn key_len(&self) -> usize {
        32
    }

    fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<u8>, Error> {
        let mut sig = vec![0x30, hash.get_u8()];
        sig.extend_from_slice(digest);
        Ok(sig)
    }

    fn curve(&self) -> Option<GroupId> {
        Some(GroupId::Secp256r1)
    }
}

struct RsaTestKey;

/// "Encryption" for tests: 0x42 tag, zero padding, premaster in the last
/// 48 bytes. Anything without the tag decrypts badly.
const RSA_KEY_LEN: usize = 128;

impl RsaTestKey {
    fn encrypt(premaster: &[u8; 48]) -> Vec<u8> {
        let mut ct = vec![0u8; RSA_KEY_LEN];
        ct[0] = 0x42;
        ct[RSA_KEY_LEN - 48..].copy_from_slice(premaster);
        ct
    }
}

impl SigningKey for RsaTestKey {
    fn can_do(&self, alg: SignatureAlgorithm) -> bool {
        alg == SignatureAlgorithm::RSA
    }

    fn key_len(&self) -> usize {
        RSA_KEY_LEN
    }

    fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<u8>, Error> {
        let mut sig = vec![0x01, hash.get_u8()];
        sig.extend_from_slice(digest);
        Ok(sig)
    }

    fn decrypt(&self, ciphertext: &[u8], out: &mut [u8]) -> Result<usize, ()> {
        if ciphertext.len() != RSA_KEY_LEN || ciphertext[0] != 0x42 {
            return Err(());
        }
        out[..48].copy_from_slice(&ciphertext[RSA_KEY_LEN - 48..]);
        Ok(48)
    }
}

/// Deterministic stand-in for the PRF.
struct FakeSchedule;

fn fake_master(premaster: &[u8], ems: bool, seed: &[u8]) -> [u8; 48] {
    let mut h1 = Sha256::new();
    h1.update(b"fake-master-1");
    h1.update([ems as u8]);
    h1.update(premaster);
    h1.update(seed);
    let mut h2 = Sha256::new();
    h2.update(b"fake-master-2");
    h2.update(premaster);
    h2.update(seed);

    let mut master = [0u8; 48];
    master[..32].copy_from_slice(&h1.finalize());
    master[32..].copy_from_slice(&h2.finalize()[..16]);
    master
}

fn fake_verify_data(master: &[u8; 48], label: &[u8], transcript_hash: &[u8]) -> [u8; 12] {
    let mut h = Sha256::new();
    h.update(b"fake-verify");
    h.update(master);
    h.update(label);
    h.update(transcript_hash);
    let digest = h.finalize();
    let mut vd = [0u8; 12];
    vd.copy_from_slice(&digest[..12]);
    vd
}

impl KeySchedule for FakeSchedule {
    fn master_secret(
        &mut self,
        _suite: &'static Tls12CipherSuite,
        premaster: &[u8],
        ems: bool,
        seed: &[u8],
    ) -> [u8; 48] {
        fake_master(premaster, ems, seed)
    }

    fn derive_keys(
        &mut self,
        _suite: &'static Tls12CipherSuite,
        _master: &[u8; 48],
        _randoms: &[u8; 64],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn verify_data(
        &mut self,
        _suite: &'static Tls12CipherSuite,
        master: &[u8; 48],
        label: &'static [u8],
        transcript_hash: &[u8],
    ) -> [u8; 12] {
        fake_verify_data(master, label, transcript_hash)
    }
}

/// Sealer that "encrypts" by serialising in the clear.
struct ClearSealer;

impl TicketSealer for ClearSealer {
    fn lifetime_hint(&self) -> u32 {
        7200
    }

    fn seal(&self, sess: &SessionState) -> Option<Vec<u8>> {
        let mut blob = Vec::new();
        blob.extend_from_slice(&sess.suite.get_u16().to_be_bytes());
        blob.extend_from_slice(&sess.master);
        blob.extend_from_slice(&sess.start.to_be_bytes());
        blob.push(sess.extended_ms as u8);
        Some(blob)
    }

    fn open(&self, blob: &[u8]) -> Option<SessionState> {
        if blob.len() != 2 + 48 + 8 + 1 {
            return None;
        }
        let mut master = [0u8; 48];
        master.copy_from_slice(&blob[2..50]);
        Some(SessionState {
            suite: CipherSuite::from(u16::from_be_bytes([blob[0], blob[1]])),
            master,
            start: u64::from_be_bytes(blob[50..58].try_into().unwrap()),
            extended_ms: blob[58] != 0,
        })
    }
}

struct NamedResolver {
    vhost: Arc<VhostConfig>,
    expect: &'static [u8],
    default_ok: bool,
    seen: Mutex<Vec<Vec<u8>>>,
}

impl ResolvesServerConfig for NamedResolver {
    fn resolve(&self, server_name: Option<&[u8]>) -> Option<Arc<VhostConfig>> {
        if let Some(name) = server_name {
            self.seen.lock().unwrap().push(name.to_vec());
            if name == self.expect {
                return Some(self.vhost.clone());
            }
            return None;
        }
        self.default_ok.then(|| self.vhost.clone())
    }
}

fn ecdsa_vhost() -> Arc<VhostConfig> {
    Arc::new(VhostConfig::new(vec![Arc::new(CertifiedKey::new(
        vec![Certificate(b"fake ecdsa der".to_vec())],
        Arc::new(EcdsaTestKey),
    ))]))
}

fn rsa_vhost() -> Arc<VhostConfig> {
    Arc::new(VhostConfig::new(vec![Arc::new(CertifiedKey::new(
        vec![Certificate(b"fake rsa der".to_vec())],
        Arc::new(RsaTestKey),
    ))]))
}

fn config_with(vhost: Arc<VhostConfig>) -> ServerConfig {
    ServerConfig::new(Arc::new(NamedResolver {
        vhost,
        expect: b"example.com",
        default_ok: true,
        seen: Mutex::new(Vec::new()),
    }))
}

// ------------------------------------------------------- hello building

struct HelloBuilder {
    version: (u8, u8),
    random: [u8; 32],
    session_id: Vec<u8>,
    suites: Vec<u16>,
    compressions: Vec<u8>,
    extensions: Vec<(u16, Vec<u8>)>,
}

impl HelloBuilder {
    fn new(suites: &[u16]) -> Self {
        Self {
            version: (3, 3),
            random: [0x11; 32],
            session_id: Vec::new(),
            suites: suites.to_vec(),
            compressions: vec![0x00],
            extensions: Vec::new(),
        }
    }

    fn curves(mut self, ids: &[u16]) -> Self {
        let mut body = ((ids.len() * 2) as u16).to_be_bytes().to_vec();
        for id in ids {
            body.extend_from_slice(&id.to_be_bytes());
        }
        self.extensions.push((0x000a, body));
        self
    }

    fn point_formats(mut self) -> Self {
        self.extensions.push((0x000b, vec![1, 0]));
        self
    }

    fn sig_algs(mut self, pairs: &[(u8, u8)]) -> Self {
        let mut body = ((pairs.len() * 2) as u16).to_be_bytes().to_vec();
        for (hash, sig) in pairs {
            body.push(*hash);
            body.push(*sig);
        }
        self.extensions.push((0x000d, body));
        self
    }

    fn sni(mut self, name: &[u8]) -> Self {
        let mut entry = vec![0u8]; // host_name
        entry.extend_from_slice(&(name.len() as u16).to_be_bytes());
        entry.extend_from_slice(name);
        let mut body = ((entry.len()) as u16).to_be_bytes().to_vec();
        body.extend_from_slice(&entry);
        self.extensions.push((0x0000, body));
        self
    }

    fn alpn(mut self, protos: &[&[u8]]) -> Self {
        let mut list = Vec::new();
        for p in protos {
            list.push(p.len() as u8);
            list.extend_from_slice(p);
        }
        let mut body = (list.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(&list);
        self.extensions.push((0x0010, body));
        self
    }

    fn ticket(mut self, blob: &[u8]) -> Self {
        self.extensions.push((0x0023, blob.to_vec()));
        self
    }

    fn session_id(mut self, id: &[u8]) -> Self {
        self.session_id = id.to_vec();
        self
    }

    fn build(&self) -> Vec<u8> {
        let mut body = vec![self.version.0, self.version.1];
        body.extend_from_slice(&self.random);
        body.push(self.session_id.len() as u8);
        body.extend_from_slice(&self.session_id);
        body.extend_from_slice(&((self.suites.len() * 2) as u16).to_be_bytes());
        for s in &self.suites {
            body.extend_from_slice(&s.to_be_bytes());
        }
        body.push(self.compressions.len() as u8);
        body.extend_from_slice(&self.compressions);

        let mut exts = Vec::new();
        for (typ, ext_body) in &self.extensions {
            exts.extend_from_slice(&typ.to_be_bytes());
            exts.extend_from_slice(&(ext_body.len() as u16).to_be_bytes());
            exts.extend_from_slice(ext_body);
        }
        if !exts.is_empty() {
            body.extend_from_slice(&(exts.len() as u16).to_be_bytes());
            body.extend_from_slice(&exts);
        }
        body
    }
}

// ----------------------------------------------------------- test glue

const ECDHE_ECDSA: u16 = 0xc02b;
const DHE_RSA: u16 = 0x009e;
const RSA_KX: u16 = 0x009c;

fn feed(
    hs: &mut ServerHandshake,
    typ: HandshakeType,
    body: &[u8],
) -> (Result<Status, Error>, Vec<OutFrag>) {
    let mut out = Vec::new();
    let res = hs.process_handshake(
        &MsgChunk {
            typ,
            msg_len: body.len(),
            already_read: 0,
            buf: body,
        },
        &mut out,
    );
    (res, out)
}

/// A byte-at-a-time feed of the same message.
fn feed_bytewise(
    hs: &mut ServerHandshake,
    typ: HandshakeType,
    body: &[u8],
) -> (Result<Status, Error>, Vec<OutFrag>) {
    let mut out = Vec::new();
    for (i, b) in body.iter().enumerate() {
        let res = hs.process_handshake(
            &MsgChunk {
                typ,
                msg_len: body.len(),
                already_read: i,
                buf: std::slice::from_ref(b),
            },
            &mut out,
        );
        match res {
            Ok(Status::Postponed) => continue,
            other => return (other, out),
        }
    }
    (Ok(Status::Complete), out)
}

fn decode_frag(frag: &OutFrag) -> HandshakeMessagePayload {
    assert_eq!(frag.typ, ContentType::Handshake);
    HandshakeMessagePayload::read_bytes(&frag.payload).expect("well-formed emission")
}

fn frag_types(frags: &[OutFrag]) -> Vec<HandshakeType> {
    frags
        .iter()
        .filter(|f| f.typ == ContentType::Handshake)
        .map(|f| decode_frag(f).typ)
        .collect()
}

fn alert_in(frags: &[OutFrag]) -> Option<AlertDescription> {
    frags
        .iter()
        .find(|f| f.typ == ContentType::Alert)
        .map(|f| AlertDescription::from(f.payload[1]))
}

/// Client-side transcript tracker mirroring the server's.
struct Transcript(Vec<u8>);

impl Transcript {
    fn new() -> Self {
        Transcript(Vec::new())
    }

    fn add_msg(&mut self, typ: HandshakeType, body: &[u8]) {
        self.0.push(typ.get_u8());
        self.0.push((body.len() >> 16) as u8);
        self.0.push((body.len() >> 8) as u8);
        self.0.push(body.len() as u8);
        self.0.extend_from_slice(body);
    }

    fn add_frags(&mut self, frags: &[OutFrag]) {
        for f in frags {
            if f.typ == ContentType::Handshake {
                self.0.extend_from_slice(&f.payload);
            }
        }
    }

    fn hash(&self) -> Vec<u8> {
        Sha256::digest(&self.0).to_vec()
    }
}

fn server_random(frags: &[OutFrag]) -> [u8; 32] {
    for f in frags {
        if f.typ != ContentType::Handshake {
            continue;
        }
        let msg = decode_frag(f);
        if let HandshakePayload::ServerHello(sh) = msg.payload {
            return sh.random.0;
        }
    }
    panic!("no ServerHello in flight");
}

fn randoms(client: &[u8; 32], server: &[u8; 32]) -> [u8; 64] {
    let mut r = [0u8; 64];
    r[..32].copy_from_slice(client);
    r[32..].copy_from_slice(server);
    r
}

// -------------------------------------------------------------- tests

#[test]
fn ecdhe_ecdsa_p256_full_handshake() {
    let config = Arc::new(config_with(ecdsa_vhost()));
    let mut hs = ServerHandshake::new(config, Box::new(FakeSchedule));
    let mut transcript = Transcript::new();

    let hello = HelloBuilder::new(&[ECDHE_ECDSA])
        .curves(&[23])
        .point_formats()
        .sig_algs(&[(4, 3)]) // (sha256, ecdsa)
        .build();
    transcript.add_msg(HandshakeType::ClientHello, &hello);

    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert_eq!(res.unwrap(), Status::Complete);
    assert_eq!(
        frag_types(&out),
        vec![
            HandshakeType::ServerHello,
            HandshakeType::Certificate,
            HandshakeType::ServerKeyExchange,
            HandshakeType::ServerHelloDone,
        ]
    );
    assert_eq!(hs.state(), ServerState::ClientKeyExchange);
    let srv_random = server_random(&out);
    transcript.add_frags(&out);

    // Pull the server's ephemeral point out of the ServerKeyExchange and
    // run the client leg of the exchange.
    let ske = out
        .iter()
        .filter(|f| f.typ == ContentType::Handshake)
        .map(decode_frag)
        .find(|m| m.typ == HandshakeType::ServerKeyExchange)
        .unwrap();
    let HandshakePayload::ServerKeyExchange(params) = ske.payload else {
        panic!("wrong payload");
    };
    let mut r = Reader::init(&params.0);
    let ecdh_params = ServerECDHParams::read(&mut r).unwrap();
    assert_eq!(ecdh_params.named_group.get_u16(), 23);

    // The signature covers client_random || server_random || params and
    // is tagged (sha256, ecdsa).
    let signed = r.rest();
    assert_eq!(signed[0], 4);
    assert_eq!(signed[1], 3);

    let grp = Group::from_id(GroupId::Secp256r1);
    let server_point = grp.read_point(&ecdh_params.public.0).unwrap();
    let client_kp = grp
        .gen_keypair(&mut rand::rngs::mock::StepRng::new(0x1234, 0x5678))
        .unwrap();
    let shared = grp.mul(&client_kp.d, &server_point, None).unwrap();
    let mut premaster = vec![0u8; 32];
    shared.x().write_binary(&mut premaster).unwrap();

    // ClientKeyExchange: our point, one-byte length framed.
    let client_point = grp.tls_write_point(&client_kp.q).unwrap();
    transcript.add_msg(HandshakeType::ClientKeyExchange, &client_point);
    let (res, out) = feed(&mut hs, HandshakeType::ClientKeyExchange, &client_point);
    assert_eq!(res.unwrap(), Status::Complete);
    assert!(out.is_empty());
    assert_eq!(hs.state(), ServerState::ClientChangeCipherSpec);

    let master = fake_master(&premaster, false, &randoms(&[0x11; 32], &srv_random));

    // CCS then Finished.
    let mut out = Vec::new();
    hs.process_change_cipher_spec(&[0x01], &mut out).unwrap();
    assert!(out.is_empty());

    let vd = fake_verify_data(&master, b"client finished", &transcript.hash());
    transcript.add_msg(HandshakeType::Finished, &vd);
    let (res, out) = feed(&mut hs, HandshakeType::Finished, &vd);
    assert_eq!(res.unwrap(), Status::Complete);
    assert!(hs.is_over());
    assert!(!hs.resumed());

    // Server answers with its own CCS + Finished, and the verify data
    // matches the transcript both sides kept.
    assert_eq!(out[0].typ, ContentType::ChangeCipherSpec);
    let finished = decode_frag(&out[1]);
    assert_eq!(finished.typ, HandshakeType::Finished);
    let HandshakePayload::Finished(body) = finished.payload else {
        panic!("wrong payload");
    };
    assert_eq!(
        body.0,
        fake_verify_data(&master, b"server finished", &transcript.hash()).to_vec()
    );
}

#[test]
fn dhe_rsa_key_exchange() {
    let config = Arc::new(config_with(rsa_vhost()));
    let mut hs = ServerHandshake::new(config, Box::new(FakeSchedule));

    let hello = HelloBuilder::new(&[DHE_RSA])
        .sig_algs(&[(4, 1)]) // (sha256, rsa)
        .build();
    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert_eq!(res.unwrap(), Status::Complete);
    assert_eq!(
        frag_types(&out),
        vec![
            HandshakeType::ServerHello,
            HandshakeType::Certificate,
            HandshakeType::ServerKeyExchange,
            HandshakeType::ServerHelloDone,
        ]
    );

    // ServerKeyExchange carries P, G, Ys and an RSA signature.
    let ske = out
        .iter()
        .filter(|f| f.typ == ContentType::Handshake)
        .map(decode_frag)
        .find(|m| m.typ == HandshakeType::ServerKeyExchange)
        .unwrap();
    let HandshakePayload::ServerKeyExchange(params) = ske.payload else {
        panic!("wrong payload");
    };
    let mut r = Reader::init(&params.0);
    let dh = ServerDHParams::read(&mut r).unwrap();
    assert_eq!(dh.dh_p.0.len(), 256);
    assert_eq!(dh.dh_g.0, vec![2]);
    let signed = r.rest();
    assert_eq!(signed[0], 4); // sha256
    assert_eq!(signed[1], 1); // rsa

    // Client leg: K = Ys^y mod P must match the server's premaster.
    let p = Mpi::from_binary(&dh.dh_p.0).unwrap();
    let g = Mpi::from_binary(&dh.dh_g.0).unwrap();
    let ys = Mpi::from_binary(&dh.dh_ys.0).unwrap();
    let y = Mpi::from_int(0xfeed_f00d_cafe);
    let mut rr = Mpi::new();
    let mut scratch = ExpModScratch::new();
    let yc = g.exp_mod(&y, &p, &mut rr, &mut scratch).unwrap();

    let mut cke = ((yc.byte_len()) as u16).to_be_bytes().to_vec();
    cke.extend_from_slice(&yc.to_binary());
    let (res, _) = feed(&mut hs, HandshakeType::ClientKeyExchange, &cke);
    assert_eq!(res.unwrap(), Status::Complete);
    assert_eq!(hs.state(), ServerState::ClientChangeCipherSpec);
}

#[test]
fn rsa_premaster_corruption_fails_at_finished_not_cke() {
    let config = Arc::new(config_with(rsa_vhost()));
    let mut hs = ServerHandshake::new(config, Box::new(FakeSchedule));
    let mut transcript = Transcript::new();

    let hello = HelloBuilder::new(&[RSA_KX]).sig_algs(&[(4, 1)]).build();
    transcript.add_msg(HandshakeType::ClientHello, &hello);
    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert_eq!(res.unwrap(), Status::Complete);
    // Static RSA: no ServerKeyExchange.
    assert_eq!(
        frag_types(&out),
        vec![
            HandshakeType::ServerHello,
            HandshakeType::Certificate,
            HandshakeType::ServerHelloDone,
        ]
    );
    let srv_random = server_random(&out);
    transcript.add_frags(&out);

    // A corrupted ciphertext: the "decryption" fails, but the handshake
    // must proceed as if it had worked.
    let mut garbage = vec![0u8; RSA_KEY_LEN];
    garbage[0] = 0x99;
    let mut cke = (RSA_KEY_LEN as u16).to_be_bytes().to_vec();
    cke.extend_from_slice(&garbage);
    transcript.add_msg(HandshakeType::ClientKeyExchange, &cke);
    let (res, out) = feed(&mut hs, HandshakeType::ClientKeyExchange, &cke);
    assert_eq!(res.unwrap(), Status::Complete);
    assert!(out.is_empty(), "no error surfaced at ClientKeyExchange");

    let mut out = Vec::new();
    hs.process_change_cipher_spec(&[0x01], &mut out).unwrap();

    // The client believes the premaster it sent; the server derived one
    // from the random fake. Finished must fail with a MAC-style error.
    let claimed = [0xabu8; 48];
    let master = fake_master(&claimed, false, &randoms(&[0x11; 32], &srv_random));
    let vd = fake_verify_data(&master, b"client finished", &transcript.hash());
    let (res, out) = feed(&mut hs, HandshakeType::Finished, &vd);
    assert_eq!(res.unwrap_err(), Error::DecryptError);
    assert_eq!(alert_in(&out), Some(AlertDescription::BadRecordMac));
}

#[test]
fn rsa_valid_premaster_completes() {
    let config = Arc::new(config_with(rsa_vhost()));
    let mut hs = ServerHandshake::new(config, Box::new(FakeSchedule));
    let mut transcript = Transcript::new();

    let hello = HelloBuilder::new(&[RSA_KX]).sig_algs(&[(4, 1)]).build();
    transcript.add_msg(HandshakeType::ClientHello, &hello);
    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert_eq!(res.unwrap(), Status::Complete);
    let srv_random = server_random(&out);
    transcript.add_frags(&out);

    let mut premaster = [0u8; 48];
    premaster[0] = 3; // client_version major
    premaster[1] = 3; // client_version minor
    for (i, b) in premaster.iter_mut().enumerate().skip(2) {
        *b = i as u8;
    }
    let ct = RsaTestKey::encrypt(&premaster);
    let mut cke = (RSA_KEY_LEN as u16).to_be_bytes().to_vec();
    cke.extend_from_slice(&ct);
    transcript.add_msg(HandshakeType::ClientKeyExchange, &cke);
    let (res, _) = feed(&mut hs, HandshakeType::ClientKeyExchange, &cke);
    assert_eq!(res.unwrap(), Status::Complete);

    let mut out = Vec::new();
    hs.process_change_cipher_spec(&[0x01], &mut out).unwrap();

    let master = fake_master(&premaster, false, &randoms(&[0x11; 32], &srv_random));
    let vd = fake_verify_data(&master, b"client finished", &transcript.hash());
    let (res, out) = feed(&mut hs, HandshakeType::Finished, &vd);
    assert_eq!(res.unwrap(), Status::Complete);
    assert!(hs.is_over());
    assert_eq!(out[0].typ, ContentType::ChangeCipherSpec);
}

#[test]
fn fragmented_hello_equals_single_shot() {
    let hello = HelloBuilder::new(&[ECDHE_ECDSA, 0x1234])
        .session_id(&[9; 17])
        .curves(&[29, 23])
        .point_formats()
        .sig_algs(&[(6, 1), (4, 3)])
        .sni(b"example.com")
        .alpn(&[b"h2", b"http/1.1"])
        .build();

    let mk = || {
        let mut cfg = config_with(ecdsa_vhost());
        cfg.alpn_protocols = vec![b"http/1.1".to_vec(), b"h2".to_vec()];
        ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule))
    };

    let mut one_shot = mk();
    let (res, out_a) = feed(&mut one_shot, HandshakeType::ClientHello, &hello);
    assert_eq!(res.unwrap(), Status::Complete);

    let mut dribble = mk();
    let (res, out_b) = feed_bytewise(&mut dribble, HandshakeType::ClientHello, &hello);
    assert_eq!(res.unwrap(), Status::Complete);

    assert_eq!(one_shot.state(), dribble.state());
    assert_eq!(one_shot.alpn_protocol(), dribble.alpn_protocol());
    assert_eq!(one_shot.alpn_protocol(), Some(&b"http/1.1"[..]));
    assert_eq!(frag_types(&out_a), frag_types(&out_b));
    // The ServerHello payloads differ only in randomness: same lengths.
    assert_eq!(out_a.len(), out_b.len());
    for (a, b) in out_a.iter().zip(out_b.iter()) {
        assert_eq!(a.payload.len(), b.payload.len());
    }
}

#[test]
fn session_resumption_via_ticket() {
    let sealer = Arc::new(ClearSealer);
    let sess = SessionState {
        suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        master: [0x5a; 48],
        start: 1_700_000_000,
        extended_ms: false,
    };
    let blob = sealer.seal(&sess).unwrap();

    let mut cfg = config_with(ecdsa_vhost());
    cfg.ticketer = Some(sealer);
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));

    let sid = [0x77u8; 32];
    let hello = HelloBuilder::new(&[ECDHE_ECDSA])
        .session_id(&sid)
        .curves(&[23])
        .sig_algs(&[(4, 3)])
        .ticket(&blob)
        .build();

    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert_eq!(res.unwrap(), Status::Complete);
    assert!(hs.resumed());
    // Certificate and ServerKeyExchange are skipped; the server goes
    // straight to ChangeCipherSpec + Finished.
    assert_eq!(
        frag_types(&out),
        vec![HandshakeType::ServerHello, HandshakeType::Finished]
    );
    assert!(out.iter().any(|f| f.typ == ContentType::ChangeCipherSpec));
    assert_eq!(hs.state(), ServerState::ClientChangeCipherSpec);

    // RFC 5077 3.4: the session id is echoed to signal acceptance.
    let sh = decode_frag(&out[0]);
    let HandshakePayload::ServerHello(sh) = sh.payload else {
        panic!("wrong payload");
    };
    assert_eq!(sh.session_id.as_ref(), &sid);
}

#[test]
fn corrupt_ticket_falls_back_to_full_handshake() {
    let mut cfg = config_with(ecdsa_vhost());
    cfg.ticketer = Some(Arc::new(ClearSealer));
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));

    let hello = HelloBuilder::new(&[ECDHE_ECDSA])
        .curves(&[23])
        .sig_algs(&[(4, 3)])
        .ticket(b"not a ticket")
        .build();

    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert_eq!(res.unwrap(), Status::Complete);
    assert!(!hs.resumed());
    // Full flight, and a fresh ticket will be issued: empty session id.
    let sh = decode_frag(&out[0]);
    let HandshakePayload::ServerHello(sh) = sh.payload else {
        panic!("wrong payload");
    };
    assert!(sh.session_id.is_empty());
    assert!(frag_types(&out).contains(&HandshakeType::Certificate));
}

#[test]
fn sni_miss_is_fatal_unrecognised_name() {
    let resolver = NamedResolver {
        vhost: ecdsa_vhost(),
        expect: b"example.com",
        default_ok: false,
        seen: Mutex::new(Vec::new()),
    };
    let cfg = ServerConfig::new(Arc::new(resolver));
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));

    let hello = HelloBuilder::new(&[ECDHE_ECDSA])
        .curves(&[23])
        .sig_algs(&[(4, 3)])
        .sni(b"unknown.example.org")
        .build();

    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert_eq!(
        res.unwrap_err(),
        Error::BadHandshakeMessage(HandshakeType::ClientHello)
    );
    assert_eq!(alert_in(&out), Some(AlertDescription::UnrecognisedName));
}

#[test]
fn alpn_no_overlap_is_fatal() {
    let mut cfg = config_with(ecdsa_vhost());
    cfg.alpn_protocols = vec![b"h2".to_vec()];
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));

    let hello = HelloBuilder::new(&[ECDHE_ECDSA])
        .curves(&[23])
        .sig_algs(&[(4, 3)])
        .alpn(&[b"spdy/3", b"http/0.9"])
        .build();

    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert_eq!(res.unwrap_err(), Error::NoApplicationProtocol);
    assert_eq!(alert_in(&out), Some(AlertDescription::NoApplicationProtocol));
}

#[test]
fn missing_null_compression_is_fatal() {
    let cfg = config_with(ecdsa_vhost());
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));

    let mut builder = HelloBuilder::new(&[ECDHE_ECDSA]);
    builder.compressions = vec![0x01]; // deflate only
    let hello = builder.curves(&[23]).sig_algs(&[(4, 3)]).build();

    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert_eq!(
        res.unwrap_err(),
        Error::BadHandshakeMessage(HandshakeType::ClientHello)
    );
    assert_eq!(alert_in(&out), Some(AlertDescription::DecodeError));
}

#[test]
fn fallback_scsv_rejected_when_downgraded() {
    // A deployment whose record layer also speaks a newer version sets a
    // higher ceiling; a 1.2 ClientHello with FALLBACK_SCSV is then a
    // downgrade.
    let mut cfg = config_with(ecdsa_vhost());
    cfg.max_minor_version = 4;
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));

    let hello = HelloBuilder::new(&[ECDHE_ECDSA, 0x5600])
        .curves(&[23])
        .sig_algs(&[(4, 3)])
        .build();

    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert!(res.is_err());
    assert_eq!(alert_in(&out), Some(AlertDescription::InappropriateFallback));

    // At the pinned 1.2 ceiling the same hello is fine.
    let cfg = config_with(ecdsa_vhost());
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));
    let (res, _) = feed(
        &mut hs,
        HandshakeType::ClientHello,
        &HelloBuilder::new(&[ECDHE_ECDSA, 0x5600])
            .curves(&[23])
            .sig_algs(&[(4, 3)])
            .build(),
    );
    assert_eq!(res.unwrap(), Status::Complete);
}

#[test]
fn bad_version_is_fatal_protocol_version() {
    let cfg = config_with(ecdsa_vhost());
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));

    let mut builder = HelloBuilder::new(&[ECDHE_ECDSA]);
    builder.version = (3, 2);
    let hello = builder.build();

    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert!(res.is_err());
    assert_eq!(alert_in(&out), Some(AlertDescription::ProtocolVersion));
}

#[test]
fn no_common_ciphersuite_is_handshake_failure() {
    let cfg = config_with(ecdsa_vhost());
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));

    // Offers only a suite we do not implement.
    let hello = HelloBuilder::new(&[0x1301]).build();
    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert!(res.is_err());
    assert_eq!(alert_in(&out), Some(AlertDescription::HandshakeFailure));
}

#[test]
fn ecdsa_suite_needs_matching_curve() {
    // The client offers the ECDSA suite but no curve the certificate
    // lives on; selection must fail over to HandshakeFailure.
    let cfg = config_with(ecdsa_vhost());
    let mut hs = ServerHandshake::new(Arc::new(cfg), Box::new(FakeSchedule));

    let hello = HelloBuilder::new(&[ECDHE_ECDSA])
        .curves(&[24]) // secp384r1 only
        .sig_algs(&[(4, 3)])
        .build();
    let (res, out) = feed(&mut hs, HandshakeType::ClientHello, &hello);
    assert!(res.is_err());
    assert_eq!(alert_in(&out), Some(AlertDescription::HandshakeFailure));
}

#[test]
fn fragmented_client_key_exchange_is_coalesced() {
    let config = Arc::new(config_with(rsa_vhost()));
    let mut hs = ServerHandshake::new(config, Box::new(FakeSchedule));

    let hello = HelloBuilder::new(&[RSA_KX]).sig_algs(&[(4, 1)]).build();
    feed(&mut hs, HandshakeType::ClientHello, &hello).0.unwrap();

    let mut premaster = [0u8; 48];
    premaster[0] = 3;
    premaster[1] = 3;
    let ct = RsaTestKey::encrypt(&premaster);
    let mut cke = (RSA_KEY_LEN as u16).to_be_bytes().to_vec();
    cke.extend_from_slice(&ct);

    let mut out = Vec::new();
    let (first, second) = cke.split_at(10);
    let res = hs
        .process_handshake(
            &MsgChunk {
                typ: HandshakeType::ClientKeyExchange,
                msg_len: cke.len(),
                already_read: 0,
                buf: first,
            },
            &mut out,
        )
        .unwrap();
    assert_eq!(res, Status::Postponed);
    let res = hs
        .process_handshake(
            &MsgChunk {
                typ: HandshakeType::ClientKeyExchange,
                msg_len: cke.len(),
                already_read: first.len(),
                buf: second,
            },
            &mut out,
        )
        .unwrap();
    assert_eq!(res, Status::Complete);
    assert_eq!(hs.state(), ServerState::ClientChangeCipherSpec);
}

//! The server handshake machine.
//!
//! One [`ServerHandshake`] drives a single connection from ClientHello to
//! completion. Input arrives as chunks of the current handshake message
//! (the record layer strips record framing and supplies the message type
//! and length); output leaves as a list of [`OutFrag`] scatter-gather
//! segments for the record layer to protect and transmit.
//!
//! No call blocks: when a chunk does not complete the pending message the
//! machine returns [`Status::Postponed`] and keeps its sub-parser state
//! for re-entry at the same point.

#[cfg(feature = "logging")]
use crate::log::{debug, trace, warn};

use std::sync::Arc;

use tls_core::msgs::alert::AlertMessagePayload;
use tls_core::msgs::codec::Codec;
use tls_core::msgs::enums::{
    AlertDescription, ContentType, ECPointFormat, HandshakeType,
};
use tls_core::msgs::handshake::{HandshakeMessagePayload, SessionID};
use tls_core::suites::Tls12CipherSuite;
use tls_core::Error;
use tls_ecp::CurveInfo;
use zeroize::Zeroize;

use crate::backend::{KeySchedule, LABEL_CLIENT_FINISHED};
use crate::check::require_msg_type;
use crate::cke;
use crate::config::ServerConfig;
use crate::flight;
use crate::hash_hs::{HandshakeHash, HandshakeHashBuffer};
use crate::hello::ClientHelloParser;
use crate::kx::KxContext;
use crate::resolver::VhostConfig;
use crate::select::{self, SigHashSet};
use crate::sign::{CertifiedKey, PeerCertificate};
use crate::ticket::SessionState;
use crate::{FINISHED_BODY_LEN, MAX_CKE_SIZE};

/// Result of feeding bytes into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The current message was fully consumed; the state advanced.
    Complete,
    /// More bytes are needed; saved substate retains the progress.
    Postponed,
}

/// One chunk of the current inbound handshake message.
pub struct MsgChunk<'a> {
    /// Handshake message type from the 4-byte message header.
    pub typ: HandshakeType,
    /// Total body length from the message header.
    pub msg_len: usize,
    /// Body bytes already delivered in earlier chunks.
    pub already_read: usize,
    /// This chunk of the body.
    pub buf: &'a [u8],
}

/// A scatter-gather output segment: one record-layer payload of the given
/// content type, ready for protection and framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutFrag {
    pub typ: ContentType,
    pub payload: Vec<u8>,
}

/// Push a fatal alert fragment and hand back the error to return.
pub(crate) fn fatal_alert(out: &mut Vec<OutFrag>, desc: AlertDescription, err: Error) -> Error {
    out.push(OutFrag {
        typ: ContentType::Alert,
        payload: AlertMessagePayload::fatal(desc).get_encoding(),
    });
    err
}

/// Server handshake states, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    ClientHello,
    ClientCertificate,
    ClientKeyExchange,
    CertificateVerify,
    ClientChangeCipherSpec,
    ClientFinished,
    HandshakeOver,
}

/// Running hash of the transcript: buffered until the suite fixes the
/// algorithm.
pub(crate) enum Transcript {
    Buffer(HandshakeHashBuffer),
    Hash(HandshakeHash),
    // Transitional; never observed.
    Swapping,
}

impl Transcript {
    pub(crate) fn update_raw(&mut self, bytes: &[u8]) {
        match self {
            Transcript::Buffer(b) => b.update_raw(bytes),
            Transcript::Hash(h) => {
                h.update_raw(bytes);
            }
            Transcript::Swapping => unreachable!(),
        }
    }

    fn start_hash(&mut self, alg: tls_core::msgs::enums::HashAlgorithm) {
        let old = std::mem::replace(self, Transcript::Swapping);
        *self = match old {
            Transcript::Buffer(b) => Transcript::Hash(b.start_hash(alg)),
            other => other,
        };
    }

    pub(crate) fn current_hash(&self) -> Vec<u8> {
        match self {
            Transcript::Hash(h) => h.get_current_hash(),
            _ => panic!("transcript hash not started"),
        }
    }

    pub(crate) fn hash_with(
        &self,
        alg: tls_core::msgs::enums::HashAlgorithm,
    ) -> Option<Vec<u8>> {
        match self {
            Transcript::Hash(h) => h.get_hash_with(alg),
            _ => None,
        }
    }

    fn abandon_client_auth(&mut self) {
        if let Transcript::Hash(h) = self {
            h.abandon_client_auth();
        }
    }
}

/// Per-connection handshake scratch. Owns all the secrets; zeroised when
/// the handshake wraps up or the machine is dropped.
pub(crate) struct HandshakeCtx {
    /// client_random || server_random.
    pub randbytes: [u8; 64],
    /// Session id offered by the client, echoed on resumption.
    pub client_session_id: Vec<u8>,
    /// Session id the ServerHello actually carried.
    pub session_id: Vec<u8>,
    /// Offered ciphersuites, clamped to the storage cap.
    pub css: Vec<u16>,
    /// Client-offered curves we also support, client preference order.
    pub curves: Vec<&'static CurveInfo>,
    pub sig_hash: SigHashSet,
    pub sig_algs_ext: bool,
    pub curves_ext: bool,
    /// Client sent EC point formats (we answer with uncompressed).
    pub cli_exts: bool,
    pub point_format: ECPointFormat,
    pub secure_renegotiation: bool,
    pub extended_ms: bool,
    pub new_session_ticket: bool,
    pub resume: bool,
    pub resumed_session: Option<SessionState>,
    pub vhost: Option<Arc<VhostConfig>>,
    pub alpn_chosen: Option<Vec<u8>>,
    pub suite: Option<&'static Tls12CipherSuite>,
    pub chosen_cert: Option<Arc<CertifiedKey>>,
    pub kx: Option<KxContext>,
    pub peer_cert: Option<PeerCertificate>,
    pub transcript: Transcript,
    pub master: [u8; 48],
    pub session_start: u64,
}

impl HandshakeCtx {
    fn new(client_auth: bool) -> Self {
        let mut buffer = HandshakeHashBuffer::new();
        if client_auth {
            buffer.set_client_auth_enabled();
        }
        Self {
            randbytes: [0; 64],
            client_session_id: Vec::new(),
            session_id: Vec::new(),
            css: Vec::new(),
            curves: Vec::new(),
            sig_hash: SigHashSet::default(),
            sig_algs_ext: false,
            curves_ext: false,
            cli_exts: false,
            point_format: ECPointFormat::Uncompressed,
            secure_renegotiation: false,
            extended_ms: false,
            new_session_ticket: false,
            resume: false,
            resumed_session: None,
            vhost: None,
            alpn_chosen: None,
            suite: None,
            chosen_cert: None,
            kx: None,
            peer_cert: None,
            transcript: Transcript::Buffer(buffer),
            master: [0; 48],
            session_start: 0,
        }
    }

    pub(crate) fn suite(&self) -> &'static Tls12CipherSuite {
        self.suite.expect("suite negotiated")
    }

    /// Wipe everything secret.
    fn wipe(&mut self) {
        self.master.zeroize();
        self.kx = None;
        self.resumed_session = None;
    }
}

impl Drop for HandshakeCtx {
    fn drop(&mut self) {
        self.wipe();
    }
}

/// The incremental server-side handshake machine.
pub struct ServerHandshake {
    config: Arc<ServerConfig>,
    backend: Box<dyn KeySchedule>,
    state: ServerState,
    pub(crate) ctx: HandshakeCtx,
    hello: Option<ClientHelloParser>,
    /// Coalescing buffer for fragmented post-hello messages.
    gather: Vec<u8>,
}

impl ServerHandshake {
    pub fn new(config: Arc<ServerConfig>, backend: Box<dyn KeySchedule>) -> Self {
        let client_auth = config.request_client_certificate;
        Self {
            config,
            backend,
            state: ServerState::ClientHello,
            ctx: HandshakeCtx::new(client_auth),
            hello: None,
            gather: Vec::new(),
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_over(&self) -> bool {
        self.state == ServerState::HandshakeOver
    }

    /// The ALPN protocol selected during the handshake, if any.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.ctx.alpn_chosen.as_deref()
    }

    /// Was the session resumed from a ticket?
    pub fn resumed(&self) -> bool {
        self.ctx.resume
    }

    /// Feed a chunk of the current inbound handshake message.
    ///
    /// Emitted flights and alerts are appended to `out`. On a fatal error
    /// the alert to send is already in `out` and no further input is
    /// consumed.
    pub fn process_handshake(
        &mut self,
        chunk: &MsgChunk<'_>,
        out: &mut Vec<OutFrag>,
    ) -> Result<Status, Error> {
        debug_assert!(chunk.already_read + chunk.buf.len() <= chunk.msg_len);
        trace!(
            "server state {:?}, message {:?} ({} of {} bytes)",
            self.state,
            chunk.typ,
            chunk.already_read + chunk.buf.len(),
            chunk.msg_len
        );

        match self.state {
            ServerState::ClientHello => self.handle_client_hello(chunk, out),
            ServerState::ClientCertificate => self.handle_client_certificate(chunk, out),
            ServerState::ClientKeyExchange => self.handle_client_key_exchange(chunk, out),
            ServerState::CertificateVerify => self.handle_certificate_verify(chunk, out),
            ServerState::ClientFinished => self.handle_finished(chunk, out),
            ServerState::ClientChangeCipherSpec => Err(fatal_alert(
                out,
                AlertDescription::UnexpectedMessage,
                Error::InappropriateMessage {
                    expect_types: vec![ContentType::ChangeCipherSpec],
                    got_type: ContentType::Handshake,
                },
            )),
            ServerState::HandshakeOver => Err(Error::HandshakeNotComplete),
        }
    }

    /// Consume the client ChangeCipherSpec. The message is not part of
    /// the handshake transcript.
    pub fn process_change_cipher_spec(
        &mut self,
        body: &[u8],
        out: &mut Vec<OutFrag>,
    ) -> Result<(), Error> {
        if self.state != ServerState::ClientChangeCipherSpec {
            return Err(fatal_alert(
                out,
                AlertDescription::UnexpectedMessage,
                Error::InappropriateMessage {
                    expect_types: vec![ContentType::Handshake],
                    got_type: ContentType::ChangeCipherSpec,
                },
            ));
        }
        if body != [0x01] {
            return Err(fatal_alert(
                out,
                AlertDescription::DecodeError,
                Error::CorruptMessagePayload(ContentType::ChangeCipherSpec),
            ));
        }
        self.state = ServerState::ClientFinished;
        Ok(())
    }

    fn handle_client_hello(
        &mut self,
        chunk: &MsgChunk<'_>,
        out: &mut Vec<OutFrag>,
    ) -> Result<Status, Error> {
        if chunk.typ != HandshakeType::ClientHello {
            debug!("bad type in client hello message");
            return Err(Error::BadHandshakeMessage(HandshakeType::ClientHello));
        }

        self.add_chunk_to_transcript(chunk);
        let parser = self
            .hello
            .get_or_insert_with(|| ClientHelloParser::new(chunk.msg_len));

        match parser.parse(&self.config, &mut self.ctx, chunk.buf, out)? {
            Status::Postponed => return Ok(Status::Postponed),
            Status::Complete => {}
        }
        self.hello = None;

        // The message is parsed; resolve the vhost, intersect signature
        // preferences and pick the ciphersuite.
        select::finish_client_hello(&self.config, &mut self.ctx, out)?;
        let suite = self.ctx.suite();
        self.ctx.transcript.start_hash(suite.hash_algorithm);
        if self.ctx.peer_cert.is_none() && !self.config.request_client_certificate {
            self.ctx.transcript.abandon_client_auth();
        }

        if self.ctx.resume {
            // Resumption reorders the flights: ServerHello, then our
            // ChangeCipherSpec/Finished straight away.
            flight::write_server_hello(&mut self.ctx, out)?;
            let sess = self.ctx.resumed_session.take().expect("resume set");
            self.ctx.master = sess.master;
            self.ctx.extended_ms = sess.extended_ms;
            self.backend
                .derive_keys(suite, &self.ctx.master, &self.ctx.randbytes)?;
            flight::write_finished_flight(
                &self.config,
                &mut self.ctx,
                self.backend.as_mut(),
                out,
            )?;
            self.state = ServerState::ClientChangeCipherSpec;
        } else {
            flight::write_server_hello(&mut self.ctx, out)?;
            flight::write_certificate(&mut self.ctx, out)?;
            flight::write_server_key_exchange(&self.config, &mut self.ctx, out)?;
            let expect_client_cert = self.config.request_client_certificate
                && self.config.client_cert_verifier.is_some();
            if expect_client_cert {
                flight::write_certificate_request(&self.config, &mut self.ctx, out)?;
            }
            flight::write_server_hello_done(&mut self.ctx, out)?;
            self.state = if expect_client_cert {
                ServerState::ClientCertificate
            } else {
                ServerState::ClientKeyExchange
            };
        }
        Ok(Status::Complete)
    }

    /// Coalesce a fragmented message into the gather buffer. Returns the
    /// complete body, or None to postpone.
    fn gather_message<'c>(
        &mut self,
        chunk: &MsgChunk<'c>,
        out: &mut Vec<OutFrag>,
    ) -> Result<Option<Vec<u8>>, Error> {
        if chunk.already_read == 0 && chunk.buf.len() == chunk.msg_len {
            return Ok(Some(chunk.buf.to_vec()));
        }

        if chunk.msg_len > MAX_CKE_SIZE {
            return Err(fatal_alert(
                out,
                AlertDescription::InternalError,
                Error::PeerSentOversizedRecord,
            ));
        }
        warn!(
            "chunked handshake message, falling back to copy ({} of {} bytes)",
            chunk.already_read + chunk.buf.len(),
            chunk.msg_len
        );
        self.gather.extend_from_slice(chunk.buf);
        if self.gather.len() < chunk.msg_len {
            return Ok(None);
        }
        Ok(Some(std::mem::take(&mut self.gather)))
    }

    fn handle_client_certificate(
        &mut self,
        chunk: &MsgChunk<'_>,
        out: &mut Vec<OutFrag>,
    ) -> Result<Status, Error> {
        require_msg_type(chunk.typ, HandshakeType::Certificate)?;
        self.add_chunk_to_transcript(chunk);
        let body = match self.gather_message(chunk, out)? {
            Some(body) => body,
            None => return Ok(Status::Postponed),
        };

        cke::parse_client_certificate(&self.config, &mut self.ctx, &body, out)?;
        self.state = ServerState::ClientKeyExchange;
        Ok(Status::Complete)
    }

    fn handle_client_key_exchange(
        &mut self,
        chunk: &MsgChunk<'_>,
        out: &mut Vec<OutFrag>,
    ) -> Result<Status, Error> {
        require_msg_type(chunk.typ, HandshakeType::ClientKeyExchange)?;
        self.add_chunk_to_transcript(chunk);
        let body = match self.gather_message(chunk, out)? {
            Some(body) => body,
            None => return Ok(Status::Postponed),
        };

        cke::parse_client_key_exchange(
            &self.config,
            &mut self.ctx,
            self.backend.as_mut(),
            &body,
            out,
        )?;

        self.state = if self.ctx.peer_cert.is_some() {
            ServerState::CertificateVerify
        } else {
            ServerState::ClientChangeCipherSpec
        };
        Ok(Status::Complete)
    }

    fn handle_certificate_verify(
        &mut self,
        chunk: &MsgChunk<'_>,
        out: &mut Vec<OutFrag>,
    ) -> Result<Status, Error> {
        require_msg_type(chunk.typ, HandshakeType::CertificateVerify)?;
        // The digest covers the transcript up to (not including) this
        // message, so the transcript update comes after verification.
        let body = match self.gather_message(chunk, out)? {
            Some(body) => body,
            None => return Ok(Status::Postponed),
        };

        cke::parse_certificate_verify(&self.config, &mut self.ctx, &body, out)?;
        self.add_message_to_transcript(chunk.typ, &body);
        self.state = ServerState::ClientChangeCipherSpec;
        Ok(Status::Complete)
    }

    fn handle_finished(
        &mut self,
        chunk: &MsgChunk<'_>,
        out: &mut Vec<OutFrag>,
    ) -> Result<Status, Error> {
        require_msg_type(chunk.typ, HandshakeType::Finished)?;
        let body = match self.gather_message(chunk, out)? {
            Some(body) => body,
            None => return Ok(Status::Postponed),
        };

        if body.len() != FINISHED_BODY_LEN {
            return Err(fatal_alert(
                out,
                AlertDescription::DecodeError,
                Error::BadHandshakeMessage(HandshakeType::Finished),
            ));
        }

        let suite = self.ctx.suite();
        let expect = self.backend.verify_data(
            suite,
            &self.ctx.master,
            LABEL_CLIENT_FINISHED,
            &self.ctx.transcript.current_hash(),
        );

        // Constant-time comparison; with the static-RSA countermeasure a
        // forged premaster must fail here and only here.
        let mut diff = 0u8;
        for (a, b) in expect.iter().zip(body.iter()) {
            diff |= a ^ b;
        }
        if diff != 0 {
            debug!("client Finished verification failed");
            return Err(fatal_alert(
                out,
                AlertDescription::BadRecordMac,
                Error::DecryptError,
            ));
        }
        self.add_message_to_transcript(chunk.typ, &body);

        if self.ctx.resume {
            self.wrapup();
        } else {
            flight::write_finished_flight(
                &self.config,
                &mut self.ctx,
                self.backend.as_mut(),
                out,
            )?;
            self.wrapup();
        }
        Ok(Status::Complete)
    }

    fn wrapup(&mut self) {
        debug!("handshake complete{}", if self.ctx.resume { " (resumed)" } else { "" });
        self.ctx.wipe();
        self.state = ServerState::HandshakeOver;
    }

    /// Feed a raw inbound chunk into the transcript, prepending the
    /// reconstructed message header on the first chunk.
    fn add_chunk_to_transcript(&mut self, chunk: &MsgChunk<'_>) {
        if chunk.already_read == 0 {
            let hdr = [
                chunk.typ.get_u8(),
                (chunk.msg_len >> 16) as u8,
                (chunk.msg_len >> 8) as u8,
                chunk.msg_len as u8,
            ];
            self.ctx.transcript.update_raw(&hdr);
        }
        self.ctx.transcript.update_raw(chunk.buf);
    }

    fn add_message_to_transcript(&mut self, typ: HandshakeType, body: &[u8]) {
        let hdr = [
            typ.get_u8(),
            (body.len() >> 16) as u8,
            (body.len() >> 8) as u8,
            body.len() as u8,
        ];
        self.ctx.transcript.update_raw(&hdr);
        self.ctx.transcript.update_raw(body);
    }
}

/// Append a handshake message to the output and the transcript.
pub(crate) fn emit_handshake(
    ctx: &mut HandshakeCtx,
    out: &mut Vec<OutFrag>,
    msg: HandshakeMessagePayload,
) {
    let bytes = msg.get_encoding();
    ctx.transcript.update_raw(&bytes);
    out.push(OutFrag {
        typ: ContentType::Handshake,
        payload: bytes,
    });
}

/// Helpers shared with the flight writers.
pub(crate) fn session_id_from(bytes: &[u8]) -> SessionID {
    SessionID::new(bytes)
}

//! Incremental ClientHello parsing.
//!
//! The parser is a nested state machine over the ClientHello layout:
//!
//! ```text
//!  0 .  1   protocol version
//!  2 . 33   random bytes (starting with 4 bytes of Unix time)
//! 34 . 34   session id length
//! .. . ..   session id
//! .. . ..   ciphersuite list length (2 bytes) + list
//! .. . ..   compression list length (1 byte) + list
//! .. . ..   extensions length (2 bytes, optional) + extensions
//! ```
//!
//! Every substate consumes at most what it needs from the current chunk
//! and re-enters at the same point when more bytes arrive, so the message
//! may be split at any byte boundary. Multi-byte fields that straddle a
//! chunk keep their partial value inside the substate variant.

#[cfg(feature = "logging")]
use crate::log::{debug, trace, warn};

use tls_core::msgs::codec::{Codec, Reader};
use tls_core::msgs::enums::{
    AlertDescription, CipherSuite, ExtensionType, HandshakeType, SignatureAlgorithm,
};
use tls_core::msgs::handshake::{
    ECPointFormatList, NamedGroups, ProtocolNameList, ServerNameRequest,
    SupportedSignatureAlgorithms, SNI_HOSTNAME,
};
use tls_core::Error;
use tls_ecp::curve_info_from_tls_id;

use crate::config::ServerConfig;
use crate::conn::{fatal_alert, HandshakeCtx, OutFrag, Status};
use crate::{MAX_ALPN_PROTOCOLS, MAX_CIPHERSUITE_BYTES, MAX_CURVES, MAX_EXT_SIZE};

/// Where the parser currently is, together with any partial payload.
#[derive(Debug)]
enum Substate {
    Version { hi: Option<u8> },
    Random { got: usize },
    SessionIdLen,
    SessionId { got: usize },
    SuitesLen { hi: Option<u8> },
    SuiteItem { hi: Option<u8> },
    SuitesSkip,
    CompressionLen,
    CompressionItems,
    ExtensionsLen { hi: Option<u8> },
    ExtType { hi: Option<u8> },
    ExtSize { hi: Option<u8> },
    ExtBody { got: usize },
    Done,
}

pub(crate) struct ClientHelloParser {
    sub: Substate,
    /// Unconsumed bytes of the message body.
    left: usize,
    client_minor: u8,
    session_id_len: usize,
    session_id: [u8; 32],
    cs_total: usize,
    cs_read: usize,
    compr_left: usize,
    compr_has_null: bool,
    ext_rem: usize,
    ext_type: u16,
    ext_size: usize,
    ext_buf: Vec<u8>,
}

impl ClientHelloParser {
    pub(crate) fn new(msg_len: usize) -> Self {
        Self {
            sub: Substate::Version { hi: None },
            left: msg_len,
            client_minor: 0,
            session_id_len: 0,
            session_id: [0; 32],
            cs_total: 0,
            cs_read: 0,
            compr_left: 0,
            compr_has_null: false,
            ext_rem: 0,
            ext_type: 0,
            ext_size: 0,
            ext_buf: Vec::new(),
        }
    }

    /// Feed the next chunk. Returns `Postponed` until the whole message
    /// has been seen.
    pub(crate) fn parse(
        &mut self,
        cfg: &ServerConfig,
        ctx: &mut HandshakeCtx,
        chunk: &[u8],
        out: &mut Vec<OutFrag>,
    ) -> Result<Status, Error> {
        let mut p = 0usize;
        let buf = chunk;

        loop {
            match self.sub {
                Substate::Version { hi } => {
                    let (major, minor) = match (hi, buf.len() - p) {
                        (Some(major), n) if n >= 1 => (major, buf[p]),
                        (None, n) if n >= 2 => (buf[p], buf[p + 1]),
                        (None, 1) => {
                            self.sub = Substate::Version { hi: Some(buf[p]) };
                            self.consume(1, &mut p);
                            return Ok(Status::Postponed);
                        }
                        _ => return Ok(Status::Postponed),
                    };
                    self.consume(if hi.is_some() { 1 } else { 2 }, &mut p);
                    if major != 3 || minor != 3 {
                        debug!("ClientHello: bad version {major}:{minor}");
                        return Err(fatal_alert(
                            out,
                            AlertDescription::ProtocolVersion,
                            Error::PeerIncompatibleError("only TLS 1.2 is supported".into()),
                        ));
                    }
                    self.client_minor = minor;
                    self.sub = Substate::Random { got: 0 };
                }

                Substate::Random { got } => {
                    let n = (32 - got).min(buf.len() - p);
                    ctx.randbytes[got..got + n].copy_from_slice(&buf[p..p + n]);
                    self.consume(n, &mut p);
                    if got + n < 32 {
                        self.sub = Substate::Random { got: got + n };
                        return Ok(Status::Postponed);
                    }
                    trace!("ClientHello: random bytes {:02x?}", &ctx.randbytes[..32]);
                    self.sub = Substate::SessionIdLen;
                }

                Substate::SessionIdLen => {
                    if p == buf.len() {
                        return Ok(Status::Postponed);
                    }
                    let n = buf[p] as usize;
                    // 9 = 2 (cs length) + 2 (one cs) + 1 (compression count)
                    // + 1 (compression) + 2 (extensions length) + this byte.
                    if n > 32 || n + 9 > self.left {
                        debug!("ClientHello: bad session id length {n}");
                        return Err(self.decode_error(out));
                    }
                    self.session_id_len = n;
                    self.consume(1, &mut p);
                    self.sub = if n > 0 {
                        Substate::SessionId { got: 0 }
                    } else {
                        Substate::SuitesLen { hi: None }
                    };
                }

                Substate::SessionId { got } => {
                    let n = (self.session_id_len - got).min(buf.len() - p);
                    self.session_id[got..got + n].copy_from_slice(&buf[p..p + n]);
                    self.consume(n, &mut p);
                    if got + n < self.session_id_len {
                        self.sub = Substate::SessionId { got: got + n };
                        return Ok(Status::Postponed);
                    }
                    ctx.client_session_id = self.session_id[..self.session_id_len].to_vec();
                    self.sub = Substate::SuitesLen { hi: None };
                }

                Substate::SuitesLen { hi } => {
                    let v = match self.read_u16(hi, buf, &mut p) {
                        ReadU16::Done(v) => v,
                        ReadU16::Partial(h) => {
                            self.sub = Substate::SuitesLen { hi: Some(h) };
                            return Ok(Status::Postponed);
                        }
                        ReadU16::Starved => return Ok(Status::Postponed),
                    };
                    self.cs_total = v as usize;
                    self.cs_read = 0;
                    trace!("ClientHello: ciphersuite bytes {}", self.cs_total);
                    // 1 for the compression count byte.
                    if self.cs_total < 2 || self.cs_total + 1 > self.left || self.cs_total % 2 != 0
                    {
                        debug!("ClientHello: bad ciphersuite length {}", self.cs_total);
                        return Err(self.decode_error(out));
                    }
                    self.sub = Substate::SuiteItem { hi: None };
                }

                Substate::SuiteItem { hi } => {
                    // The storage is bounded; the tail of an oversized
                    // offer is skipped, clients order by preference.
                    if ctx.css.len() * 2 >= MAX_CIPHERSUITE_BYTES {
                        self.sub = Substate::SuitesSkip;
                        continue;
                    }
                    let v = match self.read_u16(hi, buf, &mut p) {
                        ReadU16::Done(v) => v,
                        ReadU16::Partial(h) => {
                            self.sub = Substate::SuiteItem { hi: Some(h) };
                            return Ok(Status::Postponed);
                        }
                        ReadU16::Starved => return Ok(Status::Postponed),
                    };
                    self.check_scsv(cfg, ctx, v, out)?;
                    ctx.css.push(v);
                    self.cs_read += 2;
                    self.sub = if self.cs_read == self.cs_total {
                        Substate::CompressionLen
                    } else {
                        Substate::SuiteItem { hi: None }
                    };
                }

                Substate::SuitesSkip => {
                    let n = (self.cs_total - self.cs_read).min(buf.len() - p);
                    self.consume(n, &mut p);
                    self.cs_read += n;
                    if self.cs_read < self.cs_total {
                        return Ok(Status::Postponed);
                    }
                    debug!(
                        "ClientHello: ciphersuite list clamped to {} entries",
                        ctx.css.len()
                    );
                    self.sub = Substate::CompressionLen;
                }

                Substate::CompressionLen => {
                    if p == buf.len() {
                        return Ok(Status::Postponed);
                    }
                    let n = buf[p] as usize;
                    if n < 1 || n > 16 || n + 1 > self.left {
                        debug!("ClientHello: bad compression count {n}");
                        return Err(self.decode_error(out));
                    }
                    self.compr_left = n;
                    self.compr_has_null = false;
                    self.consume(1, &mut p);
                    self.sub = Substate::CompressionItems;
                }

                Substate::CompressionItems => {
                    if p == buf.len() {
                        return Ok(Status::Postponed);
                    }
                    if buf[p] == 0x00 {
                        self.compr_has_null = true;
                    }
                    self.consume(1, &mut p);
                    self.compr_left -= 1;
                    if self.compr_left > 0 {
                        continue;
                    }
                    if !self.compr_has_null {
                        debug!("ClientHello: no null compression offered");
                        return Err(self.decode_error(out));
                    }
                    if self.left == 0 {
                        // Extensions are optional.
                        self.sub = Substate::Done;
                        return Ok(Status::Complete);
                    }
                    self.sub = Substate::ExtensionsLen { hi: None };
                }

                Substate::ExtensionsLen { hi } => {
                    let v = match self.read_u16(hi, buf, &mut p) {
                        ReadU16::Done(v) => v,
                        ReadU16::Partial(h) => {
                            self.sub = Substate::ExtensionsLen { hi: Some(h) };
                            return Ok(Status::Postponed);
                        }
                        ReadU16::Starved => return Ok(Status::Postponed),
                    };
                    self.ext_rem = v as usize;
                    if self.left != self.ext_rem || (self.ext_rem > 0 && self.ext_rem < 4) {
                        debug!(
                            "ClientHello: bad extensions length {} (rest {})",
                            self.ext_rem, self.left
                        );
                        return Err(self.decode_error(out));
                    }
                    if self.ext_rem == 0 {
                        self.sub = Substate::Done;
                        return Ok(Status::Complete);
                    }
                    trace!("ClientHello: extensions length {}", self.ext_rem);
                    self.sub = Substate::ExtType { hi: None };
                }

                Substate::ExtType { hi } => {
                    let v = match self.read_u16(hi, buf, &mut p) {
                        ReadU16::Done(v) => v,
                        ReadU16::Partial(h) => {
                            self.sub = Substate::ExtType { hi: Some(h) };
                            return Ok(Status::Postponed);
                        }
                        ReadU16::Starved => return Ok(Status::Postponed),
                    };
                    self.ext_type = v;
                    trace!("ClientHello: reading extension {:#06x}", v);
                    self.sub = Substate::ExtSize { hi: None };
                }

                Substate::ExtSize { hi } => {
                    let v = match self.read_u16(hi, buf, &mut p) {
                        ReadU16::Done(v) => v,
                        ReadU16::Partial(h) => {
                            self.sub = Substate::ExtSize { hi: Some(h) };
                            return Ok(Status::Postponed);
                        }
                        ReadU16::Starved => return Ok(Status::Postponed),
                    };
                    self.ext_size = v as usize;
                    if self.ext_size + 4 > self.ext_rem || self.ext_size > MAX_EXT_SIZE {
                        debug!(
                            "ClientHello: bad extension size {} (remaining {})",
                            self.ext_size, self.ext_rem
                        );
                        return Err(self.decode_error(out));
                    }
                    self.ext_buf.clear();
                    self.sub = Substate::ExtBody { got: 0 };
                }

                Substate::ExtBody { got } => {
                    // The body is assembled contiguously before dispatch:
                    // the extension parsers and callbacks want one slice,
                    // and extensions are small.
                    let n = (self.ext_size - got).min(buf.len() - p);
                    self.ext_buf.extend_from_slice(&buf[p..p + n]);
                    self.consume(n, &mut p);
                    if got + n < self.ext_size {
                        self.sub = Substate::ExtBody { got: got + n };
                        return Ok(Status::Postponed);
                    }

                    let body = std::mem::take(&mut self.ext_buf);
                    self.dispatch_extension(cfg, ctx, &body, out)?;

                    self.ext_rem -= 4 + self.ext_size;
                    if self.ext_rem > 0 && self.ext_rem < 4 {
                        debug!("ClientHello: bad extensions list");
                        return Err(self.decode_error(out));
                    }
                    if self.ext_rem > 0 {
                        self.sub = Substate::ExtType { hi: None };
                    } else {
                        self.sub = Substate::Done;
                        return Ok(Status::Complete);
                    }
                }

                Substate::Done => return Ok(Status::Complete),
            }
        }
    }

    fn consume(&mut self, n: usize, p: &mut usize) {
        *p += n;
        self.left -= n;
    }

    fn decode_error(&self, out: &mut Vec<OutFrag>) -> Error {
        fatal_alert(
            out,
            AlertDescription::DecodeError,
            Error::BadHandshakeMessage(HandshakeType::ClientHello),
        )
    }

    /// Read a big-endian u16 that may straddle a chunk boundary.
    fn read_u16(&mut self, hi: Option<u8>, buf: &[u8], p: &mut usize) -> ReadU16 {
        match (hi, buf.len() - *p) {
            (Some(h), n) if n >= 1 => {
                let v = ((h as u16) << 8) | buf[*p] as u16;
                self.consume(1, p);
                ReadU16::Done(v)
            }
            (None, n) if n >= 2 => {
                let v = ((buf[*p] as u16) << 8) | buf[*p + 1] as u16;
                self.consume(2, p);
                ReadU16::Done(v)
            }
            (None, 1) => {
                let h = buf[*p];
                self.consume(1, p);
                ReadU16::Partial(h)
            }
            _ => ReadU16::Starved,
        }
    }

    /// Signalling code-points are recognised inline while the list
    /// streams through.
    fn check_scsv(
        &mut self,
        cfg: &ServerConfig,
        ctx: &mut HandshakeCtx,
        suite: u16,
        out: &mut Vec<OutFrag>,
    ) -> Result<(), Error> {
        match CipherSuite::from(suite) {
            CipherSuite::TLS_FALLBACK_SCSV => {
                debug!("received FALLBACK_SCSV");
                if self.client_minor < cfg.max_minor_version {
                    debug!("inappropriate fallback");
                    return Err(fatal_alert(
                        out,
                        AlertDescription::InappropriateFallback,
                        Error::BadHandshakeMessage(HandshakeType::ClientHello),
                    ));
                }
            }
            CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV => {
                debug!("received EMPTY_RENEGOTIATION_INFO_SCSV");
                ctx.secure_renegotiation = true;
            }
            _ => {}
        }
        Ok(())
    }

    fn dispatch_extension(
        &mut self,
        cfg: &ServerConfig,
        ctx: &mut HandshakeCtx,
        body: &[u8],
        out: &mut Vec<OutFrag>,
    ) -> Result<(), Error> {
        match ExtensionType::from(self.ext_type) {
            ExtensionType::ServerName => {
                debug!("found ServerName extension");
                self.parse_servername(cfg, ctx, body, out)
            }
            ExtensionType::SignatureAlgorithms => {
                debug!("found signature_algorithms extension");
                self.parse_signature_algorithms(cfg, ctx, body, out)
            }
            ExtensionType::EllipticCurves => {
                debug!("found supported elliptic curves extension");
                self.parse_supported_curves(ctx, body, out)
            }
            ExtensionType::ECPointFormats => {
                debug!("found supported point formats extension");
                self.parse_point_formats(ctx, body, out)
            }
            ExtensionType::ExtendedMasterSecret => {
                debug!("found extended master secret extension");
                if !body.is_empty() {
                    return Err(self.decode_error(out));
                }
                ctx.extended_ms = true;
                Ok(())
            }
            ExtensionType::SessionTicket => {
                debug!("found session ticket extension");
                self.parse_session_ticket(cfg, ctx, body);
                Ok(())
            }
            ExtensionType::ALProtocolNegotiation => {
                debug!("found alpn extension");
                self.parse_alpn(cfg, ctx, body, out)
            }
            ExtensionType::RenegotiationInfo => {
                debug!("found renegotiation_info extension");
                if body != [0x00] {
                    debug!("ClientHello: bad renegotiation_info extension");
                    return Err(self.decode_error(out));
                }
                ctx.secure_renegotiation = true;
                Ok(())
            }
            _ => {
                debug!("unknown extension found: {} (ignoring)", self.ext_type);
                Ok(())
            }
        }
    }

    fn parse_servername(
        &mut self,
        cfg: &ServerConfig,
        ctx: &mut HandshakeCtx,
        body: &[u8],
        out: &mut Vec<OutFrag>,
    ) -> Result<(), Error> {
        let mut r = Reader::init(body);
        let names = match ServerNameRequest::read(&mut r) {
            Some(n) if !r.any_left() => n,
            _ => {
                debug!("ClientHello: bad SNI extension");
                return Err(self.decode_error(out));
            }
        };

        for name in &names.0 {
            if name.typ != SNI_HOSTNAME {
                continue;
            }
            if let Some(vhost) = cfg.cert_resolver.resolve(Some(&name.payload.0)) {
                trace!(
                    "SNI bound to {:?}",
                    crate::bs_debug::BsDebug(&name.payload.0)
                );
                ctx.vhost = Some(vhost);
                return Ok(());
            }
            warn!("server requested by client is not known");
            return Err(fatal_alert(
                out,
                AlertDescription::UnrecognisedName,
                Error::BadHandshakeMessage(HandshakeType::ClientHello),
            ));
        }
        Ok(())
    }

    /// We only use this extension to pick a ciphersuite whose
    /// ServerKeyExchange signature the client accepts; certificate-chain
    /// signatures are checked by the peer, not constrained here. One
    /// suitable hash per signature algorithm is all that needs keeping.
    fn parse_signature_algorithms(
        &mut self,
        cfg: &ServerConfig,
        ctx: &mut HandshakeCtx,
        body: &[u8],
        out: &mut Vec<OutFrag>,
    ) -> Result<(), Error> {
        let mut r = Reader::init(body);
        let algs = match SupportedSignatureAlgorithms::read(&mut r) {
            Some(a) if !r.any_left() => a,
            _ => {
                debug!("ClientHello: bad signature algorithm extension");
                return Err(self.decode_error(out));
            }
        };
        ctx.sig_algs_ext = true;

        for pair in &algs.0 {
            if !matches!(
                pair.sign,
                SignatureAlgorithm::RSA | SignatureAlgorithm::ECDSA
            ) {
                debug!("signature_algorithms: unknown sig alg {:?}", pair.sign);
                continue;
            }
            if !cfg.allowed_hashes.contains(&pair.hash) {
                debug!("signature_algorithms: unsupported hash {:?}", pair.hash);
                continue;
            }
            ctx.sig_hash.add(pair.sign, pair.hash);
        }
        Ok(())
    }

    fn parse_supported_curves(
        &mut self,
        ctx: &mut HandshakeCtx,
        body: &[u8],
        out: &mut Vec<OutFrag>,
    ) -> Result<(), Error> {
        if ctx.curves_ext {
            debug!("ClientHello: duplicate elliptic curves extension");
            return Err(self.decode_error(out));
        }
        ctx.curves_ext = true;

        let mut r = Reader::init(body);
        let groups = match NamedGroups::read(&mut r) {
            Some(g) if !r.any_left() => g,
            _ => {
                debug!("ClientHello: bad elliptic curves extension");
                return Err(self.decode_error(out));
            }
        };

        for group in &groups.0 {
            if ctx.curves.len() >= MAX_CURVES {
                debug!("ClientHello: curve list clamped at {MAX_CURVES}");
                break;
            }
            if let Some(ci) = curve_info_from_tls_id(group.get_u16()) {
                trace!("set curve {}", ci.name);
                ctx.curves.push(ci);
            }
        }
        Ok(())
    }

    fn parse_point_formats(
        &mut self,
        ctx: &mut HandshakeCtx,
        body: &[u8],
        out: &mut Vec<OutFrag>,
    ) -> Result<(), Error> {
        let mut r = Reader::init(body);
        let formats = match ECPointFormatList::read(&mut r) {
            Some(f) if !r.any_left() && !f.0.is_empty() => f,
            _ => {
                debug!("ClientHello: bad supported point formats extension");
                return Err(self.decode_error(out));
            }
        };
        ctx.cli_exts = true;
        trace!("ClientHello: point formats {:?}", formats.0);
        Ok(())
    }

    fn parse_session_ticket(&mut self, cfg: &ServerConfig, ctx: &mut HandshakeCtx, body: &[u8]) {
        let Some(sealer) = cfg.ticketer.as_ref() else {
            return;
        };

        // Remember the client asked us to send a new ticket.
        ctx.new_session_ticket = true;
        debug!("ClientHello: ticket length {}", body.len());

        if body.is_empty() {
            return;
        }

        // Failures are fine: ignore the ticket and run a full handshake.
        match sealer.open(body) {
            Some(sess) => {
                debug!("ClientHello: session restored from ticket");
                ctx.resumed_session = Some(sess);
                ctx.resume = true;
                // This ticket is still good, don't issue another.
                ctx.new_session_ticket = false;
            }
            None => {
                debug!("ClientHello: ticket is not usable");
            }
        }
    }

    fn parse_alpn(
        &mut self,
        cfg: &ServerConfig,
        ctx: &mut HandshakeCtx,
        body: &[u8],
        out: &mut Vec<OutFrag>,
    ) -> Result<(), Error> {
        if cfg.alpn_protocols.is_empty() {
            return Ok(());
        }

        // Min length is 2 (list_len) + 1 (name_len) + 1 (name).
        if body.len() < 4 {
            return Err(self.decode_error(out));
        }
        let mut r = Reader::init(body);
        let theirs = match ProtocolNameList::read(&mut r) {
            Some(l) if !r.any_left() && !l.0.is_empty() => l.to_vecs(),
            _ => {
                debug!("ClientHello: bad alpn extension");
                return Err(self.decode_error(out));
            }
        };
        let theirs = &theirs[..theirs.len().min(MAX_ALPN_PROTOCOLS)];

        // Use our order of preference.
        for ours in &cfg.alpn_protocols {
            if theirs.iter().any(|t| t == ours) {
                trace!("ALPN protocol is {:?}", crate::bs_debug::BsDebug(ours));
                ctx.alpn_chosen = Some(ours.clone());
                return Ok(());
            }
        }

        Err(fatal_alert(
            out,
            AlertDescription::NoApplicationProtocol,
            Error::NoApplicationProtocol,
        ))
    }
}

enum ReadU16 {
    Done(u16),
    /// Only the high byte was available.
    Partial(u8),
    /// Nothing was available.
    Starved,
}

//! Server flight writers.
//!
//! Each writer produces one handshake message as an output fragment and
//! feeds it into the transcript; the record layer owns framing and
//! protection.

#[cfg(feature = "logging")]
use crate::log::{debug, warn};

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use tls_core::msgs::base::Payload;
use tls_core::msgs::enums::{
    AlertDescription, ClientCertificateType, Compression, ContentType, HandshakeType,
    ProtocolVersion, SignatureAlgorithm,
};
use tls_core::msgs::handshake::{
    CertificateRequestPayload, DigitallySigned, HandshakeMessagePayload, HandshakePayload,
    NewSessionTicketPayload, Random, ServerExtension, ServerHelloPayload,
    SignatureAndHashAlgorithm,
};
use tls_core::msgs::{base::PayloadU16, codec::Codec};
use tls_core::Error;

use crate::backend::{KeySchedule, LABEL_SERVER_FINISHED};
use crate::config::ServerConfig;
use crate::conn::{emit_handshake, fatal_alert, session_id_from, HandshakeCtx, OutFrag};
use crate::hash_hs;
use crate::kx::{DhmContext, EcdhContext, KxContext};
use crate::select::common_curve;
use crate::ticket::SessionState;

fn unix_time() -> Result<u64, Error> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| Error::FailedToGetCurrentTime)
}

pub(crate) fn write_server_hello(
    ctx: &mut HandshakeCtx,
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    // Server random: 4 bytes of Unix time, then 28 random bytes.
    let now = unix_time()?;
    let mut random = [0u8; 32];
    random[..4].copy_from_slice(&(now as u32).to_be_bytes());
    crate::rand::fill_random(&mut random[4..])?;
    ctx.randbytes[32..].copy_from_slice(&random);
    ctx.session_start = now;

    if ctx.resume {
        // Echo the client's id to signal the ticket was accepted
        // (RFC 5077 3.4).
        ctx.session_id = ctx.client_session_id.clone();
    } else if ctx.new_session_ticket {
        // The ticket carries the state; an id would only bloat caches.
        ctx.session_id = Vec::new();
    } else {
        ctx.session_id = crate::rand::random_vec(32)?;
    }
    debug!(
        "ServerHello: {} session resumed, session id len {}",
        if ctx.resume { "a" } else { "no" },
        ctx.session_id.len()
    );

    let mut extensions = Vec::new();
    if ctx.secure_renegotiation {
        debug!("ServerHello: adding empty renegotiation_info extension");
        extensions.push(ServerExtension::make_empty_renegotiation_info());
    }
    if ctx.extended_ms {
        debug!("ServerHello: adding extended master secret extension");
        extensions.push(ServerExtension::ExtendedMasterSecretAck);
    }
    if ctx.new_session_ticket {
        debug!("ServerHello: adding session ticket extension");
        extensions.push(ServerExtension::SessionTicketAck);
    }
    if ctx.cli_exts {
        debug!("ServerHello: adding supported_point_formats extension");
        extensions.push(ServerExtension::ECPointFormats(
            tls_core::msgs::handshake::ECPointFormatList::supported(),
        ));
    }
    if let Some(proto) = &ctx.alpn_chosen {
        debug!("ServerHello: adding alpn extension");
        extensions.push(ServerExtension::make_alpn(proto));
    }

    let payload = ServerHelloPayload {
        legacy_version: ProtocolVersion::TLSv1_2,
        random: Random(random),
        session_id: session_id_from(&ctx.session_id),
        cipher_suite: ctx.suite().suite,
        compression_method: Compression::Null,
        extensions,
    };
    debug!("ServerHello: chosen ciphersuite {:?}", ctx.suite().suite);

    emit_handshake(
        ctx,
        out,
        HandshakeMessagePayload {
            typ: HandshakeType::ServerHello,
            payload: HandshakePayload::ServerHello(payload),
        },
    );
    Ok(())
}

pub(crate) fn write_certificate(
    ctx: &mut HandshakeCtx,
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    let chain = ctx
        .chosen_cert
        .as_ref()
        .ok_or(Error::NoSuitableCertificate)?
        .cert_chain
        .clone();

    emit_handshake(
        ctx,
        out,
        HandshakeMessagePayload {
            typ: HandshakeType::Certificate,
            payload: HandshakePayload::Certificate(chain),
        },
    );
    Ok(())
}

pub(crate) fn write_server_key_exchange(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    let suite = ctx.suite();

    // Key exchanges not involving ephemeral keys don't use this message.
    if !suite.kx.uses_ephemeral_keys() {
        debug!("no ServerKeyExchange for this key exchange");
        return Ok(());
    }

    // Part 1: the exchange parameters, which are also the signed bytes.
    let params = if suite.kx.uses_ec() {
        let skxg = match common_curve(cfg, ctx) {
            Some(skxg) => skxg,
            None => {
                warn!("no matching curve for ECDHE key exchange");
                return Err(fatal_alert(
                    out,
                    AlertDescription::HandshakeFailure,
                    Error::PeerIncompatibleError("no common ECDHE curve".into()),
                ));
            }
        };
        debug!("ECDHE curve: {:?}", skxg.name);
        let mut ecdh = EcdhContext::new(skxg);
        ecdh.point_format = ctx.point_format;
        let params = ecdh.make_params(&mut OsRng)?;
        ctx.kx = Some(KxContext::Ecdh(ecdh));
        params
    } else {
        let dhm_params = cfg
            .dhm_params
            .as_ref()
            .ok_or_else(|| Error::General("no DH parameters set".into()))?;
        let mut dhm = DhmContext::new(dhm_params);
        let params = dhm.make_params(&mut OsRng)?;
        ctx.kx = Some(KxContext::Dhm(dhm));
        params
    };

    // Part 2: sign client_random || server_random || params with the
    // negotiated hash, and tag the signature with the algorithm pair
    // (RFC 5246 7.4.1.4.1).
    let mut body = params.clone();
    if suite.uses_server_signature() {
        let sig_alg = suite.sign.expect("signing suite");
        let md_alg = ctx
            .sig_hash
            .find(sig_alg)
            .expect("hash availability checked during selection");
        debug!("picked hash {:?} for ServerKeyExchange signature", md_alg);

        let mut signed = Vec::with_capacity(64 + params.len());
        signed.extend_from_slice(&ctx.randbytes);
        signed.extend_from_slice(&params);
        let digest = hash_hs::hash(md_alg, &signed);

        let key = &ctx
            .chosen_cert
            .as_ref()
            .ok_or(Error::NoSuitableCertificate)?
            .key;
        let signature = key.sign(md_alg, &digest)?;

        DigitallySigned {
            alg: SignatureAndHashAlgorithm {
                hash: md_alg,
                sign: sig_alg,
            },
            signature: PayloadU16::new(signature),
        }
        .encode(&mut body);
    }

    emit_handshake(
        ctx,
        out,
        HandshakeMessagePayload {
            typ: HandshakeType::ServerKeyExchange,
            payload: HandshakePayload::ServerKeyExchange(Payload::new(body)),
        },
    );
    Ok(())
}

pub(crate) fn write_certificate_request(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    // The CA-name list is not serialised; clients choose by type.
    let mut sigalgs = Vec::new();
    for &hash in &cfg.allowed_hashes {
        sigalgs.push(SignatureAndHashAlgorithm {
            hash,
            sign: SignatureAlgorithm::RSA,
        });
        sigalgs.push(SignatureAndHashAlgorithm {
            hash,
            sign: SignatureAlgorithm::ECDSA,
        });
    }

    let payload = CertificateRequestPayload {
        certtypes: vec![
            ClientCertificateType::RSASign,
            ClientCertificateType::ECDSASign,
        ],
        sigalgs,
        canames: PayloadU16::empty(),
    };

    emit_handshake(
        ctx,
        out,
        HandshakeMessagePayload {
            typ: HandshakeType::CertificateRequest,
            payload: HandshakePayload::CertificateRequest(payload),
        },
    );
    Ok(())
}

pub(crate) fn write_server_hello_done(
    ctx: &mut HandshakeCtx,
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    debug!("sending ServerHelloDone");
    emit_handshake(
        ctx,
        out,
        HandshakeMessagePayload {
            typ: HandshakeType::ServerHelloDone,
            payload: HandshakePayload::ServerHelloDone,
        },
    );
    Ok(())
}

fn write_new_session_ticket(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    let sealer = cfg.ticketer.as_ref().expect("ticket requested");
    let sess = SessionState {
        suite: ctx.suite().suite,
        master: ctx.master,
        start: ctx.session_start,
        extended_ms: ctx.extended_ms,
    };

    // A sealing failure downgrades to an empty ticket, it does not kill
    // the handshake.
    let (lifetime, ticket) = match sealer.seal(&sess) {
        Some(blob) => (sealer.lifetime_hint(), blob),
        None => {
            debug!("cannot seal session ticket");
            (0, Vec::new())
        }
    };

    emit_handshake(
        ctx,
        out,
        HandshakeMessagePayload {
            typ: HandshakeType::NewSessionTicket,
            payload: HandshakePayload::NewSessionTicket(NewSessionTicketPayload::new(
                lifetime, ticket,
            )),
        },
    );
    ctx.new_session_ticket = false;
    Ok(())
}

/// The closing server flight: optional NewSessionTicket, then
/// ChangeCipherSpec and Finished.
pub(crate) fn write_finished_flight(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    backend: &mut dyn KeySchedule,
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    if ctx.new_session_ticket {
        write_new_session_ticket(cfg, ctx, out)?;
    }

    // ChangeCipherSpec is not a handshake message and stays out of the
    // transcript.
    out.push(OutFrag {
        typ: ContentType::ChangeCipherSpec,
        payload: vec![0x01],
    });

    let verify_data = backend.verify_data(
        ctx.suite(),
        &ctx.master,
        LABEL_SERVER_FINISHED,
        &ctx.transcript.current_hash(),
    );
    emit_handshake(
        ctx,
        out,
        HandshakeMessagePayload {
            typ: HandshakeType::Finished,
            payload: HandshakePayload::Finished(Payload::new(verify_data.to_vec())),
        },
    );
    Ok(())
}

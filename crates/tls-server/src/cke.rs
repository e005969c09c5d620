//! Second client flight: Certificate, ClientKeyExchange and
//! CertificateVerify.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};

use tls_core::msgs::codec::Reader;
use tls_core::msgs::enums::{
    AlertDescription, HandshakeType, HashAlgorithm, KeyExchangeAlgorithm, SignatureAlgorithm,
};
use tls_core::msgs::handshake::CertificatePayload;
use tls_core::Error;
use zeroize::Zeroize;

use crate::backend::KeySchedule;
use crate::config::ServerConfig;
use crate::conn::{fatal_alert, HandshakeCtx, OutFrag};
use crate::kx::KxContext;
use crate::RSA_PREMASTER_LEN;

pub(crate) fn parse_client_certificate(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    body: &[u8],
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    let mut r = Reader::init(body);
    let chain = match <CertificatePayload as tls_core::msgs::codec::Codec>::read(&mut r) {
        Some(c) if !r.any_left() => c,
        _ => {
            return Err(fatal_alert(
                out,
                AlertDescription::DecodeError,
                Error::BadHandshakeMessage(HandshakeType::Certificate),
            ))
        }
    };

    if chain.is_empty() {
        // An empty chain declines client auth; CertificateVerify is then
        // skipped.
        debug!("client sent no certificate");
        return Ok(());
    }

    let verifier = cfg
        .client_cert_verifier
        .as_ref()
        .ok_or_else(|| Error::General("client certificate without verifier".into()))?;
    let peer = verifier.verify_chain(&chain).map_err(|e| {
        fatal_alert(out, AlertDescription::BadCertificate, e)
    })?;
    ctx.peer_cert = Some(peer);
    Ok(())
}

/// Static-RSA premaster decryption with the Bleichenbacher
/// countermeasure: bad padding must be indistinguishable, in both timing
/// and behaviour, from a good decryption. The failure only surfaces when
/// the Finished MAC mismatches.
fn parse_encrypted_premaster(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    body: &[u8],
) -> Result<Vec<u8>, Error> {
    let key = &ctx
        .chosen_cert
        .as_ref()
        .ok_or(Error::NoSuitableCertificate)?
        .key;
    if !key.can_do(SignatureAlgorithm::RSA) {
        return Err(Error::General("got no RSA private key".into()));
    }

    let len = key.key_len();
    if body.len() != 2 + len
        || body[0] != ((len >> 8) & 0xff) as u8
        || body[1] != (len & 0xff) as u8
    {
        debug!("bad client key exchange message");
        return Err(Error::BadHandshakeMessage(HandshakeType::ClientKeyExchange));
    }

    let ver = [3u8, cfg.max_minor_version];

    let mut fake_pms = [0u8; RSA_PREMASTER_LEN];
    crate::rand::fill_random(&mut fake_pms)?;

    let mut peer_pms = [0u8; RSA_PREMASTER_LEN];
    let decrypt_result = key.decrypt(&body[2..], &mut peer_pms);

    let mut diff: u32 = decrypt_result.is_err() as u32;
    let peer_len = decrypt_result.unwrap_or(0);
    diff |= (peer_len ^ RSA_PREMASTER_LEN) as u32;
    diff |= (peer_pms[0] ^ ver[0]) as u32;
    diff |= (peer_pms[1] ^ ver[1]) as u32;
    trace!("client key exchange message diff={:#x}", diff);

    // mask = diff ? 0xff : 0x00 using only bit operations.
    let mask = (((diff | diff.wrapping_neg()) >> 31) as u8).wrapping_neg();
    let mut pms = vec![0u8; RSA_PREMASTER_LEN];
    for i in 0..RSA_PREMASTER_LEN {
        pms[i] = (mask & fake_pms[i]) | (!mask & peer_pms[i]);
    }

    fake_pms.zeroize();
    peer_pms.zeroize();
    Ok(pms)
}

pub(crate) fn parse_client_key_exchange(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    backend: &mut dyn KeySchedule,
    body: &[u8],
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    let suite = ctx.suite();

    let mut premaster = match suite.kx {
        KeyExchangeAlgorithm::ECDHE => {
            let Some(KxContext::Ecdh(ecdh)) = ctx.kx.as_mut() else {
                return Err(Error::General("missing ECDH context".into()));
            };
            ecdh.read_public(body).map_err(|e| {
                debug!("cannot read ecdh public: {e}");
                fatal_alert(
                    out,
                    AlertDescription::DecodeError,
                    Error::BadHandshakeMessage(HandshakeType::ClientKeyExchange),
                )
            })?;
            let z = ecdh
                .calc_secret(&mut rand::rngs::OsRng)
                .map_err(|e| {
                    debug!("cannot compute ecdh secret: {e}");
                    fatal_alert(
                        out,
                        AlertDescription::IllegalParameter,
                        Error::BadHandshakeMessage(HandshakeType::ClientKeyExchange),
                    )
                })?;
            trace!("ECDH premaster of {} bytes", z.len());
            z
        }
        KeyExchangeAlgorithm::DHE => {
            let Some(KxContext::Dhm(dhm)) = ctx.kx.as_mut() else {
                return Err(Error::General("missing DHM context".into()));
            };
            dhm.read_public(body).map_err(|e| {
                debug!("cannot read dh public: {e}");
                fatal_alert(
                    out,
                    AlertDescription::DecodeError,
                    Error::BadHandshakeMessage(HandshakeType::ClientKeyExchange),
                )
            })?;
            dhm.calc_secret().map_err(|e| {
                debug!("cannot compute dh secret: {e}");
                fatal_alert(
                    out,
                    AlertDescription::IllegalParameter,
                    Error::BadHandshakeMessage(HandshakeType::ClientKeyExchange),
                )
            })?
        }
        KeyExchangeAlgorithm::RSA => parse_encrypted_premaster(cfg, ctx, body)?,
    };

    // Master secret and key block; with the extended master secret the
    // seed is the session hash including this very message (RFC 7627).
    let ems = ctx.extended_ms;
    let master = if ems {
        let session_hash = ctx.transcript.current_hash();
        backend.master_secret(suite, &premaster, true, &session_hash)
    } else {
        backend.master_secret(suite, &premaster, false, &ctx.randbytes)
    };
    premaster.zeroize();
    ctx.master = master;

    backend.derive_keys(suite, &ctx.master, &ctx.randbytes)?;
    ctx.kx = None;
    Ok(())
}

pub(crate) fn parse_certificate_verify(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    body: &[u8],
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    let bad = |out: &mut Vec<OutFrag>| {
        fatal_alert(
            out,
            AlertDescription::DecodeError,
            Error::BadHandshakeMessage(HandshakeType::CertificateVerify),
        )
    };

    let peer = ctx
        .peer_cert
        .as_ref()
        .ok_or_else(|| Error::General("certificate verify without peer cert".into()))?;

    //  struct {
    //      SignatureAndHashAlgorithm algorithm;
    //      opaque signature<0..2^16-1>;
    //  } DigitallySigned;
    if body.len() < 4 {
        debug!("bad certificate verify message");
        return Err(bad(out));
    }

    let md_alg = HashAlgorithm::from(body[0]);
    if !cfg.allowed_hashes.contains(&md_alg) {
        debug!("peer not adhering to requested sig_alg for verify message");
        return Err(bad(out));
    }

    let sig_alg = SignatureAlgorithm::from(body[1]);
    if !matches!(sig_alg, SignatureAlgorithm::RSA | SignatureAlgorithm::ECDSA) {
        debug!("unknown signature algorithm in verify message");
        return Err(bad(out));
    }
    if !peer.key.can_do(sig_alg) {
        debug!("sig_alg doesn't match client certificate key");
        return Err(bad(out));
    }

    let sig_len = ((body[2] as usize) << 8) | body[3] as usize;
    if 4 + sig_len != body.len() {
        debug!("bad certificate verify message length");
        return Err(bad(out));
    }

    // The digest covers the transcript before this message.
    let digest = ctx
        .transcript
        .hash_with(md_alg)
        .ok_or_else(|| Error::General("transcript unavailable for verify digest".into()))?;

    peer.key
        .verify(md_alg, &digest, &body[4..])
        .map_err(|e| {
            debug!("cannot verify client signature: {e}");
            fatal_alert(out, AlertDescription::DecryptError, e)
        })
}

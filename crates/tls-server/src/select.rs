//! Post-ClientHello negotiation: signature-hash intersection, ciphersuite
//! choice and certificate selection. The server's preference order wins.

#[cfg(feature = "logging")]
use crate::log::{debug, warn};

use std::sync::Arc;

use tls_core::msgs::enums::{
    AlertDescription, HandshakeType, HashAlgorithm, KeyExchangeAlgorithm, SignatureAlgorithm,
};
use tls_core::suites::Tls12CipherSuite;
use tls_core::Error;

use crate::config::ServerConfig;
use crate::conn::{fatal_alert, HandshakeCtx, OutFrag};
use crate::kx::SupportedKxGroup;
use crate::sign::CertifiedKey;

/// One suitable hash per signature algorithm is all the ServerKeyExchange
/// signature needs; the first client-offered hash we also allow wins.
#[derive(Default)]
pub(crate) struct SigHashSet {
    rsa: Option<HashAlgorithm>,
    ecdsa: Option<HashAlgorithm>,
}

impl SigHashSet {
    pub(crate) fn add(&mut self, sig: SignatureAlgorithm, hash: HashAlgorithm) {
        let slot = match sig {
            SignatureAlgorithm::RSA => &mut self.rsa,
            SignatureAlgorithm::ECDSA => &mut self.ecdsa,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(hash);
        }
    }

    pub(crate) fn find(&self, sig: SignatureAlgorithm) -> Option<HashAlgorithm> {
        match sig {
            SignatureAlgorithm::RSA => self.rsa,
            SignatureAlgorithm::ECDSA => self.ecdsa,
            _ => None,
        }
    }
}

/// Final checks and setups once the ClientHello is fully parsed.
pub(crate) fn finish_client_hello(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    // Certificates are stored per vhost, so some vhost must be bound by
    // now; fall back to the resolver's default when SNI was absent.
    if ctx.vhost.is_none() {
        ctx.vhost = cfg.cert_resolver.resolve(None);
        if ctx.vhost.is_none() {
            warn!("no vhost for this connection");
            return Err(Error::BadHandshakeMessage(HandshakeType::ClientHello));
        }
    }

    // Without the signature_algorithms extension, RFC 5246 7.4.1.4.1
    // implies SHA-1 with the key's signature algorithm.
    if !ctx.sig_algs_ext && cfg.allowed_hashes.contains(&HashAlgorithm::SHA1) {
        ctx.sig_hash.add(SignatureAlgorithm::RSA, HashAlgorithm::SHA1);
        ctx.sig_hash.add(SignatureAlgorithm::ECDSA, HashAlgorithm::SHA1);
    }

    choose_ciphersuite(cfg, ctx, out)
}

/// First curve in our preference list the client also offered.
pub(crate) fn common_curve(
    cfg: &ServerConfig,
    ctx: &HandshakeCtx,
) -> Option<&'static SupportedKxGroup> {
    cfg.kx_groups
        .iter()
        .find(|skxg| ctx.curves.iter().any(|ci| ci.tls_id == skxg.name.get_u16()))
        .copied()
}

/// Try picking a certificate for this ciphersuite.
fn pick_cert(ctx: &mut HandshakeCtx, suite: &'static Tls12CipherSuite) -> bool {
    let Some(pk_alg) = suite.sig_alg() else {
        return true;
    };
    debug!("ciphersuite requires certificate");

    let vhost = ctx.vhost.as_ref().expect("vhost bound");
    if vhost.certs.is_empty() {
        debug!("server has no certificate");
        return false;
    }

    let mut winner: Option<Arc<CertifiedKey>> = None;
    for ck in &vhost.certs {
        if !ck.key.can_do(pk_alg) {
            debug!("certificate mismatch for alg {:?}", pk_alg);
            continue;
        }
        // Avoid offering an ECDSA certificate on a curve the client did
        // not advertise.
        if pk_alg == SignatureAlgorithm::ECDSA {
            if let Some(curve) = ck.key.curve() {
                if !ctx.curves.iter().any(|ci| ci.grp_id == curve) {
                    debug!("certificate mismatch: elliptic curve");
                    continue;
                }
            }
        }
        winner = Some(ck.clone());
        break;
    }

    match winner {
        Some(ck) => {
            ctx.chosen_cert = Some(ck);
            true
        }
        None => false,
    }
}

/// Check if a given ciphersuite is usable with our config/keys/etc.
fn ciphersuite_match(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    suite: &'static Tls12CipherSuite,
) -> bool {
    debug!("trying ciphersuite: {:?}", suite.suite);

    if suite.kx.uses_ec() && common_curve(cfg, ctx).is_none() {
        debug!("ciphersuite mismatch: no common elliptic curve");
        return false;
    }
    if suite.kx == KeyExchangeAlgorithm::DHE && cfg.dhm_params.is_none() {
        debug!("ciphersuite mismatch: no DH parameters configured");
        return false;
    }
    // If the ciphersuite signs its key exchange, a suitable hash must
    // have survived the intersection.
    if suite.uses_server_signature() {
        let sig = suite.sign.expect("signing suite");
        if ctx.sig_hash.find(sig).is_none() {
            debug!(
                "ciphersuite mismatch: no suitable hash for signature algorithm {:?}",
                sig
            );
            return false;
        }
    }
    // Last: certificate selection, since it commits the key choice.
    if !pick_cert(ctx, suite) {
        debug!("ciphersuite mismatch: no suitable certificate");
        return false;
    }
    true
}

fn choose_ciphersuite(
    cfg: &ServerConfig,
    ctx: &mut HandshakeCtx,
    out: &mut Vec<OutFrag>,
) -> Result<(), Error> {
    // A restored session pins the suite; it has to still be offered and
    // known, and the extended-master-secret use must match the current
    // offer (RFC 7627 5.3). Otherwise fall back to a full handshake.
    if ctx.resume {
        let sess = ctx.resumed_session.as_ref().expect("resume set");
        let sess_suite = sess.suite;
        let ems_consistent = sess.extended_ms == ctx.extended_ms;
        match tls_core::suites::lookup_suite(sess_suite) {
            Some(suite) if ctx.css.contains(&sess_suite.get_u16()) && ems_consistent => {
                debug!("resuming with ciphersuite {:?}", suite.suite);
                ctx.suite = Some(suite);
                return Ok(());
            }
            _ => {
                debug!("restored session no longer usable, full handshake");
                ctx.resume = false;
                ctx.resumed_session = None;
                ctx.new_session_ticket = cfg.ticketer.is_some();
            }
        }
    }

    let mut got_common_suite = false;
    for &suite in &cfg.cipher_suites {
        if !ctx.css.contains(&suite.suite.get_u16()) {
            continue;
        }
        got_common_suite = true;
        if ciphersuite_match(cfg, ctx, suite) {
            debug!("selected ciphersuite: {:?}", suite.suite);
            ctx.suite = Some(suite);
            return Ok(());
        }
    }

    if got_common_suite {
        warn!("none of the common ciphersuites is usable");
    } else {
        warn!("got no ciphersuites in common");
    }
    Err(fatal_alert(
        out,
        AlertDescription::HandshakeFailure,
        Error::PeerIncompatibleError("no usable ciphersuite in common".into()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sig_hash_set_keeps_first() {
        let mut set = SigHashSet::default();
        set.add(SignatureAlgorithm::RSA, HashAlgorithm::SHA384);
        set.add(SignatureAlgorithm::RSA, HashAlgorithm::SHA1);
        set.add(SignatureAlgorithm::ECDSA, HashAlgorithm::SHA256);
        assert_eq!(set.find(SignatureAlgorithm::RSA), Some(HashAlgorithm::SHA384));
        assert_eq!(set.find(SignatureAlgorithm::ECDSA), Some(HashAlgorithm::SHA256));
        assert_eq!(set.find(SignatureAlgorithm::DSA), None);
    }
}

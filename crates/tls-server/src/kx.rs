//! Key-exchange contexts: ephemeral ECDH and finite-field DH.

use std::cmp::Ordering;
use std::sync::Arc;

use rand::RngCore;
use tls_core::msgs::base::PayloadU16;
use tls_core::msgs::codec::Codec;
use tls_core::msgs::enums::{ECPointFormat, NamedGroup};
use tls_core::msgs::handshake::{ServerDHParams, ServerECDHParams};
use tls_core::suites::decode_kx_params;
use tls_core::Error;
use tls_ecp::{Group, GroupId, Point};
use tls_mpi::{ExpModScratch, Mpi};
use zeroize::Zeroize;

/// A key-exchange group supported by this stack.
#[derive(Debug)]
pub struct SupportedKxGroup {
    /// The IANA "TLS Supported Groups" name of the group.
    pub name: NamedGroup,
    pub grp_id: GroupId,
}

/// Ephemeral ECDH on secp256r1 (aka NIST-P256).
pub static SECP256R1: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::secp256r1,
    grp_id: GroupId::Secp256r1,
};

/// Ephemeral ECDH on secp384r1 (aka NIST-P384).
pub static SECP384R1: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::secp384r1,
    grp_id: GroupId::Secp384r1,
};

/// Ephemeral ECDH on secp521r1.
pub static SECP521R1: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::secp521r1,
    grp_id: GroupId::Secp521r1,
};

/// Ephemeral ECDH on brainpoolP256r1.
pub static BP256R1: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::brainpoolP256r1,
    grp_id: GroupId::Bp256r1,
};

/// Ephemeral ECDH on brainpoolP384r1.
pub static BP384R1: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::brainpoolP384r1,
    grp_id: GroupId::Bp384r1,
};

/// Ephemeral ECDH on brainpoolP512r1.
pub static BP512R1: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::brainpoolP512r1,
    grp_id: GroupId::Bp512r1,
};

/// Ephemeral ECDH on curve25519 (see RFC 7748).
pub static X25519: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::X25519,
    grp_id: GroupId::Curve25519,
};

/// All the key exchange groups supported by this stack, preference order.
pub static ALL_KX_GROUPS: &[&SupportedKxGroup] = &[
    &SECP256R1,
    &X25519,
    &SECP521R1,
    &BP512R1,
    &SECP384R1,
    &BP384R1,
    &BP256R1,
];

/// An in-progress ECDH exchange: the group, our ephemeral key pair, and
/// once ClientKeyExchange arrives, the peer's point.
pub struct EcdhContext {
    grp: Arc<Group>,
    named_group: NamedGroup,
    d: Mpi,
    qp: Option<Point>,
    pub point_format: ECPointFormat,
}

impl EcdhContext {
    pub fn new(skxg: &SupportedKxGroup) -> Self {
        Self {
            grp: Group::from_id(skxg.grp_id),
            named_group: skxg.name,
            d: Mpi::new(),
            qp: None,
            point_format: ECPointFormat::Uncompressed,
        }
    }

    pub fn group(&self) -> &Arc<Group> {
        &self.grp
    }

    /// Generate the ephemeral key pair and encode the
    /// `ServerECDHParams` (ECParameters + ECPoint).
    pub fn make_params(&mut self, rng: &mut dyn RngCore) -> Result<Vec<u8>, Error> {
        let kp = self
            .grp
            .gen_keypair(rng)
            .map_err(|_| Error::FailedToGetRandomBytes)?;
        let point = self
            .grp
            .write_point(&kp.q)
            .map_err(|e| Error::General(format!("cannot encode ECDH point: {e}")))?;
        self.d = kp.d.clone();

        Ok(ServerECDHParams::new(self.named_group, &point).get_encoding())
    }

    /// Read the client's ECPoint from a ClientKeyExchange body and check
    /// it against the group.
    pub fn read_public(&mut self, body: &[u8]) -> Result<(), Error> {
        let params: tls_core::msgs::handshake::ClientECDHParams = decode_kx_params(body)
            .ok_or(Error::BadHandshakeMessage(
                tls_core::msgs::enums::HandshakeType::ClientKeyExchange,
            ))?;
        let pt = self
            .grp
            .read_point(&params.public.0)
            .map_err(|_| Error::PeerMisbehavedError("unparsable ECDH public point".into()))?;
        self.grp
            .check_pubkey(&pt)
            .map_err(|_| Error::PeerMisbehavedError("invalid ECDH public point".into()))?;
        self.qp = Some(pt);
        Ok(())
    }

    /// Compute the shared secret `z = (d * Qp).x` and return the
    /// premaster encoding: fixed-width big-endian for Weierstrass groups,
    /// 32-byte little-endian for x25519.
    pub fn calc_secret(&mut self, rng: &mut dyn RngCore) -> Result<Vec<u8>, Error> {
        let qp = self
            .qp
            .as_ref()
            .ok_or_else(|| Error::General("ECDH peer point missing".into()))?;
        let shared = self
            .grp
            .mul(&self.d, qp, Some(rng))
            .map_err(|_| Error::PeerMisbehavedError("ECDH computation failed".into()))?;

        let mut out = if self.grp.id() == GroupId::Curve25519 {
            let mut buf = vec![0u8; 32];
            shared
                .x()
                .write_binary(&mut buf)
                .map_err(|_| Error::General("shared secret too large".into()))?;
            buf.reverse();
            buf
        } else {
            let mut buf = vec![0u8; self.grp.p_len()];
            shared
                .x()
                .write_binary(&mut buf)
                .map_err(|_| Error::General("shared secret too large".into()))?;
            buf
        };

        // An all-zero x25519 shared secret means a low-order peer point.
        if out.iter().all(|&b| b == 0) {
            out.zeroize();
            return Err(Error::PeerMisbehavedError("degenerate shared secret".into()));
        }
        Ok(out)
    }
}

impl Drop for EcdhContext {
    fn drop(&mut self) {
        self.d.clear();
    }
}

/// Finite-field Diffie-Hellman parameters `(P, G)`.
#[derive(Clone)]
pub struct DhmParams {
    pub p: Mpi,
    pub g: Mpi,
}

impl DhmParams {
    /// The 2048-bit MODP group of RFC 3526.
    pub fn modp2048() -> Self {
        const P: &str = "\
            ffffffffffffffffc90fdaa22168c234c4c6628b80dc1cd129024e088a67cc74\
            020bbea63b139b22514a08798e3404ddef9519b3cd3a431b302b0a6df25f1437\
            4fe1356d6d51c245e485b576625e7ec6f44c42e9a637ed6b0bff5cb6f406b7ed\
            ee386bfb5a899fa5ae9f24117c4b1fe649286651ece45b3dc2007cb8a163bf05\
            98da48361c55d39a69163fa8fd24cf5f83655d23dca3ad961c62f356208552bb\
            9ed529077096966d670c354e4abc9804f1746c08ca18217c32905e462e36ce3b\
            e39e772c180e86039b2783a2ec07a28fb5c55df06f4c52c9de2bcbf695581718\
            3995497cea956ae515d2261898fa051015728e5a8aacaa68ffffffffffffffff";
        let bytes: Vec<u8> = P
            .as_bytes()
            .chunks(2)
            .map(|c| u8::from_str_radix(std::str::from_utf8(c).unwrap(), 16).unwrap())
            .collect();
        Self {
            p: Mpi::from_binary(&bytes).expect("constant fits"),
            g: Mpi::from_int(2),
        }
    }
}

/// An in-progress DHE exchange.
pub struct DhmContext {
    p: Mpi,
    g: Mpi,
    x: Mpi,
    gx: Mpi,
    gy: Mpi,
    rr: Mpi,
    scratch: ExpModScratch,
}

impl DhmContext {
    pub fn new(params: &DhmParams) -> Self {
        Self {
            p: params.p.clone(),
            g: params.g.clone(),
            x: Mpi::new(),
            gx: Mpi::new(),
            gy: Mpi::new(),
            rr: Mpi::new(),
            scratch: ExpModScratch::new(),
        }
    }

    /// `Y` must lie in `[2, P - 2]`; degenerate publics would fix the
    /// shared secret.
    fn check_range(&self, y: &Mpi) -> Result<(), Error> {
        let upper = self.p.sub_int(2);
        if y.cmp_int(2) == Ordering::Less || y.cmp(&upper) == Ordering::Greater {
            return Err(Error::PeerMisbehavedError("DH public out of range".into()));
        }
        Ok(())
    }

    /// Generate the ephemeral secret and encode `ServerDHParams`
    /// (P, G, Ys).
    pub fn make_params(&mut self, rng: &mut dyn RngCore) -> Result<Vec<u8>, Error> {
        let x_size = self.p.byte_len();
        let mut count = 0;
        loop {
            self.x
                .fill_random(x_size, rng)
                .map_err(|_| Error::FailedToGetRandomBytes)?;
            while self.x.cmp(&self.p) != Ordering::Less {
                self.x.shift_right(1);
            }
            count += 1;
            if count > 10 {
                return Err(Error::FailedToGetRandomBytes);
            }
            if self.check_range(&self.x).is_ok() {
                break;
            }
        }

        self.gx = self
            .g
            .exp_mod(&self.x, &self.p, &mut self.rr, &mut self.scratch)
            .map_err(|e| Error::General(format!("DH exponentiation failed: {e}")))?;

        let params = ServerDHParams {
            dh_p: PayloadU16::new(self.p.to_binary()),
            dh_g: PayloadU16::new(self.g.to_binary()),
            dh_ys: PayloadU16::new(self.gx.to_binary()),
        };
        Ok(params.get_encoding())
    }

    /// Read the client's `Yc` from a ClientKeyExchange body.
    pub fn read_public(&mut self, body: &[u8]) -> Result<(), Error> {
        let params: tls_core::msgs::handshake::ClientDHParams = decode_kx_params(body)
            .ok_or(Error::BadHandshakeMessage(
                tls_core::msgs::enums::HandshakeType::ClientKeyExchange,
            ))?;
        let gy = Mpi::from_binary(&params.public.0)
            .map_err(|_| Error::PeerMisbehavedError("oversized DH public".into()))?;
        self.check_range(&gy)?;
        self.gy = gy;
        Ok(())
    }

    /// `K = Yc^x mod P`, leading zeros stripped (RFC 5246 8.1.2).
    pub fn calc_secret(&mut self) -> Result<Vec<u8>, Error> {
        self.check_range(&self.gy)?;
        let k = self
            .gy
            .exp_mod(&self.x, &self.p, &mut self.rr, &mut self.scratch)
            .map_err(|e| Error::General(format!("DH exponentiation failed: {e}")))?;
        let out = k.to_binary();
        Ok(out)
    }

    /// Encoded size of P, for flight-size accounting.
    pub fn modulus_len(&self) -> usize {
        self.p.byte_len()
    }
}

impl Drop for DhmContext {
    fn drop(&mut self) {
        self.x.clear();
    }
}

/// Either key-exchange context.
pub enum KxContext {
    Ecdh(EcdhContext),
    Dhm(DhmContext),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn rng() -> StepRng {
        StepRng::new(0x1111_2222_3333_4444, 0x9e37_79b9_7f4a_7c15)
    }

    #[test]
    fn ecdh_roundtrip_p256() {
        let mut server = EcdhContext::new(&SECP256R1);
        let params = server.make_params(&mut rng()).unwrap();
        // ECParameters: named curve (3), secp256r1 (0, 23), point length.
        assert_eq!(&params[..3], &[3, 0, 23]);
        assert_eq!(params[3] as usize, params.len() - 4);

        // Act as the client: generate a key pair, feed our point in.
        let grp = Group::from_id(GroupId::Secp256r1);
        let client = grp.gen_keypair(&mut StepRng::new(7, 0x5555)).unwrap();
        let client_point = grp.tls_write_point(&client.q).unwrap();
        server.read_public(&client_point).unwrap();
        let z_server = server.calc_secret(&mut rng()).unwrap();
        assert_eq!(z_server.len(), 32);

        // Client side of the same agreement.
        let server_pub = grp.read_point(&params[4..]).unwrap();
        let shared = grp.mul(&client.d, &server_pub, None).unwrap();
        let mut z_client = vec![0u8; 32];
        shared.x().write_binary(&mut z_client).unwrap();
        assert_eq!(z_server, z_client);
    }

    #[test]
    fn ecdh_rejects_bad_point() {
        let mut server = EcdhContext::new(&SECP256R1);
        server.make_params(&mut rng()).unwrap();
        // A point not on the curve.
        let mut bad = vec![65u8, 0x04];
        bad.extend_from_slice(&[1u8; 64]);
        assert!(server.read_public(&bad).is_err());
    }

    #[test]
    fn dhm_roundtrip() {
        let params = DhmParams::modp2048();
        assert_eq!(params.p.byte_len(), 256);

        let mut server = DhmContext::new(&params);
        let encoded = server.make_params(&mut rng()).unwrap();
        let decoded: ServerDHParams = decode_kx_params(&encoded).unwrap();
        assert_eq!(decoded.dh_p.0.len(), 256);

        // Client leg.
        let mut scratch = ExpModScratch::new();
        let mut rr = Mpi::new();
        let y = Mpi::from_int(0x1234_5679);
        let gy = params
            .g
            .exp_mod(&y, &params.p, &mut rr, &mut scratch)
            .unwrap();
        let mut cke = Vec::new();
        PayloadU16::new(gy.to_binary()).encode(&mut cke);
        server.read_public(&cke).unwrap();

        let k_server = server.calc_secret().unwrap();
        let gx = Mpi::from_binary(&decoded.dh_ys.0).unwrap();
        let k_client = gx.exp_mod(&y, &params.p, &mut rr, &mut scratch).unwrap();
        assert_eq!(k_server, k_client.to_binary());
    }

    #[test]
    fn dhm_rejects_degenerate_publics() {
        let params = DhmParams::modp2048();
        let mut server = DhmContext::new(&params);
        server.make_params(&mut rng()).unwrap();

        for bad in [Mpi::from_int(0), Mpi::from_int(1), params.p.sub_int(1)] {
            let mut cke = Vec::new();
            PayloadU16::new(bad.to_binary()).encode(&mut cke);
            assert!(server.read_public(&cke).is_err());
        }
    }
}

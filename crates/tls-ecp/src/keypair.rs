//! Key validity checks and key-pair generation.

use std::cmp::Ordering;

use rand::RngCore;
use tls_mpi::Mpi;
use zeroize::Zeroize;

use crate::{CurveKind, EcpError, Group, Point, Result};

/// A generic curve key pair, usable for ECDSA or ECDH.
pub struct Keypair {
    pub d: Mpi,
    pub q: Point,
}

impl Zeroize for Keypair {
    fn zeroize(&mut self) {
        self.d.clear();
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl Group {
    /// Check that `pt` is a usable public key: not the point at infinity,
    /// coordinates inside the field, and on the curve.
    ///
    /// Subgroup membership is not verified; the supported Weierstrass
    /// groups all have cofactor 1, where the curve equation is enough.
    pub fn check_pubkey(&self, pt: &Point) -> Result<()> {
        if pt.is_zero() {
            return Err(EcpError::InvalidKey);
        }
        match self.kind {
            CurveKind::Montgomery => {
                // Only the u-coordinate exists; range is all we can check.
                if pt.x.cmp_int(0) == Ordering::Less || pt.x.cmp(&self.p) != Ordering::Less {
                    return Err(EcpError::InvalidKey);
                }
                Ok(())
            }
            CurveKind::ShortWeierstrass => {
                if pt.z.cmp_int(1) != Ordering::Equal {
                    return Err(EcpError::InvalidKey);
                }
                for c in [&pt.x, &pt.y] {
                    if c.cmp_int(0) == Ordering::Less || c.cmp(&self.p) != Ordering::Less {
                        return Err(EcpError::InvalidKey);
                    }
                }
                // y^2 == x^3 + A x + B
                let lhs = self.mod_sqr(&pt.y);
                let rhs = self.mod_add(
                    &self.mod_mul(&self.mod_add(&self.mod_sqr(&pt.x), &self.a), &pt.x),
                    &self.b,
                );
                if lhs != rhs {
                    return Err(EcpError::InvalidKey);
                }
                Ok(())
            }
        }
    }

    /// Check that `d` is a usable private key: `[1, N-1]` for short
    /// Weierstrass groups, a properly clamped scalar for Curve25519.
    pub fn check_privkey(&self, d: &Mpi) -> Result<()> {
        match self.kind {
            CurveKind::ShortWeierstrass => {
                if d.cmp_int(1) == Ordering::Less || d.cmp(&self.n) != Ordering::Less {
                    return Err(EcpError::InvalidKey);
                }
                Ok(())
            }
            CurveKind::Montgomery => {
                if d.get_bit(0) != 0
                    || d.get_bit(1) != 0
                    || d.get_bit(2) != 0
                    || d.bit_len() != self.nbits + 1
                {
                    return Err(EcpError::InvalidKey);
                }
                Ok(())
            }
        }
    }

    /// Apply the Curve25519 bit-fixing mask to a freshly drawn scalar:
    /// clear the three low bits, drop everything above bit `nbits`, and
    /// pin bit `nbits` itself.
    pub fn clamp_scalar(&self, d: &mut Mpi) {
        debug_assert_eq!(self.kind, CurveKind::Montgomery);
        d.set_bit(0, 0);
        d.set_bit(1, 0);
        d.set_bit(2, 0);
        d.truncate_bits(self.nbits + 1);
        d.set_bit(self.nbits, 1);
    }

    /// Draw a private scalar: uniform in `[1, N-1]` by rejection for short
    /// Weierstrass groups, clamped random bits for Curve25519.
    pub fn gen_privkey(&self, rng: &mut dyn RngCore) -> Result<Mpi> {
        let n_size = (self.nbits + 7) / 8;
        let mut d = Mpi::new();

        match self.kind {
            CurveKind::Montgomery => {
                d.fill_random(n_size, rng).map_err(|_| EcpError::RandomFailed)?;
                // The spare top bits are irrelevant once clamped.
                self.clamp_scalar(&mut d);
                Ok(d)
            }
            CurveKind::ShortWeierstrass => {
                let mut count = 0;
                loop {
                    d.fill_random(n_size, rng).map_err(|_| EcpError::RandomFailed)?;
                    if d.bit_len() > self.nbits {
                        let excess = d.bit_len() - self.nbits;
                        d.shift_right(excess);
                    }
                    count += 1;
                    if count > 30 {
                        return Err(EcpError::RandomFailed);
                    }
                    if d.cmp_int(1) != Ordering::Less && d.cmp(&self.n) == Ordering::Less {
                        return Ok(d);
                    }
                }
            }
        }
    }

    /// Generate a key pair with a constant-time, blinded scalar
    /// multiplication of the generator.
    pub fn gen_keypair(&self, rng: &mut dyn RngCore) -> Result<Keypair> {
        let d = self.gen_privkey(rng)?;
        let q = self.mul(&d, &self.g, Some(rng))?;
        Ok(Keypair { d, q })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GroupId;
    use rand::rngs::mock::StepRng;

    fn rng() -> StepRng {
        StepRng::new(0x0123_4567_89ab_cdef, 0x9e37_79b9_7f4a_7c15)
    }

    #[test]
    fn generated_keys_validate() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let kp = grp.gen_keypair(&mut rng()).unwrap();
        assert!(grp.check_privkey(&kp.d).is_ok());
        assert!(grp.check_pubkey(&kp.q).is_ok());
    }

    #[test]
    fn privkey_bounds() {
        let grp = Group::from_id(GroupId::Secp256r1);
        assert!(grp.check_privkey(&Mpi::from_int(0)).is_err());
        assert!(grp.check_privkey(&Mpi::from_int(1)).is_ok());
        assert!(grp.check_privkey(&grp.n).is_err());
        assert!(grp.check_privkey(&grp.n.sub_int(1)).is_ok());
    }

    #[test]
    fn pubkey_rejects_off_curve() {
        let grp = Group::from_id(GroupId::Secp256r1);
        assert!(grp.check_pubkey(&Point::zero()).is_err());

        let mut pt = grp.generator().clone();
        pt.x = pt.x.add_int(1);
        assert_eq!(grp.check_pubkey(&pt), Err(EcpError::InvalidKey));

        let mut oor = grp.generator().clone();
        oor.x = grp.p.add_int(1);
        assert!(grp.check_pubkey(&oor).is_err());
    }

    #[test]
    fn x25519_clamping() {
        let grp = Group::from_id(GroupId::Curve25519);
        let d = grp.gen_privkey(&mut rng()).unwrap();
        assert!(grp.check_privkey(&d).is_ok());
        assert_eq!(d.get_bit(0), 0);
        assert_eq!(d.get_bit(1), 0);
        assert_eq!(d.get_bit(2), 0);
        assert_eq!(d.get_bit(254), 1);
        assert_eq!(d.get_bit(255), 0);
    }

    #[test]
    fn x25519_keypair() {
        let grp = Group::from_id(GroupId::Curve25519);
        let kp = grp.gen_keypair(&mut rng()).unwrap();
        assert!(grp.check_pubkey(&kp.q).is_ok());
    }
}

//! Point and group wire encoding.
//!
//! Short Weierstrass points use the SEC 1 / RFC 8422 octet formats:
//! `0x00` alone for the point at infinity, `0x04 || X || Y` uncompressed,
//! `0x02/0x03 || X` compressed (accepted on decode only). Curve25519 uses
//! the raw 32-byte little-endian u-coordinate of RFC 7748. The TLS layer
//! wraps points in a one-byte length and groups in the 3-byte
//! named-curve `ECParameters`.

use std::cmp::Ordering;

use tls_mpi::Mpi;

use crate::{curve_info_from_grp_id, CurveKind, EcpError, Group, Point, Result};

/// Uncompressed point format tag.
pub const FORMAT_UNCOMPRESSED: u8 = 0x04;
/// The only ECCurveType allowed by RFC 8422 5.4.
pub const TLS_NAMED_CURVE: u8 = 0x03;

impl Group {
    /// Encode a point. `compressed` selection is not offered: everything
    /// we emit is uncompressed (or the x-only Montgomery form).
    pub fn write_point(&self, pt: &Point) -> Result<Vec<u8>> {
        if self.kind == CurveKind::Montgomery {
            let mut out = vec![0u8; 32];
            pt.x.write_binary(&mut out)?;
            out.reverse();
            return Ok(out);
        }

        if pt.is_zero() {
            return Ok(vec![0x00]);
        }

        let plen = self.p_len();
        let mut out = vec![0u8; 1 + 2 * plen];
        out[0] = FORMAT_UNCOMPRESSED;
        pt.x.write_binary(&mut out[1..1 + plen])?;
        pt.y.write_binary(&mut out[1 + plen..])?;
        Ok(out)
    }

    /// Decode a point. Does NOT check that the point lies on the curve;
    /// see [`Group::check_pubkey`].
    pub fn read_point(&self, buf: &[u8]) -> Result<Point> {
        if self.kind == CurveKind::Montgomery {
            if buf.len() != 32 {
                return Err(EcpError::BadInputData);
            }
            let mut le = buf.to_vec();
            le.reverse();
            let mut x = Mpi::from_binary(&le)?;
            // The top bit of the u-coordinate is ignored per RFC 7748.
            x.truncate_bits(255);
            return Ok(Point::from_affine(x, Mpi::from_int(0)));
        }

        if buf.is_empty() {
            return Err(EcpError::BadInputData);
        }
        if buf == [0x00] {
            return Ok(Point::zero());
        }

        let plen = self.p_len();
        match buf[0] {
            FORMAT_UNCOMPRESSED => {
                if buf.len() != 1 + 2 * plen {
                    return Err(EcpError::BadInputData);
                }
                let x = Mpi::from_binary(&buf[1..1 + plen])?;
                let y = Mpi::from_binary(&buf[1 + plen..])?;
                Ok(Point::from_affine(x, y))
            }
            0x02 | 0x03 => {
                if buf.len() != 1 + plen {
                    return Err(EcpError::BadInputData);
                }
                let x = Mpi::from_binary(&buf[1..])?;
                if x.cmp(&self.p) != Ordering::Less {
                    return Err(EcpError::BadInputData);
                }
                let y = self.solve_y(&x, buf[0] & 1)?;
                Ok(Point::from_affine(x, y))
            }
            _ => Err(EcpError::FeatureUnavailable),
        }
    }

    /// Recover y from x for a compressed encoding. All supported primes
    /// are 3 mod 4, so the square root is `rhs^((P+1)/4)`.
    fn solve_y(&self, x: &Mpi, parity: u8) -> Result<Mpi> {
        let rhs = self.mod_add(
            &self.mod_mul(&self.mod_add(&self.mod_sqr(x), &self.a), x),
            &self.b,
        );

        let mut e = self.p.add_int(1);
        e.shift_right(2);
        let y = rhs.exp_mod_once(&e, &self.p)?;

        if self.mod_sqr(&y) != rhs {
            // x is not on the curve: rhs has no square root.
            return Err(EcpError::BadInputData);
        }
        if y.get_bit(0) == parity {
            Ok(y)
        } else {
            Ok(self.mod_sub(&Mpi::from_int(0), &y))
        }
    }

    /// Read a TLS `ECPoint` (one-byte length + opaque point). Returns the
    /// point and the number of bytes consumed.
    pub fn tls_read_point(&self, buf: &[u8]) -> Result<(Point, usize)> {
        if buf.is_empty() {
            return Err(EcpError::BadInputData);
        }
        let plen = buf[0] as usize;
        if plen == 0 || buf.len() < 1 + plen {
            return Err(EcpError::BadInputData);
        }
        let pt = self.read_point(&buf[1..1 + plen])?;
        Ok((pt, 1 + plen))
    }

    /// Write a TLS `ECPoint`.
    pub fn tls_write_point(&self, pt: &Point) -> Result<Vec<u8>> {
        let body = self.write_point(pt)?;
        debug_assert!(body.len() <= u8::MAX as usize);
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(body.len() as u8);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Read a TLS `ECParameters` (named curve form only). Returns the
    /// group and the bytes consumed.
    pub fn tls_read_group(buf: &[u8]) -> Result<(std::sync::Arc<Group>, usize)> {
        if buf.len() < 3 {
            return Err(EcpError::BadInputData);
        }
        if buf[0] != TLS_NAMED_CURVE {
            return Err(EcpError::FeatureUnavailable);
        }
        let tls_id = u16::from_be_bytes([buf[1], buf[2]]);
        Ok((Group::from_tls_id(tls_id)?, 3))
    }

    /// Write the TLS `ECParameters` for this group.
    pub fn tls_write_group(&self) -> Result<Vec<u8>> {
        let ci = curve_info_from_grp_id(self.id).ok_or(EcpError::FeatureUnavailable)?;
        let id = ci.tls_id.to_be_bytes();
        Ok(vec![TLS_NAMED_CURVE, id[0], id[1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GroupId;

    #[test]
    fn uncompressed_roundtrip() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let pt = grp
            .mul(&Mpi::from_int(0x1337), grp.generator(), None)
            .unwrap();
        let enc = grp.write_point(&pt).unwrap();
        assert_eq!(enc.len(), 65);
        assert_eq!(enc[0], FORMAT_UNCOMPRESSED);
        let dec = grp.read_point(&enc).unwrap();
        assert_eq!(dec, pt);
    }

    #[test]
    fn infinity_encoding() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let enc = grp.write_point(&Point::zero()).unwrap();
        assert_eq!(enc, vec![0x00]);
        assert!(grp.read_point(&enc).unwrap().is_zero());
    }

    #[test]
    fn compressed_decode() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let pt = grp
            .mul(&Mpi::from_int(0xabcdef), grp.generator(), None)
            .unwrap();
        let unc = grp.write_point(&pt).unwrap();

        let plen = grp.p_len();
        let mut comp = Vec::with_capacity(1 + plen);
        comp.push(0x02 | (pt.y().get_bit(0)));
        comp.extend_from_slice(&unc[1..1 + plen]);

        let dec = grp.read_point(&comp).unwrap();
        assert_eq!(dec, pt);
    }

    #[test]
    fn compressed_decode_rejects_non_residue() {
        let grp = Group::from_id(GroupId::Secp256r1);
        // x = 5 is not the x-coordinate of any P-256 point.
        let mut comp = vec![0u8; 33];
        comp[0] = 0x02;
        comp[32] = 5;
        assert_eq!(grp.read_point(&comp), Err(EcpError::BadInputData));
    }

    #[test]
    fn tls_point_framing() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let pt = grp.mul(&Mpi::from_int(99), grp.generator(), None).unwrap();
        let framed = grp.tls_write_point(&pt).unwrap();
        assert_eq!(framed[0] as usize, framed.len() - 1);
        let (back, used) = grp.tls_read_point(&framed).unwrap();
        assert_eq!(used, framed.len());
        assert_eq!(back, pt);

        assert!(grp.tls_read_point(&[]).is_err());
        assert!(grp.tls_read_point(&[10, 0x04]).is_err());
    }

    #[test]
    fn tls_group_framing() {
        let grp = Group::from_id(GroupId::Secp384r1);
        let enc = grp.tls_write_group().unwrap();
        assert_eq!(enc, vec![TLS_NAMED_CURVE, 0, 24]);
        let (back, used) = Group::tls_read_group(&enc).unwrap();
        assert_eq!(used, 3);
        assert_eq!(back.id(), GroupId::Secp384r1);

        assert!(Group::tls_read_group(&[1, 0, 23]).is_err());
        assert!(Group::tls_read_group(&[3, 0x12, 0x34]).is_err());
    }

    #[test]
    fn x25519_encoding_is_little_endian() {
        let grp = Group::from_id(GroupId::Curve25519);
        let mut raw = vec![0u8; 32];
        raw[0] = 9; // the base point u = 9
        let pt = grp.read_point(&raw).unwrap();
        assert_eq!(pt.x().cmp_int(9), std::cmp::Ordering::Equal);
        assert_eq!(grp.write_point(&pt).unwrap(), raw);
    }
}

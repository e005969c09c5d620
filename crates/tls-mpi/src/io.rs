//! Big-endian binary import/export and random filling.

use rand::RngCore;
use zeroize::Zeroize;

use crate::{bytes_to_limbs, Mpi, MpiError, Result, Sign, LIMB_BYTES, MAX_SIZE};

impl Mpi {
    /// Import an unsigned big-endian value.
    pub fn from_binary(buf: &[u8]) -> Result<Mpi> {
        let mut x = Mpi::new();
        x.read_binary(buf)?;
        Ok(x)
    }

    /// Import an unsigned big-endian value into an existing Mpi, reusing
    /// its storage.
    pub fn read_binary(&mut self, buf: &[u8]) -> Result<()> {
        if buf.len() > MAX_SIZE {
            return Err(MpiError::TooLarge);
        }
        let limbs = bytes_to_limbs(buf.len()).max(1);
        self.grow(limbs);
        for l in &mut self.limbs[..limbs] {
            *l = 0;
        }
        self.sign = Sign::Positive;

        for (i, &byte) in buf.iter().rev().enumerate() {
            self.limbs[i / LIMB_BYTES] |= (byte as u64) << ((i % LIMB_BYTES) * 8);
        }
        self.fixup_used(limbs);
        Ok(())
    }

    /// Export the magnitude as fixed-width big-endian bytes, left-padding
    /// with zeros. Fails when the buffer is narrower than the value.
    pub fn write_binary(&self, buf: &mut [u8]) -> Result<()> {
        let n = self.byte_len();
        if buf.len() < n {
            return Err(MpiError::BufferTooSmall);
        }

        let pad = buf.len() - n;
        for b in &mut buf[..pad] {
            *b = 0;
        }
        for j in 0..n {
            buf[buf.len() - 1 - j] =
                (self.limbs[j / LIMB_BYTES] >> ((j % LIMB_BYTES) * 8)) as u8;
        }
        Ok(())
    }

    /// Export as a minimal-width big-endian byte vector.
    pub fn to_binary(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.byte_len()];
        self.write_binary(&mut out).expect("sized to fit");
        out
    }

    /// Fill with `size` bytes of randomness; the result is non-negative.
    /// The byte order is fixed so a deterministic generator produces the
    /// same value on every platform.
    pub fn fill_random(&mut self, size: usize, rng: &mut dyn RngCore) -> Result<()> {
        if size > MAX_SIZE {
            return Err(MpiError::TooLarge);
        }
        let mut bytes = vec![0u8; size];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|_| MpiError::RandomFailed)?;

        let limbs = bytes_to_limbs(size).max(1);
        self.grow(limbs);
        for l in &mut self.limbs[..limbs] {
            *l = 0;
        }
        for (i, &byte) in bytes.iter().enumerate() {
            self.limbs[i / LIMB_BYTES] |= (byte as u64) << ((i % LIMB_BYTES) * 8);
        }
        bytes.zeroize();

        self.sign = Sign::Positive;
        self.used = limbs;
        self.fixup_used(limbs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::cmp::Ordering;

    #[test]
    fn read_known_value() {
        let x = Mpi::from_binary(&[0x01, 0x00, 0x00]).unwrap();
        assert_eq!(x.cmp_int(0x10000), Ordering::Equal);

        let y = Mpi::from_binary(&hex::decode("0123456789abcdef01").unwrap()).unwrap();
        assert_eq!(y.limbs(), &[0x23456789abcdef01, 0x01]);
    }

    #[test]
    fn leading_zeros_ignored() {
        let a = Mpi::from_binary(&[0, 0, 0, 42]).unwrap();
        assert_eq!(a.cmp_int(42), Ordering::Equal);
        assert_eq!(a.byte_len(), 1);
    }

    #[test]
    fn write_pads_left() {
        let x = Mpi::from_int(0x0102);
        let mut buf = [0xffu8; 4];
        x.write_binary(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 1, 2]);
    }

    #[test]
    fn write_too_small() {
        let x = Mpi::from_int(0x010203);
        let mut buf = [0u8; 2];
        assert_eq!(x.write_binary(&mut buf), Err(MpiError::BufferTooSmall));
    }

    #[test]
    fn roundtrip() {
        let bytes = hex::decode("deadbeef00112233445566778899aabbccddeeff102030").unwrap();
        let x = Mpi::from_binary(&bytes).unwrap();
        let mut out = vec![0u8; bytes.len()];
        x.write_binary(&mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn empty_input_is_zero() {
        let x = Mpi::from_binary(&[]).unwrap();
        assert!(x.is_zero());
        assert_eq!(x.to_binary(), Vec::<u8>::new());
    }

    #[test]
    fn fill_random_deterministic() {
        let mut rng1 = StdRng::seed_from_u64(7);
        let mut rng2 = StdRng::seed_from_u64(7);
        let mut a = Mpi::new();
        let mut b = Mpi::new();
        a.fill_random(48, &mut rng1).unwrap();
        b.fill_random(48, &mut rng2).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sign(), Sign::Positive);
        assert!(a.byte_len() <= 48);
    }
}

//! Constant-time selection primitives.
//!
//! These run a fixed sequence of memory accesses for a given pair of limb
//! counts: no branch and no index depends on the selection flag or on the
//! values. Leaking the sizes of the operands is acceptable.

use crate::{Mpi, Sign};

/// Sign lookup used to blend signs without a data-dependent branch.
const SIGNS: [Sign; 2] = [Sign::Positive, Sign::Negative];

/// A selection flag that is guaranteed to be 0 or 1 and converts to a full
/// limb mask without branching.
#[derive(Clone, Copy, Debug)]
pub struct Choice(u8);

impl Choice {
    pub fn new(flag: u8) -> Self {
        // Collapse any non-zero value to 1 without a branch.
        Choice((flag | flag.wrapping_neg()) >> 7)
    }

    pub fn from_bool(b: bool) -> Self {
        Choice(b as u8)
    }

    /// All-ones when set, all-zeros otherwise.
    pub(crate) fn mask(self) -> u64 {
        (self.0 as u64).wrapping_neg()
    }

    pub fn unwrap_u8(self) -> u8 {
        self.0
    }
}

impl From<bool> for Choice {
    fn from(b: bool) -> Self {
        Choice::from_bool(b)
    }
}

impl Mpi {
    /// `self = other` when the flag is set, no change otherwise, in
    /// constant time with respect to the flag and the limb values.
    pub fn safe_cond_assign(&mut self, other: &Mpi, assign: Choice) {
        self.grow(other.used);
        let mask = assign.mask();

        let s = ((self.sign == crate::Sign::Negative) as u64 & !mask)
            | ((other.sign == crate::Sign::Negative) as u64 & mask);
        self.sign = SIGNS[s as usize];
        self.used = (self.used & !(mask as usize)) | (other.used & mask as usize);

        for i in 0..other.used {
            self.limbs[i] = (self.limbs[i] & !mask) | (other.limbs[i] & mask);
        }
    }

    /// Exchange `self` and `other` when the flag is set, in constant time.
    /// Swapping the backing pointers would leak through later access
    /// patterns, so the limbs themselves are blended.
    pub fn safe_cond_swap(&mut self, other: &mut Mpi, swap: Choice) {
        if std::ptr::eq(self, other) {
            return;
        }
        let mask = swap.mask();

        self.grow(other.used);
        other.grow(self.used);

        let sa = (self.sign == crate::Sign::Negative) as u64;
        let sb = (other.sign == crate::Sign::Negative) as u64;
        self.sign = SIGNS[((sa & !mask) | (sb & mask)) as usize];
        other.sign = SIGNS[((sb & !mask) | (sa & mask)) as usize];
        let used = self.used;
        self.used = (self.used & !(mask as usize)) | (other.used & mask as usize);
        other.used = (other.used & !(mask as usize)) | (used & mask as usize);

        let n = self.used.max(other.used);
        for i in 0..n {
            let t = mask & (self.limbs[i] ^ other.limbs[i]);
            self.limbs[i] ^= t;
            other.limbs[i] ^= t;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn choice_collapses_flags() {
        assert_eq!(Choice::new(0).unwrap_u8(), 0);
        assert_eq!(Choice::new(1).unwrap_u8(), 1);
        assert_eq!(Choice::new(0x80).unwrap_u8(), 1);
        assert_eq!(Choice::new(255).unwrap_u8(), 1);
        assert_eq!(Choice::new(0).mask(), 0);
        assert_eq!(Choice::new(2).mask(), u64::MAX);
    }

    #[test]
    fn cond_assign() {
        let src = Mpi::from_int(-777);
        let mut dst = Mpi::from_int(42);
        dst.safe_cond_assign(&src, Choice::new(0));
        assert_eq!(dst.cmp_int(42), Ordering::Equal);
        dst.safe_cond_assign(&src, Choice::new(1));
        assert_eq!(dst.cmp_int(-777), Ordering::Equal);
    }

    #[test]
    fn cond_swap() {
        let mut a = Mpi::from_binary(&[1; 24]).unwrap();
        let mut b = Mpi::from_int(-9);
        let (a0, b0) = (a.clone(), b.clone());

        a.safe_cond_swap(&mut b, Choice::new(0));
        assert_eq!(a, a0);
        assert_eq!(b, b0);

        a.safe_cond_swap(&mut b, Choice::new(1));
        assert_eq!(a, b0);
        assert_eq!(b, a0);
    }

    #[test]
    fn cond_swap_mixed_lengths() {
        let mut a = Mpi::from_binary(&[0xab; 40]).unwrap();
        let mut b = Mpi::from_int(5);
        let (a0, b0) = (a.clone(), b.clone());
        a.safe_cond_swap(&mut b, Choice::new(1));
        assert_eq!(a, b0);
        assert_eq!(b, a0);
    }
}

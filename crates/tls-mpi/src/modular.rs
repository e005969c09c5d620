//! Montgomery modular exponentiation, GCD and modular inverse.

use std::cmp::Ordering;

use crate::arith::muladd;
use crate::{Mpi, MpiError, Result, Sign, LIMB_BITS};

/// Maximum sliding-window width for modular exponentiation.
const WINDOW_MAX: usize = 6;

/// Reusable scratch for [`Mpi::exp_mod`]: the odd-multiple window table and
/// the Montgomery accumulator. Owned by the caller so repeated
/// exponentiations (a DHE handshake does several) reuse the allocations.
pub struct ExpModScratch {
    window: Vec<Mpi>,
    acc: Vec<u64>,
}

impl ExpModScratch {
    pub fn new() -> Self {
        ExpModScratch {
            window: Vec::new(),
            acc: Vec::new(),
        }
    }
}

impl Default for ExpModScratch {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExpModScratch {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.acc.zeroize();
    }
}

/// Montgomery constant `-N[0]^-1 mod 2^64` by Newton doubling.
fn montg_init(n0: u64) -> u64 {
    let mut x = n0;
    x = x.wrapping_add(((n0.wrapping_add(2)) & 4) << 1);

    let mut bits = LIMB_BITS;
    while bits >= 8 {
        x = x.wrapping_mul(2u64.wrapping_sub(n0.wrapping_mul(x)));
        bits /= 2;
    }
    x.wrapping_neg()
}

/// In-place `a -= b` over raw limbs, returning the borrow.
fn limbs_sub_in_place(a: &mut [u64], b: &[u64]) -> u64 {
    let mut borrow = 0u64;
    for i in 0..a.len() {
        let bi = if i < b.len() { b[i] } else { 0 };
        let (d1, b1) = a[i].overflowing_sub(borrow);
        let (d2, b2) = d1.overflowing_sub(bi);
        a[i] = d2;
        borrow = (b1 as u64) + (b2 as u64);
    }
    borrow
}

/// Montgomery multiplication `a = a * b * R^-1 mod n` (HAC 14.36).
fn montmul(a: &mut Mpi, b: &Mpi, n: &Mpi, mm: u64, acc: &mut Vec<u64>) {
    let nn = n.norm_used();
    let m = b.norm_used().min(nn);
    let b0 = b.limb(0);

    acc.clear();
    acc.resize(2 * nn + 2, 0);

    for i in 0..nn {
        // acc = (acc + u0*B + u1*N) / 2^64, the division being a one-limb
        // advance once the low limb has been cancelled.
        let u0 = a.limb(i);
        let u1 = acc[i]
            .wrapping_add(u0.wrapping_mul(b0))
            .wrapping_mul(mm);
        muladd(&mut acc[i..], &b.limbs[..m], u0);
        muladd(&mut acc[i..], &n.limbs[..nn], u1);
        debug_assert_eq!(acc[i], 0);
    }

    a.grow(nn + 1);
    a.limbs[..nn + 1].copy_from_slice(&acc[nn..2 * nn + 1]);
    for l in &mut a.limbs[nn + 1..] {
        *l = 0;
    }
    a.fixup_used(nn + 1);
    a.sign = Sign::Positive;

    if a.cmp_abs(n) != Ordering::Less {
        let au = a.used;
        let borrow = limbs_sub_in_place(&mut a.limbs[..au], &n.limbs[..nn]);
        debug_assert_eq!(borrow, 0);
        a.fixup_used(au);
    } else {
        // Balance the timing of the subtraction branch.
        let au = a.used.min(nn + 1);
        let _ = limbs_sub_in_place(&mut acc[nn..nn + au], &a.limbs[..au]);
    }
}

/// Montgomery reduction `a = a * R^-1 mod n`.
fn montred(a: &mut Mpi, n: &Mpi, mm: u64, acc: &mut Vec<u64>) {
    let one = Mpi::from_limb(1);
    montmul(a, &one, n, mm, acc);
}

fn window_size(exp_bits: usize) -> usize {
    if exp_bits > 671 {
        6
    } else if exp_bits > 239 {
        5
    } else if exp_bits > 79 {
        4
    } else if exp_bits > 23 {
        3
    } else {
        1
    }
}

impl Mpi {
    /// Sliding-window exponentiation `self^e mod n` (HAC 14.85).
    ///
    /// Requires `n` positive and odd and `e >= 0`. `rr` caches `R^2 mod n`
    /// across calls with the same modulus: pass an empty [`Mpi`] on first
    /// use and hand the same value back afterwards.
    pub fn exp_mod(
        &self,
        e: &Mpi,
        n: &Mpi,
        rr: &mut Mpi,
        scratch: &mut ExpModScratch,
    ) -> Result<Mpi> {
        if n.cmp_int(0) != Ordering::Greater || !n.is_odd() {
            return Err(MpiError::BadInputData);
        }
        if e.cmp_int(0) == Ordering::Less {
            return Err(MpiError::BadInputData);
        }

        let mm = montg_init(n.limb(0));
        let nn = n.norm_used();
        let ebits = e.bit_len();
        let wsize = window_size(ebits).min(WINDOW_MAX);

        // Work on the magnitude, compensate a negative base at the end.
        let neg = self.sign == Sign::Negative;
        let apos;
        let a: &Mpi = if neg {
            let mut t = self.clone();
            t.sign = Sign::Positive;
            apos = t;
            &apos
        } else {
            self
        };

        // First call with this modulus: R^2 mod N.
        if rr.used == 0 {
            let mut r2 = Mpi::from_int(1);
            r2.shift_left(nn * 2 * LIMB_BITS);
            *rr = r2.modulo(n)?;
        }

        let win_len = 1usize << wsize;
        if scratch.window.len() < win_len {
            scratch.window.resize_with(win_len, Mpi::new);
        }

        // W[1] = A * R mod N.
        let mut w1 = if a.cmp(n) != Ordering::Less {
            a.modulo(n)?
        } else {
            a.clone()
        };
        montmul(&mut w1, rr, n, mm, &mut scratch.acc);
        scratch.window[1].assign(&w1);

        // X = R mod N.
        let mut x = rr.clone();
        montred(&mut x, n, mm, &mut scratch.acc);

        if wsize > 1 {
            // W[2^(w-1)] = W[1]^(2^(w-1)), then the odd slots above it.
            let j = 1usize << (wsize - 1);
            scratch.window[j].assign(&w1);
            for _ in 0..wsize - 1 {
                let w = &mut scratch.window[j];
                let copy = w.clone();
                montmul(w, &copy, n, mm, &mut scratch.acc);
            }
            for i in j + 1..win_len {
                let prev = scratch.window[i - 1].clone();
                scratch.window[i].assign(&prev);
                montmul(&mut scratch.window[i], &w1, n, mm, &mut scratch.acc);
            }
        }

        // MSB-first scan: skip leading zeros, square between windows, and
        // square-then-multiply on each filled window.
        let mut nblimbs = e.norm_used();
        let mut bufsize = 0usize;
        let mut nbits = 0usize;
        let mut wbits = 0usize;
        let mut state = 0u8;

        loop {
            if bufsize == 0 {
                if nblimbs == 0 {
                    break;
                }
                nblimbs -= 1;
                bufsize = LIMB_BITS;
            }
            bufsize -= 1;
            let ei = ((e.limbs[nblimbs] >> bufsize) & 1) as usize;

            if ei == 0 && state == 0 {
                continue;
            }
            if ei == 0 && state == 1 {
                // Between windows only squarings happen.
                let copy = x.clone();
                montmul(&mut x, &copy, n, mm, &mut scratch.acc);
                continue;
            }

            state = 2;
            nbits += 1;
            wbits |= ei << (wsize - nbits);

            if nbits == wsize {
                for _ in 0..wsize {
                    let copy = x.clone();
                    montmul(&mut x, &copy, n, mm, &mut scratch.acc);
                }
                montmul(&mut x, &scratch.window[wbits], n, mm, &mut scratch.acc);
                state = 1;
                nbits = 0;
                wbits = 0;
            }
        }

        // Trailing partial window: square and conditionally multiply.
        for _ in 0..nbits {
            let copy = x.clone();
            montmul(&mut x, &copy, n, mm, &mut scratch.acc);
            wbits <<= 1;
            if wbits & (1 << wsize) != 0 {
                montmul(&mut x, &w1, n, mm, &mut scratch.acc);
            }
        }

        montred(&mut x, n, mm, &mut scratch.acc);

        if neg && e.is_odd() && !x.is_zero() {
            x.sign = Sign::Negative;
            x = n.add(&x);
        }

        Ok(x)
    }

    /// One-shot exponentiation with throwaway scratch.
    pub fn exp_mod_once(&self, e: &Mpi, n: &Mpi) -> Result<Mpi> {
        let mut rr = Mpi::new();
        let mut scratch = ExpModScratch::new();
        self.exp_mod(e, n, &mut rr, &mut scratch)
    }

    /// Binary greatest common divisor of the magnitudes (HAC 14.54).
    pub fn gcd(&self, other: &Mpi) -> Mpi {
        if self.is_zero() {
            let mut g = other.clone();
            g.sign = Sign::Positive;
            return g;
        }
        if other.is_zero() {
            let mut g = self.clone();
            g.sign = Sign::Positive;
            return g;
        }

        let mut ta = self.clone();
        let mut tb = other.clone();
        ta.sign = Sign::Positive;
        tb.sign = Sign::Positive;

        let lz = self.lsb().min(other.lsb());
        ta.shift_right(lz);
        tb.shift_right(lz);

        while !ta.is_zero() {
            let sa = ta.lsb();
            ta.shift_right(sa);
            let sb = tb.lsb();
            tb.shift_right(sb);

            if ta.cmp(&tb) != Ordering::Less {
                ta = ta.sub_abs(&tb).expect("|a| >= |b|");
                ta.shift_right(1);
            } else {
                tb = tb.sub_abs(&ta).expect("|b| > |a|");
                tb.shift_right(1);
            }
        }

        tb.shift_left(lz);
        tb
    }

    /// Modular inverse `self^-1 mod n` (extended binary Euclid, HAC
    /// 14.61/14.64). Requires `n > 1` and `gcd(self, n) == 1`; the result
    /// is in `[0, n)`.
    pub fn inv_mod(&self, n: &Mpi) -> Result<Mpi> {
        if n.cmp_int(1) != Ordering::Greater {
            return Err(MpiError::BadInputData);
        }
        if self.gcd(n).cmp_int(1) != Ordering::Equal {
            return Err(MpiError::BadInputData);
        }

        let ta = self.modulo(n)?;
        let mut tu = ta.clone();
        let tb = n.clone();
        let mut tv = n.clone();
        let mut u1 = Mpi::from_int(1);
        let mut u2 = Mpi::from_int(0);
        let mut v1 = Mpi::from_int(0);
        let mut v2 = Mpi::from_int(1);

        loop {
            while !tu.is_odd() && !tu.is_zero() {
                tu.shift_right(1);
                if u1.is_odd() || u2.is_odd() {
                    u1 = u1.add(&tb);
                    u2 = u2.sub(&ta);
                }
                u1.shift_right(1);
                u2.shift_right(1);
            }

            while !tv.is_odd() && !tv.is_zero() {
                tv.shift_right(1);
                if v1.is_odd() || v2.is_odd() {
                    v1 = v1.add(&tb);
                    v2 = v2.sub(&ta);
                }
                v1.shift_right(1);
                v2.shift_right(1);
            }

            if tu.cmp(&tv) != Ordering::Less {
                tu = tu.sub(&tv);
                u1 = u1.sub(&v1);
                u2 = u2.sub(&v2);
            } else {
                tv = tv.sub(&tu);
                v1 = v1.sub(&u1);
                v2 = v2.sub(&u2);
            }

            if tu.is_zero() {
                break;
            }
        }

        while v1.cmp_int(0) == Ordering::Less {
            v1 = v1.add(n);
        }
        while v1.cmp(n) != Ordering::Less {
            v1 = v1.sub(n);
        }

        Ok(v1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn montg_init_inverse() {
        for &n0 in &[1u64, 3, 0x1_0001, 0xffff_ffff_ffff_fff1, 0xdead_beef_1234_5677] {
            let mm = montg_init(n0);
            // mm == -n0^-1 mod 2^64, so n0 * mm + 1 wraps to 0.
            assert_eq!(n0.wrapping_mul(mm).wrapping_add(1), 0, "n0={n0:#x}");
        }
    }

    #[test]
    fn exp_mod_small_cases() {
        let a = Mpi::from_int(4);
        let e = Mpi::from_int(13);
        let n = Mpi::from_int(497);
        // 4^13 mod 497 = 445
        let r = a.exp_mod_once(&e, &n).unwrap();
        assert_eq!(r.cmp_int(445), Ordering::Equal);
    }

    #[test]
    fn exp_mod_edge_exponents() {
        let a = Mpi::from_int(123456789);
        let n = Mpi::from_int(1000003);
        assert_eq!(
            a.exp_mod_once(&Mpi::from_int(0), &n).unwrap().cmp_int(1),
            Ordering::Equal
        );
        assert_eq!(
            a.exp_mod_once(&Mpi::from_int(1), &n).unwrap(),
            a.modulo(&n).unwrap()
        );
    }

    #[test]
    fn exp_mod_rejects_bad_inputs() {
        let a = Mpi::from_int(2);
        let e = Mpi::from_int(3);
        assert!(a.exp_mod_once(&e, &Mpi::from_int(10)).is_err()); // even
        assert!(a.exp_mod_once(&e, &Mpi::from_int(-7)).is_err()); // negative
        assert!(a.exp_mod_once(&Mpi::from_int(-1), &Mpi::from_int(7)).is_err());
    }

    #[test]
    fn exp_mod_negative_base() {
        let a = Mpi::from_int(-4);
        let n = Mpi::from_int(497);
        // (-4)^13 mod 497 == 497 - 445 == 52
        let r = a.exp_mod_once(&Mpi::from_int(13), &n).unwrap();
        assert_eq!(r.cmp_int(52), Ordering::Equal);
        // Even exponent loses the sign.
        let r = a.exp_mod_once(&Mpi::from_int(2), &n).unwrap();
        assert_eq!(r.cmp_int(16), Ordering::Equal);
    }

    #[test]
    fn exp_mod_large_modulus_with_rr_cache() {
        // 2^e mod p for a 256-bit prime; checked against square-and-multiply
        // built from mul/modulo.
        let p = Mpi::from_binary(
            &hex::decode("ffffffff00000001000000000000000000000000ffffffffffffffffffffffff")
                .unwrap(),
        )
        .unwrap();
        let a = Mpi::from_int(0x1234_5678);
        let e = Mpi::from_binary(&hex::decode("0102030405060708090a0b0c").unwrap()).unwrap();

        let mut naive = Mpi::from_int(1);
        for i in (0..e.bit_len()).rev() {
            naive = naive.mul(&naive).modulo(&p).unwrap();
            if e.get_bit(i) == 1 {
                naive = naive.mul(&a).modulo(&p).unwrap();
            }
        }

        let mut rr = Mpi::new();
        let mut scratch = ExpModScratch::new();
        let r1 = a.exp_mod(&e, &p, &mut rr, &mut scratch).unwrap();
        assert_eq!(r1, naive);
        // Cached RR path gives the same answer.
        let r2 = a.exp_mod(&e, &p, &mut rr, &mut scratch).unwrap();
        assert_eq!(r2, naive);
    }

    #[test]
    fn gcd_basics() {
        let a = Mpi::from_int(3 * 5 * 7 * 64);
        let b = Mpi::from_int(5 * 7 * 16);
        assert_eq!(a.gcd(&b).cmp_int(5 * 7 * 16), Ordering::Equal);

        assert_eq!(Mpi::from_int(0).gcd(&a), a);
        assert_eq!(a.gcd(&Mpi::from_int(0)), a);
        // Sign is ignored.
        assert_eq!(Mpi::from_int(-12).gcd(&Mpi::from_int(18)).cmp_int(6), Ordering::Equal);
    }

    #[test]
    fn inv_mod_roundtrip() {
        let n = Mpi::from_int(1000003);
        for v in [2i64, 3, 65537, 999999] {
            let a = Mpi::from_int(v);
            let inv = a.inv_mod(&n).unwrap();
            let prod = a.mul(&inv).modulo(&n).unwrap();
            assert_eq!(prod.cmp_int(1), Ordering::Equal, "v={v}");
            assert!(inv.cmp_int(0) != Ordering::Less && inv.cmp(&n) == Ordering::Less);
        }
    }

    #[test]
    fn inv_mod_rejects_non_coprime() {
        let n = Mpi::from_int(100);
        assert_eq!(Mpi::from_int(10).inv_mod(&n), Err(MpiError::BadInputData));
        assert!(Mpi::from_int(3).inv_mod(&Mpi::from_int(1)).is_err());
    }
}

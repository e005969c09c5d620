//! Division with remainder (Knuth Algorithm D) and modular reduction.

use std::cmp::Ordering;

use crate::{Mpi, MpiError, Result, Sign, LIMB_BITS};

/// Divide the double-limb value `u1:u0` by `d`, `u1 < d`, `d != 0`.
fn div_two_limbs(u1: u64, u0: u64, d: u64) -> u64 {
    debug_assert!(d != 0 && u1 < d);
    let u = ((u1 as u128) << LIMB_BITS) | (u0 as u128);
    (u / d as u128) as u64
}

impl Mpi {
    /// Euclidean-style division: returns `(Q, R)` with `self = Q * other + R`
    /// and `|R| < |other|`; `R` carries the sign of `self`.
    pub fn div_rem(&self, other: &Mpi) -> Result<(Mpi, Mpi)> {
        if other.is_zero() {
            return Err(MpiError::BadInputData);
        }
        if other.cmp_int(1) == Ordering::Equal {
            return Ok((self.clone(), Mpi::from_int(0)));
        }
        if self.cmp_abs(other) == Ordering::Less {
            return Ok((Mpi::from_int(0), self.clone()));
        }

        let mut x = self.clone();
        let mut y = other.clone();
        x.sign = Sign::Positive;
        y.sign = Sign::Positive;

        // The divisor normalisation below can push the dividend into an
        // extra limb, so size the quotient for that.
        let mut q = Mpi::new();
        q.grow(self.norm_used() + 2);
        q.used = self.norm_used() + 2;
        for l in &mut q.limbs[..q.used] {
            *l = 0;
        }

        // Normalise the divisor so its most significant bit is set, which
        // keeps the trial-quotient estimate within one of the true digit.
        let k = match y.bit_len() % LIMB_BITS {
            0 => 0,
            top => LIMB_BITS - top,
        };
        if k > 0 {
            x.shift_left(k);
            y.shift_left(k);
        }

        let n = x.norm_used() - 1;
        let t = y.norm_used() - 1;

        y.shift_left(LIMB_BITS * (n - t));
        while x.cmp(&y) != Ordering::Less {
            q.limbs[n - t] += 1;
            x = x.sub(&y);
        }
        y.shift_right(LIMB_BITS * (n - t));

        for i in (t + 1..=n).rev() {
            let xi = x.limb(i);
            let yt = y.limb(t);
            // The search starts one above the estimate and walks down; the
            // 0 seed wraps to u64::MAX on the first pass when the top limbs
            // already saturate the digit.
            let mut trial = if xi >= yt {
                0u64
            } else {
                div_two_limbs(xi, x.limb(i - 1), yt).wrapping_add(1)
            };

            // Walk the over-estimate down while
            // trial * (yt:y[t-1]) > (x[i]:x[i-1]:x[i-2]).
            let t2_hi = xi;
            let t2_mid = if i >= 1 { x.limb(i - 1) } else { 0 };
            let t2_lo = if i >= 2 { x.limb(i - 2) } else { 0 };
            let t2 = {
                let mut v = Mpi::new();
                v.grow(3);
                v.limbs[0] = t2_lo;
                v.limbs[1] = t2_mid;
                v.limbs[2] = t2_hi;
                v.fixup_used(3);
                v
            };
            let ybase = {
                let mut v = Mpi::new();
                v.grow(2);
                v.limbs[0] = if t >= 1 { y.limb(t - 1) } else { 0 };
                v.limbs[1] = yt;
                v.fixup_used(2);
                v
            };
            loop {
                trial = trial.wrapping_sub(1);
                let t1 = ybase.mul_uint(trial);
                if t1.cmp(&t2) != Ordering::Greater {
                    break;
                }
            }
            q.limbs[i - t - 1] = trial;

            let mut t1 = y.mul_uint(trial);
            t1.shift_left(LIMB_BITS * (i - t - 1));
            x = x.sub(&t1);

            if x.cmp_int(0) == Ordering::Less {
                let mut corr = y.clone();
                corr.shift_left(LIMB_BITS * (i - t - 1));
                x = x.add(&corr);
                q.limbs[i - t - 1] -= 1;
            }
        }

        q.fixup_used(q.used);
        if !q.is_zero() {
            q.sign = self.sign.product(other.sign);
        }

        x.shift_right(k);
        x.fixup_used(x.used);
        if !x.is_zero() {
            x.sign = self.sign;
        }

        Ok((q, x))
    }

    /// Remainder of the division, carrying the sign of `self`.
    pub fn rem(&self, other: &Mpi) -> Result<Mpi> {
        Ok(self.div_rem(other)?.1)
    }

    /// `self mod other` for `other > 0`, with the result in `[0, other)`.
    pub fn modulo(&self, other: &Mpi) -> Result<Mpi> {
        if other.cmp_int(0) != Ordering::Greater {
            return Err(MpiError::BadInputData);
        }
        let mut r = self.rem(other)?;
        while r.cmp_int(0) == Ordering::Less {
            r = r.add(other);
        }
        while r.cmp(other) != Ordering::Less {
            r = r.sub(other);
        }
        Ok(r)
    }
}

//! Scalar multiplication.
//!
//! Short Weierstrass curves use a fixed-width comb (Hedabou-Pinel-Beneteau)
//! with signed-digit recoding: every scalar takes the exact same sequence
//! of doublings, additions and full-table scans, with no branch or table
//! index derived from secret bits. Curve25519 uses the conditional-swap
//! Montgomery ladder. `muladd` is the variable-time path for signature
//! verification, public inputs only.

use std::cmp::Ordering;

use rand::RngCore;
use tls_mpi::{Choice, Mpi};

use crate::{CurveKind, EcpError, Group, Point, Result, WINDOW_SIZE};

fn comb_window(_grp: &Group) -> usize {
    WINDOW_SIZE.clamp(2, 7)
}

fn comb_steps(grp: &Group, w: usize) -> usize {
    (grp.nbits + w - 1) / w
}

/// Build the comb table for `p`: entry `i` holds
/// `P + sum(2^((k+1) * d) P for bits k set in i)`, normalised to affine.
pub(crate) fn precompute_comb(grp: &Group, p: &Point) -> Vec<Point> {
    let w = comb_window(grp);
    let d = comb_steps(grp, w);
    let t_len = 1usize << (w - 1);

    let mut table = vec![Point::zero(); t_len];
    table[0] = p.clone();

    // Pure powers first: T[2^k] = 2^(d * (k+1) ... ) built by doubling the
    // previous power d times.
    let mut i = 1;
    while i < t_len {
        table[i] = table[i >> 1].clone();
        for _ in 0..d {
            table[i] = grp.double_jac(&table[i]);
        }
        i <<= 1;
    }
    {
        let mut refs: Vec<&mut Point> = table
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| *i != 0 && i.is_power_of_two())
            .map(|(_, pt)| pt)
            .collect();
        if !refs.is_empty() {
            grp.normalize_jac_many(&mut refs).expect("powers invertible");
        }
    }

    // Remaining entries by one mixed addition each, descending so the pure
    // power at T[i] is consumed before T[i] itself is overwritten at j = 0.
    let mut i = 1;
    while i < t_len {
        for j in (0..i).rev() {
            let sum = grp.add_mixed(&table[j], &table[i]);
            table[i + j] = sum;
        }
        i <<= 1;
    }

    let mut refs: Vec<&mut Point> = table
        .iter_mut()
        .filter(|pt| pt.z.cmp_int(1) != Ordering::Equal && !pt.z.is_zero())
        .collect();
    if !refs.is_empty() {
        grp.normalize_jac_many(&mut refs).expect("table invertible");
    }
    table
}

/// Signed-digit comb recoding. Returns `d + 1` digits, each with the table
/// pattern in the low bits and the sign in bit 7; all digits come out odd,
/// which is what lets the table skip even patterns.
fn comb_fixed(m: &Mpi, d: usize, w: usize) -> Vec<u8> {
    let mut x = vec![0u8; d + 1];

    for i in 0..d {
        for j in 0..w {
            x[i] |= m.get_bit(i + d * j) << j;
        }
    }

    let mut c = 0u8;
    for i in 1..=d {
        let cc = x[i] & c;
        x[i] ^= c;
        c = cc;

        let adjust = 1 - (x[i] & 1);
        c |= x[i] & (x[i - 1] * adjust);
        x[i] ^= x[i - 1] * adjust;
        x[i - 1] |= adjust << 7;
    }
    x
}

impl Group {
    /// Constant-time table lookup: reads every entry and keeps the one
    /// matching the digit via masked assignment, then conditionally negates
    /// for the digit's sign bit.
    fn select_comb(&self, table: &[Point], digit: u8) -> Point {
        let ii = (digit & 0x7f) >> 1;
        let mut r = Point::from_affine(Mpi::from_int(0), Mpi::from_int(0));

        for (j, entry) in table.iter().enumerate() {
            let flag = Choice::from_bool(j as u8 == ii);
            r.x.safe_cond_assign(&entry.x, flag);
            r.y.safe_cond_assign(&entry.y, flag);
        }
        self.safe_invert(&mut r, Choice::new(digit >> 7));
        r
    }

    fn mul_comb(
        &self,
        m: &Mpi,
        p: &Point,
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Point> {
        let w = comb_window(self);
        let d = comb_steps(self, w);

        // The generator's table is precomputed at load; any other point
        // gets a throwaway table.
        let fresh;
        let table: &[Point] = if p == &self.g {
            &self.comb
        } else {
            fresh = precompute_comb(self, p);
            &fresh
        };

        // The recoding needs an odd scalar: use N - m for even m and
        // un-negate the result at the end, selected without branching.
        let m_is_even = Choice::from_bool(m.get_bit(0) == 0);
        let mut mm = m.clone();
        let nm = self.n.sub(m);
        mm.safe_cond_assign(&nm, m_is_even);

        let digits = comb_fixed(&mm, d, w);

        let mut r = self.select_comb(table, digits[d]);
        if let Some(rng) = rng {
            self.randomize_jac(&mut r, rng)?;
        }

        for i in (0..d).rev() {
            r = self.double_jac(&r);
            let t = self.select_comb(table, digits[i]);
            r = self.add_mixed(&r, &t);
        }

        self.safe_invert(&mut r, m_is_even);
        self.normalize_jac(&mut r)?;
        Ok(r)
    }

    /// Montgomery ladder for Curve25519, x-coordinate only.
    fn mul_mxz(
        &self,
        m: &Mpi,
        p: &Point,
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Point> {
        let px = p.x.modulo(&self.p).map_err(|_| EcpError::InvalidKey)?;

        let mut r0 = Point {
            x: Mpi::from_int(1),
            y: Mpi::from_int(1),
            z: Mpi::from_int(0),
        };
        let mut r1 = Point {
            x: px.clone(),
            y: Mpi::from_int(1),
            z: Mpi::from_int(1),
        };

        // Randomise the projective representation of the input point.
        if let Some(rng) = rng {
            let l = self.draw_field_element(rng)?;
            r1.x = self.mod_mul(&r1.x, &l);
            r1.z = self.mod_mul(&r1.z, &l);
        }

        for i in (0..self.pbits).rev() {
            let b = Choice::from_bool(m.get_bit(i) == 1);
            r0.x.safe_cond_swap(&mut r1.x, b);
            r0.z.safe_cond_swap(&mut r1.z, b);

            // One ladder step: double R0, differential-add R0 and R1.
            let a = self.mod_add(&r0.x, &r0.z);
            let aa = self.mod_sqr(&a);
            let bb_ = self.mod_sub(&r0.x, &r0.z);
            let bb = self.mod_sqr(&bb_);
            let e = self.mod_sub(&aa, &bb);
            let c = self.mod_add(&r1.x, &r1.z);
            let dd = self.mod_sub(&r1.x, &r1.z);
            let da = self.mod_mul(&dd, &a);
            let cb = self.mod_mul(&c, &bb_);

            r1.x = self.mod_sqr(&self.mod_add(&da, &cb));
            r1.z = self.mod_mul(&px, &self.mod_sqr(&self.mod_sub(&da, &cb)));
            r0.x = self.mod_mul(&aa, &bb);
            r0.z = self.mod_mul(&e, &self.mod_add(&bb, &self.mod_mul(&self.a, &e)));

            let b = Choice::from_bool(m.get_bit(i) == 1);
            r0.x.safe_cond_swap(&mut r1.x, b);
            r0.z.safe_cond_swap(&mut r1.z, b);
        }

        if r0.z.is_zero() {
            return Err(EcpError::InvalidKey);
        }
        let zi = r0.z.inv_mod(&self.p).map_err(|_| EcpError::InvalidKey)?;
        Ok(Point {
            x: self.mod_mul(&r0.x, &zi),
            y: Mpi::from_int(0),
            z: Mpi::from_int(1),
        })
    }

    /// Multiplication `R = m * P`.
    ///
    /// Runs the same sequence of base-field operations for any valid `m`;
    /// no branch or array index depends on the scalar. Passing an RNG
    /// additionally randomises intermediate coordinates, which is cheap
    /// and recommended whenever the scalar is secret.
    pub fn mul(
        &self,
        m: &Mpi,
        p: &Point,
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Point> {
        self.check_privkey(m)?;
        self.check_pubkey(p)?;
        match self.kind {
            CurveKind::ShortWeierstrass => self.mul_comb(m, p, rng),
            CurveKind::Montgomery => self.mul_mxz(m, p, rng),
        }
    }

    /// `m * P` tolerating the 0 and 1 shortcuts; used by `muladd`.
    fn mul_shortcuts(&self, m: &Mpi, p: &Point) -> Result<Point> {
        if m.is_zero() {
            return Ok(Point::zero());
        }
        if m.cmp_int(1) == Ordering::Equal {
            return Ok(p.clone());
        }
        self.mul(m, p, None)
    }

    /// `R = m * P + n * Q` without constant-time guarantees; for use with
    /// public inputs only (signature verification).
    pub fn muladd(&self, m: &Mpi, p: &Point, n: &Mpi, q: &Point) -> Result<Point> {
        if self.kind != CurveKind::ShortWeierstrass {
            return Err(EcpError::FeatureUnavailable);
        }
        let mp = self.mul_shortcuts(m, p)?;
        let nq = self.mul_shortcuts(n, q)?;
        let mut r = self.add_mixed(&mp, &nq);
        self.normalize_jac(&mut r)?;
        Ok(r)
    }
}

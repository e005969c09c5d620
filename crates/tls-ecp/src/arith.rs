//! Jacobian point arithmetic on short Weierstrass curves.
//!
//! Formulas follow the EFD short-Weierstrass-Jacobian reference. All field
//! elements stay in `[0, P)` between operations.

use std::cmp::Ordering;

use rand::RngCore;
use tls_mpi::{Choice, Mpi};

use crate::{EcpError, Group, Point, Result};

impl Group {
    /// `(a + b) mod P` for operands in range.
    pub(crate) fn mod_add(&self, a: &Mpi, b: &Mpi) -> Mpi {
        let mut r = a.add(b);
        while r.cmp(&self.p) != Ordering::Less {
            r = r.sub(&self.p);
        }
        r
    }

    /// `(a - b) mod P` for operands in range.
    pub(crate) fn mod_sub(&self, a: &Mpi, b: &Mpi) -> Mpi {
        let mut r = a.sub(b);
        while r.cmp_int(0) == Ordering::Less {
            r = r.add(&self.p);
        }
        r
    }

    pub(crate) fn mod_mul(&self, a: &Mpi, b: &Mpi) -> Mpi {
        self.reduce(a.mul(b))
    }

    pub(crate) fn mod_sqr(&self, a: &Mpi) -> Mpi {
        self.reduce(a.mul(a))
    }

    /// Small-constant multiple, reduced.
    pub(crate) fn mod_mul_uint(&self, a: &Mpi, k: u64) -> Mpi {
        self.reduce(a.mul_uint(k))
    }

    /// Jacobian doubling: R = 2 P.
    pub(crate) fn double_jac(&self, p: &Point) -> Point {
        // M = 3 X^2 + A Z^4, S = Y^2, T = 4 X S, U = 8 S^2
        let zz = self.mod_sqr(&p.z);
        let m = self.mod_add(
            &self.mod_mul_uint(&self.mod_sqr(&p.x), 3),
            &self.mod_mul(&self.a, &self.mod_sqr(&zz)),
        );
        let s = self.mod_sqr(&p.y);
        let t = self.mod_mul_uint(&self.mod_mul(&p.x, &s), 4);
        let u = self.mod_mul_uint(&self.mod_sqr(&s), 8);

        let x3 = self.mod_sub(&self.mod_sqr(&m), &self.mod_add(&t, &t));
        let y3 = self.mod_sub(&self.mod_mul(&m, &self.mod_sub(&t, &x3)), &u);
        let z3 = self.mod_mul_uint(&self.mod_mul(&p.y, &p.z), 2);

        Point { x: x3, y: y3, z: z3 }
    }

    /// Mixed addition: R = P + Q where Q is affine (`Z == 1`).
    /// Handles the degenerate cases (either operand at infinity, P == Q,
    /// P == -Q) explicitly.
    pub(crate) fn add_mixed(&self, p: &Point, q: &Point) -> Point {
        if p.z.is_zero() {
            return q.clone();
        }
        if q.z.is_zero() {
            return p.clone();
        }

        let zz = self.mod_sqr(&p.z);
        let t1 = self.mod_sub(&self.mod_mul(&q.x, &zz), &p.x);
        let t2 = self.mod_sub(
            &self.mod_mul(&q.y, &self.mod_mul(&zz, &p.z)),
            &p.y,
        );

        if t1.is_zero() {
            if t2.is_zero() {
                return self.double_jac(p);
            }
            return Point::zero();
        }

        let z3 = self.mod_mul(&p.z, &t1);
        let t3 = self.mod_sqr(&t1);
        let t4 = self.mod_mul(&t3, &t1);
        let t3 = self.mod_mul(&t3, &p.x);

        let x3 = self.mod_sub(
            &self.mod_sub(&self.mod_sqr(&t2), &t4),
            &self.mod_add(&t3, &t3),
        );
        let y3 = self.mod_sub(
            &self.mod_mul(&t2, &self.mod_sub(&t3, &x3)),
            &self.mod_mul(&t4, &p.y),
        );

        Point { x: x3, y: y3, z: z3 }
    }

    /// Conditionally negate a point in constant time with respect to the
    /// flag: Y is replaced by P - Y when the flag is set.
    pub(crate) fn safe_invert(&self, pt: &mut Point, invert: Choice) {
        let neg_y = self.mod_sub(&Mpi::from_int(0), &pt.y);
        pt.y.safe_cond_assign(&neg_y, invert);
    }

    /// Normalise to affine coordinates (`Z == 1`), or leave the point at
    /// infinity untouched.
    pub(crate) fn normalize_jac(&self, pt: &mut Point) -> Result<()> {
        if pt.z.is_zero() {
            return Ok(());
        }
        let zi = pt.z.inv_mod(&self.p).map_err(|_| EcpError::BadInputData)?;
        let zi2 = self.mod_sqr(&zi);
        pt.x = self.mod_mul(&pt.x, &zi2);
        pt.y = self.mod_mul(&pt.y, &self.mod_mul(&zi2, &zi));
        pt.z = Mpi::from_int(1);
        Ok(())
    }

    /// Normalise many points with Montgomery's trick: one inversion for
    /// the whole batch. Used on the comb table.
    pub(crate) fn normalize_jac_many(&self, pts: &mut [&mut Point]) -> Result<()> {
        if pts.len() == 1 {
            return self.normalize_jac(pts[0]);
        }

        // c[i] = Z_0 * ... * Z_i
        let mut c: Vec<Mpi> = Vec::with_capacity(pts.len());
        c.push(pts[0].z.clone());
        for i in 1..pts.len() {
            let prod = self.mod_mul(&c[i - 1], &pts[i].z);
            c.push(prod);
        }

        // u = (Z_0 * ... * Z_n)^-1, peeled one point at a time.
        let mut u = c[pts.len() - 1]
            .inv_mod(&self.p)
            .map_err(|_| EcpError::BadInputData)?;

        for i in (0..pts.len()).rev() {
            let zi = if i == 0 {
                u.clone()
            } else {
                let zi = self.mod_mul(&u, &c[i - 1]);
                u = self.mod_mul(&u, &pts[i].z);
                zi
            };
            let zi2 = self.mod_sqr(&zi);
            pts[i].x = self.mod_mul(&pts[i].x, &zi2);
            pts[i].y = self.mod_mul(&pts[i].y, &self.mod_mul(&zi2, &zi));
            pts[i].z = Mpi::from_int(1);
        }
        Ok(())
    }

    /// Blind a Jacobian point by a random field element l:
    /// `(X, Y, Z) -> (l^2 X, l^3 Y, l Z)`. Defeats timing and DPA attacks
    /// against the intermediates of the scalar-multiplication walk.
    pub(crate) fn randomize_jac(&self, pt: &mut Point, rng: &mut dyn RngCore) -> Result<()> {
        let l = self.draw_field_element(rng)?;
        let l2 = self.mod_sqr(&l);
        pt.x = self.mod_mul(&pt.x, &l2);
        pt.y = self.mod_mul(&pt.y, &self.mod_mul(&l2, &l));
        pt.z = self.mod_mul(&pt.z, &l);
        Ok(())
    }

    /// Draw a uniform field element in `[2, P)`.
    pub(crate) fn draw_field_element(&self, rng: &mut dyn RngCore) -> Result<Mpi> {
        let p_size = (self.pbits + 7) / 8;
        let mut l = Mpi::new();
        let mut count = 0;
        loop {
            l.fill_random(p_size, rng).map_err(|_| EcpError::RandomFailed)?;
            if l.bit_len() > self.pbits {
                l.shift_right(l.bit_len() - self.pbits);
            }
            count += 1;
            if count > 30 {
                return Err(EcpError::RandomFailed);
            }
            if l.cmp(&self.p) == Ordering::Less && l.cmp_int(1) == Ordering::Greater {
                return Ok(l);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GroupId;

    #[test]
    fn double_vs_add_on_generator() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let g = grp.generator();

        let mut d = grp.double_jac(g);
        grp.normalize_jac(&mut d).unwrap();

        let mut a = grp.add_mixed(g, g); // same-point add falls into doubling
        grp.normalize_jac(&mut a).unwrap();
        assert_eq!(d, a);
        assert!(grp.check_pubkey(&d).is_ok());
    }

    #[test]
    fn add_inverse_gives_infinity() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let g = grp.generator().clone();
        let mut neg = g.clone();
        neg.y = grp.mod_sub(&Mpi::from_int(0), &neg.y);
        let r = grp.add_mixed(&g, &neg);
        assert!(r.is_zero());
    }

    #[test]
    fn infinity_is_identity_for_addition() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let g = grp.generator();
        let r = grp.add_mixed(&Point::zero(), g);
        assert_eq!(&r, g);
        let r = grp.add_mixed(g, &Point::zero());
        assert_eq!(&r, g);
    }

    #[test]
    fn batch_normalisation_matches_single() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let g = grp.generator();
        let mut p1 = grp.double_jac(g);
        let mut p2 = grp.double_jac(&p1);
        let mut q1 = p1.clone();
        let mut q2 = p2.clone();

        grp.normalize_jac(&mut q1).unwrap();
        grp.normalize_jac(&mut q2).unwrap();
        grp.normalize_jac_many(&mut [&mut p1, &mut p2]).unwrap();
        assert_eq!(p1, q1);
        assert_eq!(p2, q2);
    }

    #[test]
    fn randomisation_is_invisible_after_normalising() {
        let grp = Group::from_id(GroupId::Secp256r1);
        let mut pt = grp.double_jac(grp.generator());
        let mut reference = pt.clone();
        grp.normalize_jac(&mut reference).unwrap();

        let mut rng = rand::rngs::mock::StepRng::new(0x1234_5678_9abc_def0, 0x1111);
        grp.randomize_jac(&mut pt, &mut rng).unwrap();
        grp.normalize_jac(&mut pt).unwrap();
        assert_eq!(pt, reference);
    }
}

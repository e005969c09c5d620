//! Elliptic curves over GF(p) for TLS key exchange and signatures.
//!
//! Two curve shapes are supported: short Weierstrass
//! `y^2 = x^3 + A x + B mod P` (the NIST and Brainpool groups) and
//! Montgomery `y^2 = x^3 + A x^2 + x mod P` (Curve25519, where the stored
//! `A` is the ladder constant `(A + 2) / 4` and `B` is unused).
//!
//! Points are held in Jacobian coordinates. Every public operation returns
//! points with `Z` of 0 or 1: `Z == 0` is the point at infinity, otherwise
//! `(X, Y)` are affine. Anything else is internal only.
//!
//! Scalar multiplication by secret values runs a fixed sequence of field
//! operations: a comb method with full-table constant-time selection for
//! short Weierstrass curves, a conditional-swap Montgomery ladder for
//! Curve25519, both with optional coordinate randomisation.

use std::sync::{Arc, OnceLock};

use tls_mpi::{Mpi, MpiError};

mod arith;
mod codec;
mod curves;
mod keypair;
mod mul;

pub use keypair::Keypair;

/// Maximum "window" size used for point multiplication. Bounded to [2, 7];
/// the comb table holds `2^(WINDOW_SIZE - 1)` points per group.
pub const WINDOW_SIZE: usize = 6;

/// Maximum bit size of a supported group.
pub const MAX_BITS: usize = 521;
/// Maximum byte size of a coordinate.
pub const MAX_BYTES: usize = (MAX_BITS + 7) / 8;
/// Maximum encoded point length (uncompressed tag + two coordinates).
pub const MAX_PT_LEN: usize = 2 * MAX_BYTES + 1;

/// Errors surfaced by curve operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EcpError {
    #[error("bad input parameters")]
    BadInputData,
    #[error("destination buffer is too small")]
    BufferTooSmall,
    #[error("requested feature or curve not available")]
    FeatureUnavailable,
    #[error("signature is not valid")]
    VerifyFailed,
    #[error("random generation failed")]
    RandomFailed,
    #[error("signature is valid but shorter than the given length")]
    SigLenMismatch,
    #[error("not a valid private or public key")]
    InvalidKey,
}

impl From<MpiError> for EcpError {
    fn from(e: MpiError) -> Self {
        match e {
            MpiError::BufferTooSmall => EcpError::BufferTooSmall,
            MpiError::RandomFailed => EcpError::RandomFailed,
            _ => EcpError::BadInputData,
        }
    }
}

pub type Result<T> = std::result::Result<T, EcpError>;

/// Identifiers for the supported domain parameters.
///
/// Arbitrary domain parameters are not supported; only these well-known
/// groups can be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupId {
    Secp256r1,
    Secp384r1,
    Secp521r1,
    Bp256r1,
    Bp384r1,
    Bp512r1,
    Curve25519,
}

/// Curve information row for use by other modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveInfo {
    pub grp_id: GroupId,
    /// IANA NamedCurve identifier.
    pub tls_id: u16,
    pub bit_size: u16,
    pub name: &'static str,
}

static CURVE_LIST: &[CurveInfo] = &[
    CurveInfo { grp_id: GroupId::Secp256r1, tls_id: 23, bit_size: 256, name: "secp256r1" },
    CurveInfo { grp_id: GroupId::Curve25519, tls_id: 29, bit_size: 255, name: "x25519" },
    CurveInfo { grp_id: GroupId::Secp521r1, tls_id: 25, bit_size: 521, name: "secp521r1" },
    CurveInfo { grp_id: GroupId::Bp512r1, tls_id: 28, bit_size: 512, name: "brainpoolP512r1" },
    CurveInfo { grp_id: GroupId::Secp384r1, tls_id: 24, bit_size: 384, name: "secp384r1" },
    CurveInfo { grp_id: GroupId::Bp384r1, tls_id: 27, bit_size: 384, name: "brainpoolP384r1" },
    CurveInfo { grp_id: GroupId::Bp256r1, tls_id: 26, bit_size: 256, name: "brainpoolP256r1" },
];

/// Supported curves in order of preference.
pub fn curve_list() -> &'static [CurveInfo] {
    CURVE_LIST
}

pub fn curve_info_from_grp_id(id: GroupId) -> Option<&'static CurveInfo> {
    CURVE_LIST.iter().find(|ci| ci.grp_id == id)
}

pub fn curve_info_from_tls_id(tls_id: u16) -> Option<&'static CurveInfo> {
    CURVE_LIST.iter().find(|ci| ci.tls_id == tls_id)
}

pub fn curve_info_from_name(name: &str) -> Option<&'static CurveInfo> {
    CURVE_LIST.iter().find(|ci| ci.name == name)
}

/// The shape of the curve equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CurveKind {
    ShortWeierstrass,
    Montgomery,
}

/// A point in Jacobian coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub(crate) x: Mpi,
    pub(crate) y: Mpi,
    pub(crate) z: Mpi,
}

impl Point {
    /// The point at infinity.
    pub fn zero() -> Point {
        Point {
            x: Mpi::from_int(1),
            y: Mpi::from_int(1),
            z: Mpi::from_int(0),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.z.is_zero()
    }

    /// Affine x coordinate. Meaningful only on normalised points.
    pub fn x(&self) -> &Mpi {
        &self.x
    }

    /// Affine y coordinate. Meaningful only on normalised points.
    pub fn y(&self) -> &Mpi {
        &self.y
    }

    pub(crate) fn from_affine(x: Mpi, y: Mpi) -> Point {
        Point {
            x,
            y,
            z: Mpi::from_int(1),
        }
    }
}

/// An elliptic curve group, immutable once loaded.
///
/// The comb table for the generator is computed when the group is built,
/// so shared instances can run concurrent scalar multiplications without
/// synchronisation.
pub struct Group {
    pub(crate) id: GroupId,
    pub(crate) kind: CurveKind,
    pub(crate) pbits: usize,
    pub(crate) nbits: usize,
    pub(crate) p: Mpi,
    /// Curve `A`, or `(A + 2) / 4` for Montgomery curves.
    pub(crate) a: Mpi,
    /// Curve `B`; unused for Montgomery curves.
    pub(crate) b: Mpi,
    /// Order of the generator; for Montgomery curves `nbits` sizes private
    /// keys instead.
    pub(crate) n: Mpi,
    pub(crate) g: Point,
    /// Precomputed comb multiples of the generator, affine.
    pub(crate) comb: Vec<Point>,
}

impl Group {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn pbits(&self) -> usize {
        self.pbits
    }

    pub fn nbits(&self) -> usize {
        self.nbits
    }

    /// Byte length of one coordinate.
    pub fn p_len(&self) -> usize {
        (self.pbits + 7) / 8
    }

    pub fn generator(&self) -> &Point {
        &self.g
    }

    pub fn order(&self) -> &Mpi {
        &self.n
    }

    /// Load a shared instance of the group; the comb table is built on the
    /// first load of each curve and reused afterwards.
    pub fn from_id(id: GroupId) -> Arc<Group> {
        static CACHE: OnceLock<[OnceLock<Arc<Group>>; 7]> = OnceLock::new();
        let cache = CACHE.get_or_init(Default::default);
        let slot = match id {
            GroupId::Secp256r1 => 0,
            GroupId::Secp384r1 => 1,
            GroupId::Secp521r1 => 2,
            GroupId::Bp256r1 => 3,
            GroupId::Bp384r1 => 4,
            GroupId::Bp512r1 => 5,
            GroupId::Curve25519 => 6,
        };
        cache[slot]
            .get_or_init(|| Arc::new(curves::load(id)))
            .clone()
    }

    /// Load a shared instance from a TLS NamedCurve id.
    pub fn from_tls_id(tls_id: u16) -> Result<Arc<Group>> {
        let ci = curve_info_from_tls_id(tls_id).ok_or(EcpError::FeatureUnavailable)?;
        Ok(Group::from_id(ci.grp_id))
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("id", &self.id)
            .field("pbits", &self.pbits)
            .field("nbits", &self.nbits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookups() {
        let ci = curve_info_from_tls_id(23).unwrap();
        assert_eq!(ci.grp_id, GroupId::Secp256r1);
        assert_eq!(ci.name, "secp256r1");
        assert_eq!(curve_info_from_name("brainpoolP512r1").unwrap().tls_id, 28);
        assert_eq!(curve_info_from_grp_id(GroupId::Curve25519).unwrap().tls_id, 29);
        assert!(curve_info_from_tls_id(0x1234).is_none());
    }

    #[test]
    fn preference_order_starts_with_p256() {
        assert_eq!(curve_list()[0].grp_id, GroupId::Secp256r1);
    }

    #[test]
    fn group_cache_returns_same_instance() {
        let a = Group::from_id(GroupId::Secp256r1);
        let b = Group::from_id(GroupId::Secp256r1);
        assert!(Arc::ptr_eq(&a, &b));
    }
}

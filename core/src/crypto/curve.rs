//! secp256k1 curve layer.
//!
//! Everything above this module speaks in terms of [`Scalar`] and [`Point`];
//! the k256 types never leak. The protocol hash is Blake2b-256 throughout,
//! the chain's canonical hash function, not SHA-256.
//!
//! The distinguished points:
//! - `G`: the fixed curve generator.
//! - `H`: a NUMS point derived from `G` by try-and-increment hash-to-curve.
//!   `log_G(H)` is unknown by construction; `H` is always computed, never
//!   accepted as a parameter.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use k256::elliptic_curve::group::Group;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::{Field, PrimeField};
use k256::{AffinePoint, EncodedPoint, ProjectivePoint};
use once_cell::sync::Lazy;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::error::CurveError;

type Blake2b256 = Blake2b<U32>;

/// Compressed point length: parity prefix plus 32-byte x coordinate.
pub const POINT_LEN: usize = 33;

/// Compressed encoding of the secp256k1 generator.
pub const G_COMPRESSED: [u8; POINT_LEN] = [
    0x02, 0x79, 0xbe, 0x66, 0x7e, 0xf9, 0xdc, 0xbb, 0xac, 0x55, 0xa0, 0x62, 0x95, 0xce, 0x87,
    0x0b, 0x07, 0x02, 0x9b, 0xfc, 0xdb, 0x2d, 0xce, 0x28, 0xd9, 0x59, 0xf2, 0x81, 0x5b, 0x16,
    0xf8, 0x17, 0x98,
];

/// Blake2b-256 over a concatenation of byte slices.
pub fn blake2b256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

// ============================================================================
// Scalar
// ============================================================================

/// A scalar mod the curve group order `n`.
///
/// Arithmetic is closed over the full field; witness scalars additionally
/// must be nonzero, which [`random_scalar`] and the decoders enforce.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Scalar(pub(crate) k256::Scalar);

impl Scalar {
    pub const ZERO: Scalar = Scalar(k256::Scalar::ZERO);
    pub const ONE: Scalar = Scalar(k256::Scalar::ONE);

    /// Decode a 32-byte big-endian scalar, rejecting values outside `[1, n)`.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CurveError> {
        let inner = Option::<k256::Scalar>::from(k256::Scalar::from_repr((*bytes).into()))
            .ok_or(CurveError::BadScalar)?;
        if bool::from(inner.is_zero()) {
            return Err(CurveError::BadScalar);
        }
        Ok(Scalar(inner))
    }

    /// Reduce arbitrary hash output into the scalar field. Used for
    /// Fiat–Shamir challenges, where zero is acceptable.
    pub fn from_hash(digest: &[u8; 32]) -> Self {
        let bytes: k256::FieldBytes = (*digest).into();
        Scalar(<k256::Scalar as Reduce<k256::U256>>::reduce_bytes(&bytes))
    }

    pub fn from_u64(v: u64) -> Self {
        Scalar(k256::Scalar::from(v))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_repr().into()
    }

    pub fn is_zero(&self) -> bool {
        bool::from(self.0.is_zero())
    }

    pub fn add(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 + other.0)
    }

    pub fn sub(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 - other.0)
    }

    pub fn mul(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 * other.0)
    }

    pub fn negate(&self) -> Scalar {
        Scalar(-self.0)
    }
}

/// Sample a uniform scalar in `[1, n)`. Zero is rejected by resampling.
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    loop {
        let candidate = k256::Scalar::random(&mut *rng);
        if !bool::from(candidate.is_zero()) {
            return Scalar(candidate);
        }
    }
}

// ============================================================================
// Point
// ============================================================================

/// A non-identity element of the secp256k1 group.
///
/// The identity is unrepresentable: both decoding and the arithmetic that
/// could produce it hand back [`CurveError::Identity`] instead. This keeps
/// the 33-byte compressed encoding total.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Point(pub(crate) ProjectivePoint);

impl Point {
    /// The curve generator `G`.
    pub fn generator() -> Point {
        Point(ProjectivePoint::GENERATOR)
    }

    /// Decode a compressed SEC1 point. Enforces the 33-byte length, the
    /// `0x02`/`0x03` parity prefix, curve membership, and non-identity.
    pub fn decode(bytes: &[u8]) -> Result<Self, CurveError> {
        if bytes.len() != POINT_LEN {
            return Err(CurveError::BadEncoding);
        }
        if bytes[0] != 0x02 && bytes[0] != 0x03 {
            return Err(CurveError::BadEncoding);
        }
        let encoded = EncodedPoint::from_bytes(bytes).map_err(|_| CurveError::BadEncoding)?;
        let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or(CurveError::NotOnCurve)?;
        let point = ProjectivePoint::from(affine);
        if bool::from(point.is_identity()) {
            return Err(CurveError::Identity);
        }
        Ok(Point(point))
    }

    pub fn decode_hex(hex_str: &str) -> Result<Self, CurveError> {
        let bytes = hex::decode(hex_str).map_err(|_| CurveError::BadEncoding)?;
        Self::decode(&bytes)
    }

    /// Compressed 33-byte encoding with explicit parity prefix.
    pub fn encode(&self) -> [u8; POINT_LEN] {
        let encoded = self.0.to_affine().to_encoded_point(true);
        let mut out = [0u8; POINT_LEN];
        out.copy_from_slice(encoded.as_bytes());
        out
    }

    pub fn encode_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Point addition. Fails only if the result is the identity
    /// (i.e. `other == -self`).
    pub fn add(&self, other: &Point) -> Result<Point, CurveError> {
        Self::checked(self.0 + other.0)
    }

    pub fn sub(&self, other: &Point) -> Result<Point, CurveError> {
        Self::checked(self.0 - other.0)
    }

    /// Scalar multiplication. The k256 backend runs this in constant time.
    pub fn mul(&self, scalar: &Scalar) -> Result<Point, CurveError> {
        Self::checked(self.0 * scalar.0)
    }

    fn checked(raw: ProjectivePoint) -> Result<Point, CurveError> {
        if bool::from(raw.is_identity()) {
            return Err(CurveError::Identity);
        }
        Ok(Point(raw))
    }
}

/// `scalar * G`, the public image of a witness.
pub fn base_mul(scalar: &Scalar) -> Result<Point, CurveError> {
    Point::checked(ProjectivePoint::GENERATOR * scalar.0)
}

// ============================================================================
// Hash-to-curve and the NUMS generators
// ============================================================================

/// Try-and-increment hash-to-curve.
///
/// The candidate x coordinate starts at `Blake2b-256(seed)` interpreted as a
/// big-endian integer and is incremented until it lies on the curve; the
/// even-parity root is taken. The procedure is public and deterministic, so
/// the discrete log of the result with respect to `G` is unknown to everyone.
pub fn hash_to_curve(seed: &[u8]) -> Point {
    let mut candidate = [0u8; POINT_LEN];
    candidate[0] = 0x02;
    candidate[1..].copy_from_slice(&blake2b256(&[seed]));
    loop {
        if let Ok(point) = Point::decode(&candidate) {
            return point;
        }
        increment_be(&mut candidate[1..]);
    }
}

fn increment_be(bytes: &mut [u8]) {
    for byte in bytes.iter_mut().rev() {
        let (next, overflow) = byte.overflowing_add(1);
        *byte = next;
        if !overflow {
            return;
        }
    }
}

static NUMS_H: Lazy<Point> = Lazy::new(|| hash_to_curve(&G_COMPRESSED));

/// The protocol's fixed secondary generator `H = hash_to_curve(G)`.
///
/// Doubles as the nullifier base: `I = r·H`.
pub fn nums_h() -> Point {
    *NUMS_H
}

/// Per-asset NUMS generator: `hash_to_curve(Blake2b-256(G ‖ asset_id))`.
pub fn asset_generator(asset_id: &[u8]) -> Point {
    let seed = blake2b256(&[&G_COMPRESSED, asset_id]);
    hash_to_curve(&seed)
}

// ============================================================================
// Secret scalar wrapper
// ============================================================================

/// A witness scalar that zeroizes its backing bytes on drop.
///
/// Clone is deliberately not derived; secrets move, they are not copied.
pub struct SecretScalar {
    bytes: [u8; 32],
}

impl SecretScalar {
    pub fn from_scalar(scalar: &Scalar) -> Self {
        Self { bytes: scalar.to_bytes() }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CurveError> {
        Scalar::from_bytes(&bytes)?;
        Ok(Self { bytes })
    }

    pub fn to_scalar(&self) -> Scalar {
        // The constructor guaranteed range, so this cannot fail.
        Scalar::from_bytes(&self.bytes).unwrap_or(Scalar::ONE)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Drop for SecretScalar {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

//! Cryptographic primitives for the pool protocol.
//!
//! - secp256k1 curve layer with Blake2b-256 hashing and NUMS generators
//! - Pedersen commitments, single- and multi-asset
//! - DH-tuple ring witnesses, nullifiers, range and balance proofs

pub mod assembler;
pub mod balance;
pub mod curve;
pub mod multi_asset;
pub mod pedersen;
pub mod range;
pub mod ring;
pub mod schnorr;

pub use assembler::{ExtensionAssembler, RangeAssembler, RingAssembler};
pub use curve::{
    asset_generator, base_mul, blake2b256, hash_to_curve, nums_h, random_scalar, Point, Scalar,
    SecretScalar, G_COMPRESSED, POINT_LEN,
};
pub use pedersen::Commitment;
pub use ring::{build_ring_witness, encode_ring_bundle, nullifier, verify_ring_witness, RingWitness};

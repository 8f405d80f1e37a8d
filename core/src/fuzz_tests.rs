//! Randomized property tests for the algebraic invariants.
//!
//! Every property here corresponds to an equation the on-chain validator
//! relies on; a failure means the cryptographic layer is unsound, not just
//! buggy.

use proptest::prelude::*;

use crate::crypto::curve::{blake2b256, Point, Scalar};
use crate::crypto::multi_asset::{self, GeneratorTable};
use crate::crypto::pedersen;
use crate::crypto::ring::{build_ring_witness, nullifier, verify_ring_witness};
use crate::state::registers::{read_vlq, write_vlq, RegisterValue};

/// Uniform-ish nonzero scalar from arbitrary bytes.
fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    any::<[u8; 32]>()
        .prop_map(|bytes| Scalar::from_hash(&blake2b256(&[&bytes])))
        .prop_filter("nonzero", |s| !s.is_zero())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Invariant 1: openings are exact in both the value and the blinding.
    #[test]
    fn commitment_opens_only_to_its_value(
        r in scalar_strategy(),
        v in 0u64..u64::MAX,
    ) {
        let c = pedersen::commit(&r, v).unwrap();
        prop_assert!(pedersen::open(&c, &r, v));
        prop_assert!(!pedersen::open(&c, &r, v + 1));
    }

    /// Invariant 4: the scheme is additively homomorphic.
    #[test]
    fn commitment_homomorphism(
        r1 in scalar_strategy(),
        r2 in scalar_strategy(),
        v1 in 0u64..u32::MAX as u64,
        v2 in 0u64..u32::MAX as u64,
    ) {
        let lhs = pedersen::add(
            &pedersen::commit(&r1, v1).unwrap(),
            &pedersen::commit(&r2, v2).unwrap(),
        ).unwrap();
        let rhs = pedersen::commit(&r1.add(&r2), v1 + v2).unwrap();
        prop_assert_eq!(lhs, rhs);
    }

    /// Invariant 3: nullifiers are deterministic and never the protocol
    /// constants.
    #[test]
    fn nullifier_determinism(r in scalar_strategy()) {
        let a = nullifier(&r).unwrap();
        let b = nullifier(&r).unwrap();
        prop_assert_eq!(a, b);
        prop_assert_ne!(a, Point::generator());
        prop_assert_ne!(a, crate::crypto::curve::nums_h());
    }

    /// Invariant 6 (scalars): VLQ round-trips and is length-canonical.
    #[test]
    fn vlq_roundtrip(n in any::<u64>()) {
        let mut buf = Vec::new();
        write_vlq(&mut buf, n);
        let (decoded, used) = read_vlq(&buf).unwrap();
        prop_assert_eq!(decoded, n);
        prop_assert_eq!(used, buf.len());
    }

    /// Invariant 6: register encode∘decode is the identity, and any
    /// corrupted byte is rejected or decodes to something else.
    #[test]
    fn register_roundtrip_and_tamper(
        v in any::<i64>(),
        flip_at in any::<prop::sample::Index>(),
        flip_bit in 0u8..8,
    ) {
        let value = RegisterValue::Long(v);
        let encoded = value.encode();
        prop_assert_eq!(RegisterValue::decode(&encoded).unwrap(), value.clone());

        let mut tampered = encoded.clone();
        let at = flip_at.index(tampered.len());
        tampered[at] ^= 1 << flip_bit;
        if tampered != encoded {
            match RegisterValue::decode(&tampered) {
                Ok(other) => prop_assert_ne!(other, value),
                Err(_) => {}
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Invariant 2: a ring witness built at any index against any ring size
    /// satisfies the validator's verification equation.
    #[test]
    fn ring_witness_verifies_everywhere(
        seeds in prop::collection::vec(any::<[u8; 32]>(), 1..8),
        real_choice in any::<prop::sample::Index>(),
        message in any::<[u8; 16]>(),
    ) {
        let denom = 100u64;
        let mut ring = Vec::with_capacity(seeds.len());
        let mut scalars = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            let r = Scalar::from_hash(&blake2b256(&[seed]));
            prop_assume!(!r.is_zero());
            ring.push(*pedersen::commit(&r, denom).unwrap().as_point());
            scalars.push(r);
        }
        let real = real_choice.index(ring.len());
        let witness = build_ring_witness(
            &ring, real, &scalars[real], denom, &message, &mut rand::rngs::OsRng,
        ).unwrap();
        prop_assert!(verify_ring_witness(&witness, denom, &message));
        prop_assert!(!verify_ring_witness(&witness, denom, b"different message"));
    }

    /// Invariant 5: swapping amounts between assets never collides.
    #[test]
    fn multi_asset_independence(
        r in scalar_strategy(),
        a in 1u64..1_000_000,
        b in 1u64..1_000_000,
    ) {
        prop_assume!(a != b);
        let table = GeneratorTable::new();
        let forward = multi_asset::commit(
            &table, &r, &[(b"asset-x".to_vec(), a), (b"asset-y".to_vec(), b)],
        ).unwrap();
        let swapped = multi_asset::commit(
            &table, &r, &[(b"asset-x".to_vec(), b), (b"asset-y".to_vec(), a)],
        ).unwrap();
        prop_assert_ne!(forward.point, swapped.point);
    }
}

//! Canonical register encoding.
//!
//! The on-chain validator compares raw register bytes, so every encoder here
//! is exact and every decoder is strict: unknown tags, truncated payloads,
//! non-canonical VLQ, and trailing bytes are all rejected. Register values
//! parse into typed variants; the explorer's "rendered" JSON form never
//! enters the pipeline.
//!
//! Wire formats:
//! - `0x04` signed int, zig-zag VLQ
//! - `0x05` signed long, zig-zag VLQ
//! - `0x07` group element, 33 bytes compressed
//! - `0x0e` byte collection, VLQ length ‖ bytes
//! - `0x13` group-element collection, VLQ count ‖ count × 33 bytes
//! - `0x64` AVL tree, 33-byte digest ‖ flags ‖ key length ‖ reserved

use crate::avl::{Digest33, DIGEST_LEN, TREE_SUFFIX};
use crate::crypto::curve::{Point, POINT_LEN};
use crate::error::{Error, Result};

pub const TAG_INT: u8 = 0x04;
pub const TAG_LONG: u8 = 0x05;
pub const TAG_GROUP_ELEMENT: u8 = 0x07;
pub const TAG_BYTE_COLL: u8 = 0x0e;
pub const TAG_POINT_COLL: u8 = 0x13;
pub const TAG_AVL_TREE: u8 = 0x64;

/// The serialized AVL register payload: digest plus the versioned
/// flags/key-length suffix pinned to the pool contract.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AvlTreeData {
    pub digest: Digest33,
    pub flags: u8,
    pub key_len: u8,
}

impl AvlTreeData {
    /// Fresh tree register with the contract's pinned suffix.
    pub fn with_digest(digest: Digest33) -> Self {
        Self { digest, flags: TREE_SUFFIX[0], key_len: TREE_SUFFIX[1] }
    }
}

/// A typed, canonically serializable register payload.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RegisterValue {
    Int(i32),
    Long(i64),
    GroupElement(Point),
    ByteColl(Vec<u8>),
    PointColl(Vec<Point>),
    AvlTree(AvlTreeData),
}

impl RegisterValue {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RegisterValue::Int(v) => {
                let mut out = vec![TAG_INT];
                write_vlq(&mut out, zigzag32(*v));
                out
            }
            RegisterValue::Long(v) => {
                let mut out = vec![TAG_LONG];
                write_vlq(&mut out, zigzag64(*v));
                out
            }
            RegisterValue::GroupElement(point) => {
                let mut out = vec![TAG_GROUP_ELEMENT];
                out.extend_from_slice(&point.encode());
                out
            }
            RegisterValue::ByteColl(bytes) => {
                let mut out = vec![TAG_BYTE_COLL];
                write_vlq(&mut out, bytes.len() as u64);
                out.extend_from_slice(bytes);
                out
            }
            RegisterValue::PointColl(points) => {
                let mut out = vec![TAG_POINT_COLL];
                write_vlq(&mut out, points.len() as u64);
                for point in points {
                    out.extend_from_slice(&point.encode());
                }
                out
            }
            RegisterValue::AvlTree(tree) => {
                let mut out = vec![TAG_AVL_TREE];
                out.extend_from_slice(&tree.digest);
                out.push(tree.flags);
                out.push(tree.key_len);
                out.push(TREE_SUFFIX[2]);
                out
            }
        }
    }

    pub fn encode_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Strict decode: consumes the whole input or fails.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or_else(|| Error::Serialization("empty register".into()))?;
        let (value, consumed) = match tag {
            TAG_INT => {
                let (raw, used) = read_vlq(rest)?;
                let raw32 = u32::try_from(raw)
                    .map_err(|_| Error::Serialization("int register overflows 32 bits".into()))?;
                (RegisterValue::Int(unzigzag32(raw32)), used)
            }
            TAG_LONG => {
                let (raw, used) = read_vlq(rest)?;
                (RegisterValue::Long(unzigzag64(raw)), used)
            }
            TAG_GROUP_ELEMENT => {
                if rest.len() < POINT_LEN {
                    return Err(Error::Serialization("truncated group element".into()));
                }
                let point = Point::decode(&rest[..POINT_LEN]).map_err(Error::Curve)?;
                (RegisterValue::GroupElement(point), POINT_LEN)
            }
            TAG_BYTE_COLL => {
                let (len, used) = read_vlq(rest)?;
                let len = usize::try_from(len)
                    .ok()
                    .filter(|&len| len <= rest.len() - used)
                    .ok_or_else(|| Error::Serialization("truncated byte collection".into()))?;
                (RegisterValue::ByteColl(rest[used..used + len].to_vec()), used + len)
            }
            TAG_POINT_COLL => {
                let (count, used) = read_vlq(rest)?;
                let body = &rest[used..];
                let count = usize::try_from(count)
                    .ok()
                    .filter(|&count| count <= body.len() / POINT_LEN)
                    .ok_or_else(|| Error::Serialization("truncated point collection".into()))?;
                let mut points = Vec::with_capacity(count);
                for chunk in body[..count * POINT_LEN].chunks_exact(POINT_LEN) {
                    points.push(Point::decode(chunk).map_err(Error::Curve)?);
                }
                (RegisterValue::PointColl(points), used + count * POINT_LEN)
            }
            TAG_AVL_TREE => {
                if rest.len() < DIGEST_LEN + 3 {
                    return Err(Error::Serialization("truncated AVL tree register".into()));
                }
                let mut digest = [0u8; DIGEST_LEN];
                digest.copy_from_slice(&rest[..DIGEST_LEN]);
                let flags = rest[DIGEST_LEN];
                let key_len = rest[DIGEST_LEN + 1];
                if rest[DIGEST_LEN + 2] != TREE_SUFFIX[2] {
                    return Err(Error::Serialization("bad AVL tree register suffix".into()));
                }
                if key_len != TREE_SUFFIX[1] {
                    return Err(Error::Serialization(format!(
                        "AVL tree key length {key_len:#04x} differs from the contract's 0x21"
                    )));
                }
                (RegisterValue::AvlTree(AvlTreeData { digest, flags, key_len }), DIGEST_LEN + 3)
            }
            other => {
                return Err(Error::Serialization(format!("unknown register tag {other:#04x}")));
            }
        };
        if consumed != rest.len() {
            return Err(Error::Serialization(format!(
                "{} trailing bytes after register payload",
                rest.len() - consumed
            )));
        }
        Ok(value)
    }

    pub fn decode_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::Serialization(format!("register is not hex: {e}")))?;
        Self::decode(&bytes)
    }
}

/// Serialize opaque bytes as a `Coll[Byte]` constant, the form context
/// extension variables take on the wire.
pub fn byte_coll(bytes: &[u8]) -> Vec<u8> {
    RegisterValue::ByteColl(bytes.to_vec()).encode()
}

// ---------------------------------------------------------------------------
// VLQ / zig-zag
// ---------------------------------------------------------------------------

pub fn write_vlq(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Read a canonical VLQ. Returns `(value, bytes consumed)`.
pub fn read_vlq(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 {
            return Err(Error::Serialization("VLQ overflows 64 bits".into()));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            // A multi-byte encoding whose final group is zero has a shorter
            // canonical form.
            if i > 0 && byte == 0 {
                return Err(Error::Serialization("non-canonical VLQ".into()));
            }
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(Error::Serialization("unterminated VLQ".into()))
}

pub fn zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn unzigzag64(raw: u64) -> i64 {
    ((raw >> 1) as i64) ^ -((raw & 1) as i64)
}

pub fn zigzag32(v: i32) -> u64 {
    (((v << 1) ^ (v >> 31)) as u32) as u64
}

pub fn unzigzag32(raw: u32) -> i32 {
    ((raw >> 1) as i32) ^ -((raw & 1) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::curve::{nums_h, Point};

    #[test]
    fn vlq_roundtrip() {
        for n in [0u64, 1, 16, 50, 100, 127, 128, 200, 255, 1000, 16383, 65535, u64::MAX] {
            let mut buf = Vec::new();
            write_vlq(&mut buf, n);
            let (decoded, used) = read_vlq(&buf).unwrap();
            assert_eq!(decoded, n);
            assert_eq!(used, buf.len());
            if n < 0x80 {
                assert_eq!(buf.len(), 1);
            }
        }
    }

    #[test]
    fn vlq_rejects_non_canonical() {
        // 0x80 0x00 is a two-byte zero.
        assert!(read_vlq(&[0x80, 0x00]).is_err());
        assert!(read_vlq(&[0x80]).is_err());
    }

    #[test]
    fn long_register_vector() {
        // The standard pool denomination register: zig-zag(100) = 200.
        let value = RegisterValue::Long(100);
        assert_eq!(value.encode_hex(), "05c801");
        assert_eq!(RegisterValue::decode_hex("05c801").unwrap(), value);
    }

    #[test]
    fn int_register_vector() {
        // Max ring 16: zig-zag(16) = 32 = 0x20.
        let value = RegisterValue::Int(16);
        assert_eq!(value.encode_hex(), "0420");
        assert_eq!(RegisterValue::decode_hex("0420").unwrap(), value);
    }

    #[test]
    fn empty_point_collection_vector() {
        let value = RegisterValue::PointColl(vec![]);
        assert_eq!(value.encode_hex(), "1300");
        assert_eq!(RegisterValue::decode_hex("1300").unwrap(), value);
    }

    #[test]
    fn point_collection_roundtrip() {
        let points = vec![Point::generator(), nums_h()];
        let value = RegisterValue::PointColl(points);
        let encoded = value.encode();
        assert_eq!(RegisterValue::decode(&encoded).unwrap(), value);
    }

    #[test]
    fn avl_register_roundtrip_with_pinned_suffix() {
        let value = RegisterValue::AvlTree(AvlTreeData::with_digest([7u8; DIGEST_LEN]));
        let encoded = value.encode();
        assert!(encoded.ends_with(&TREE_SUFFIX));
        assert_eq!(RegisterValue::decode(&encoded).unwrap(), value);
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut encoded = RegisterValue::Long(100).encode();
        encoded.push(0x00);
        assert!(RegisterValue::decode(&encoded).is_err());
    }

    #[test]
    fn decode_rejects_truncated_collection() {
        // Claims two points, carries one.
        let mut encoded = vec![TAG_POINT_COLL, 0x02];
        encoded.extend_from_slice(&Point::generator().encode());
        assert!(RegisterValue::decode(&encoded).is_err());
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert!(RegisterValue::decode(&[0x42, 0x00]).is_err());
    }

    #[test]
    fn group_element_register() {
        let value = RegisterValue::GroupElement(nums_h());
        let encoded = value.encode();
        assert_eq!(encoded[0], TAG_GROUP_ELEMENT);
        assert_eq!(encoded.len(), 34);
        assert_eq!(RegisterValue::decode(&encoded).unwrap(), value);
    }
}

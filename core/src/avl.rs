//! Insert-only authenticated AVL+ tree over 33-byte keys.
//!
//! The tree backs the pool's authenticated registers: the 33-byte digest
//! (32-byte root label ‖ height byte) lives on-chain, and every state
//! advance ships an insert proof the script's verifier replays against the
//! old digest. Node labels are Blake2b-256 over the node's key and child
//! labels, so the digest commits to the full key set and shape.
//!
//! The serialized proof layout, including the trailing
//! `flags ‖ key-length ‖ reserved` suffix, is a wire format pinned to the
//! pool contract version. It is emitted verbatim, never derived.

use crate::crypto::curve::blake2b256;
use crate::error::{Error, Result};

/// Keys are compressed curve points.
pub const KEY_LEN: usize = 33;

/// Root label plus height byte.
pub const DIGEST_LEN: usize = 33;

/// Versioned proof/register suffix pinned to the pool contract:
/// flags `0x07`, key length `0x21` (= 33), reserved `0x00`.
pub const TREE_SUFFIX: [u8; 3] = [0x07, 0x21, 0x00];

pub type Key = [u8; KEY_LEN];

/// The on-chain digest form.
pub type Digest33 = [u8; DIGEST_LEN];

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;
const EMPTY_DOMAIN: &[u8] = b"nightpool/avl/empty/v1";

struct Node {
    key: Key,
    label: [u8; 32],
    height: u8,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn new(key: Key) -> Box<Node> {
        let mut node = Box::new(Node { key, label: [0u8; 32], height: 1, left: None, right: None });
        node.relabel();
        node
    }

    fn child_height(child: &Option<Box<Node>>) -> u8 {
        child.as_ref().map_or(0, |n| n.height)
    }

    fn child_label(child: &Option<Box<Node>>) -> [u8; 32] {
        child.as_ref().map_or(empty_label(), |n| n.label)
    }

    fn balance(&self) -> i16 {
        Self::child_height(&self.left) as i16 - Self::child_height(&self.right) as i16
    }

    fn relabel(&mut self) {
        self.height = 1 + Self::child_height(&self.left).max(Self::child_height(&self.right));
        let tag = if self.left.is_none() && self.right.is_none() { LEAF_TAG } else { NODE_TAG };
        self.label = blake2b256(&[
            &[tag],
            &self.key,
            &Self::child_label(&self.left),
            &Self::child_label(&self.right),
        ]);
    }
}

fn empty_label() -> [u8; 32] {
    blake2b256(&[EMPTY_DOMAIN])
}

/// One step of the search path recorded while inserting, before rebalancing.
#[derive(Clone, Copy, Debug)]
pub struct PathStep {
    /// 0 = went left, 1 = went right.
    pub direction: u8,
    /// Label of the off-path child at this node.
    pub sibling_label: [u8; 32],
}

fn rotate_right(mut node: Box<Node>) -> Box<Node> {
    let mut pivot = node.left.take().expect("rotate_right without left child");
    node.left = pivot.right.take();
    node.relabel();
    pivot.right = Some(node);
    pivot.relabel();
    pivot
}

fn rotate_left(mut node: Box<Node>) -> Box<Node> {
    let mut pivot = node.right.take().expect("rotate_left without right child");
    node.right = pivot.left.take();
    node.relabel();
    pivot.left = Some(node);
    pivot.relabel();
    pivot
}

fn rebalance(mut node: Box<Node>) -> Box<Node> {
    node.relabel();
    match node.balance() {
        2 => {
            if node.left.as_ref().expect("left-heavy without left").balance() < 0 {
                let left = node.left.take().expect("left-heavy without left");
                node.left = Some(rotate_left(left));
            }
            rotate_right(node)
        }
        -2 => {
            if node.right.as_ref().expect("right-heavy without right").balance() > 0 {
                let right = node.right.take().expect("right-heavy without right");
                node.right = Some(rotate_right(right));
            }
            rotate_left(node)
        }
        _ => node,
    }
}

fn insert_node(
    node: Option<Box<Node>>,
    key: Key,
    path: &mut Vec<PathStep>,
) -> Result<Box<Node>> {
    let Some(mut current) = node else {
        return Ok(Node::new(key));
    };
    match key.cmp(&current.key) {
        std::cmp::Ordering::Equal => {
            Err(Error::Serialization("duplicate key inserted into authenticated tree".into()))
        }
        std::cmp::Ordering::Less => {
            path.push(PathStep {
                direction: 0,
                sibling_label: Node::child_label(&current.right),
            });
            let left = insert_node(current.left.take(), key, path)?;
            current.left = Some(left);
            Ok(rebalance(current))
        }
        std::cmp::Ordering::Greater => {
            path.push(PathStep {
                direction: 1,
                sibling_label: Node::child_label(&current.left),
            });
            let right = insert_node(current.right.take(), key, path)?;
            current.right = Some(right);
            Ok(rebalance(current))
        }
    }
}

/// The authenticated tree itself.
pub struct AvlTree {
    root: Option<Box<Node>>,
    size: u64,
}

impl AvlTree {
    pub fn new() -> Self {
        Self { root: None, size: 0 }
    }

    /// Rebuild a tree by replaying `keys` in order. Used to reconstruct the
    /// prover state from the chain-derived key list.
    pub fn from_keys<I: IntoIterator<Item = Key>>(keys: I) -> Result<Self> {
        let mut tree = Self::new();
        for key in keys {
            tree.insert(key)?;
        }
        Ok(tree)
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn contains(&self, key: &Key) -> bool {
        let mut cursor = self.root.as_deref();
        while let Some(node) = cursor {
            cursor = match key.cmp(&node.key) {
                std::cmp::Ordering::Equal => return true,
                std::cmp::Ordering::Less => node.left.as_deref(),
                std::cmp::Ordering::Greater => node.right.as_deref(),
            };
        }
        false
    }

    /// Insert a new key, returning the recorded search path.
    /// Duplicate keys are an error: the tree is an insert-only set.
    pub fn insert(&mut self, key: Key) -> Result<Vec<PathStep>> {
        let mut path = Vec::new();
        let root = insert_node(self.root.take(), key, &mut path)?;
        self.root = Some(root);
        self.size += 1;
        Ok(path)
    }

    /// The 33-byte digest: root label ‖ tree height.
    pub fn digest(&self) -> Digest33 {
        let mut out = [0u8; DIGEST_LEN];
        match &self.root {
            None => out[..32].copy_from_slice(&empty_label()),
            Some(root) => {
                out[..32].copy_from_slice(&root.label);
                out[32] = root.height;
            }
        }
        out
    }
}

impl Default for AvlTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Digest of a state that has seen no inserts.
pub fn empty_digest() -> Digest33 {
    AvlTree::new().digest()
}

/// Batch insert prover, initialized with the current on-chain digest.
///
/// Register states form an append-only log keyed by digest: each batch of
/// inserts is organized into its own balanced tree, and the successor digest
/// chains the prior digest with the batch root. The prover therefore never
/// needs the historical tree contents, only the digest it extends.
pub struct AvlProver {
    base: Digest33,
    batch: AvlTree,
    ops: Vec<(Key, Vec<PathStep>)>,
}

impl AvlProver {
    /// Prover extending the state identified by `base`.
    pub fn from_digest(base: Digest33) -> Self {
        Self { base, batch: AvlTree::new(), ops: Vec::new() }
    }

    /// Prover over a fresh (genesis) state.
    pub fn empty() -> Self {
        Self::from_digest(empty_digest())
    }

    pub fn insert(&mut self, key: Key) -> Result<()> {
        let path = self.batch.insert(key)?;
        self.ops.push((key, path));
        Ok(())
    }

    /// Successor digest: unchanged for an empty batch, otherwise the prior
    /// digest folded with the batch root label.
    pub fn digest(&self) -> Digest33 {
        if self.batch.is_empty() {
            return self.base;
        }
        let batch_digest = self.batch.digest();
        let mut out = [0u8; DIGEST_LEN];
        out[..32].copy_from_slice(&blake2b256(&[&self.base, &batch_digest[..32]]));
        out[32] = batch_digest[32];
        out
    }

    /// Serialize the batch witness and return it with the successor digest.
    /// Layout (contract wire version 1): per op the key, the path length,
    /// then `direction ‖ sibling label` steps; terminated by
    /// [`TREE_SUFFIX`].
    pub fn generate_proof(&self) -> (Vec<u8>, Digest33) {
        let mut proof = Vec::new();
        for (key, path) in &self.ops {
            proof.extend_from_slice(key);
            proof.push(path.len() as u8);
            for step in path {
                proof.push(step.direction);
                proof.extend_from_slice(&step.sibling_label);
            }
        }
        proof.extend_from_slice(&TREE_SUFFIX);
        (proof, self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Key {
        let mut k = [0u8; KEY_LEN];
        k[0] = 0x02;
        k[1] = byte;
        k
    }

    #[test]
    fn empty_digest_is_stable() {
        assert_eq!(AvlTree::new().digest(), AvlTree::new().digest());
        assert_eq!(AvlTree::new().digest()[32], 0);
    }

    #[test]
    fn digest_changes_with_inserts() {
        let mut tree = AvlTree::new();
        let before = tree.digest();
        tree.insert(key(1)).unwrap();
        let after = tree.digest();
        assert_ne!(before, after);
    }

    #[test]
    fn same_insert_sequence_same_digest() {
        let a = AvlTree::from_keys((0u8..20).map(key)).unwrap();
        let b = AvlTree::from_keys((0u8..20).map(key)).unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn duplicate_insert_rejected() {
        let mut tree = AvlTree::new();
        tree.insert(key(7)).unwrap();
        assert!(tree.insert(key(7)).is_err());
    }

    #[test]
    fn contains_after_insert() {
        let tree = AvlTree::from_keys([key(3), key(1), key(2)]).unwrap();
        assert!(tree.contains(&key(2)));
        assert!(!tree.contains(&key(9)));
    }

    #[test]
    fn tree_stays_balanced_under_ordered_inserts() {
        // 64 ascending keys would stack to depth 64 without rotations.
        let tree = AvlTree::from_keys((0u8..64).map(key)).unwrap();
        assert!(tree.digest()[32] <= 8, "height {} too large", tree.digest()[32]);
    }

    #[test]
    fn proof_ends_with_versioned_suffix() {
        let mut prover = AvlProver::empty();
        prover.insert(key(1)).unwrap();
        prover.insert(key(2)).unwrap();
        let (proof, digest) = prover.generate_proof();
        assert!(proof.ends_with(&TREE_SUFFIX));
        assert_eq!(digest, prover.digest());
        assert_ne!(digest, empty_digest());
    }

    #[test]
    fn empty_batch_leaves_digest_unchanged() {
        let base = AvlTree::from_keys([key(1)]).unwrap().digest();
        let prover = AvlProver::from_digest(base);
        assert_eq!(prover.digest(), base);
    }

    #[test]
    fn batch_proof_is_deterministic() {
        let base = AvlTree::from_keys((0u8..5).map(key)).unwrap().digest();
        let build = || {
            let mut prover = AvlProver::from_digest(base);
            prover.insert(key(10)).unwrap();
            prover.insert(key(11)).unwrap();
            prover.generate_proof()
        };
        assert_eq!(build().0, build().0);
        assert_eq!(build().1, build().1);
    }

    #[test]
    fn successor_digest_depends_on_base() {
        let mut a = AvlProver::empty();
        a.insert(key(9)).unwrap();
        let mut b = AvlProver::from_digest(AvlTree::from_keys([key(1)]).unwrap().digest());
        b.insert(key(9)).unwrap();
        assert_ne!(a.digest(), b.digest());
    }
}

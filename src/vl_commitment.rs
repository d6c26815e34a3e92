//! Commitment Tree
//!
//! Binary hash tree over the entries of a block.
//!
//! - Leaf: `BLAKE3(canonical entry encoding)`
//! - Node: `BLAKE3(left_hex || right_hex)` - the two hex strings concatenated
//! - Odd level: the last hash is duplicated before pairing
//! - No entries: `BLAKE3("")`
//!
//! Entry order is part of the commitment. Not used on the append path - audits
//! build a tree on demand from stored blocks.

use serde::{Deserialize, Serialize};

use crate::vl_interface::{Entry, HexDigest};

/// Which side of the running hash the sibling sits on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: HexDigest,
    pub side: Side,
}

/// Authentication path from a leaf to the root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    pub leaf_index: usize,
    pub leaf_hash: HexDigest,
    /// Sibling hashes, leaf level first
    pub path: Vec<ProofStep>,
}

impl MembershipProof {
    /// Fold the path over the leaf hash.
    ///
    /// Returns `None` if a step's side disagrees with the claimed leaf index.
    pub fn compute_root(&self) -> Option<HexDigest> {
        let mut acc = self.leaf_hash.clone();
        let mut position = self.leaf_index;

        for step in &self.path {
            let expected = if position % 2 == 0 { Side::Right } else { Side::Left };
            if step.side != expected {
                return None;
            }
            acc = match step.side {
                Side::Left => node_hash(&step.sibling, &acc),
                Side::Right => node_hash(&acc, &step.sibling),
            };
            position /= 2;
        }

        Some(acc)
    }
}

pub fn leaf_hash(entry: &Entry) -> HexDigest {
    blake3::hash(&entry.canonical_bytes()).to_hex().to_string()
}

fn node_hash(left: &str, right: &str) -> HexDigest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Digest of an empty entry list
pub fn empty_digest() -> HexDigest {
    blake3::hash(b"").to_hex().to_string()
}

/// Commitment digest over `entries`
pub fn commit(entries: &[Entry]) -> HexDigest {
    CommitmentTree::build(entries).root().to_string()
}

/// Build the proof for `entry` if it is committed in `entries` under `digest`
pub fn prove_membership(
    entries: &[Entry],
    entry: &Entry,
    digest: &str,
) -> Option<MembershipProof> {
    let tree = CommitmentTree::build(entries);
    if tree.root() != digest {
        return None;
    }
    let proof = tree.prove_entry(entry)?;
    verify_membership(entry, &proof, digest).then_some(proof)
}

/// Recompute the root from `entry` and `proof`; true only if it equals `digest`
pub fn verify_membership(entry: &Entry, proof: &MembershipProof, digest: &str) -> bool {
    if leaf_hash(entry) != proof.leaf_hash {
        return false;
    }
    match proof.compute_root() {
        Some(root) => root == digest,
        None => false,
    }
}

/// All levels of the tree, leaves first, root level last
pub struct CommitmentTree {
    levels: Vec<Vec<HexDigest>>,
    leaf_count: usize,
}

impl CommitmentTree {
    pub fn build(entries: &[Entry]) -> Self {
        if entries.is_empty() {
            return Self {
                levels: vec![vec![empty_digest()]],
                leaf_count: 0,
            };
        }

        let mut current: Vec<HexDigest> = entries.iter().map(leaf_hash).collect();
        let mut levels = Vec::new();

        while current.len() > 1 {
            if current.len() % 2 != 0 {
                let last = current[current.len() - 1].clone();
                current.push(last);
            }
            let next = current
                .chunks(2)
                .map(|pair| node_hash(&pair[0], &pair[1]))
                .collect();
            levels.push(current);
            current = next;
        }
        levels.push(current);

        Self {
            levels,
            leaf_count: entries.len(),
        }
    }

    pub fn root(&self) -> &str {
        // build() always leaves exactly one hash on the top level
        &self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Authentication path for the leaf at `leaf_index`
    pub fn prove(&self, leaf_index: usize) -> Option<MembershipProof> {
        if leaf_index >= self.leaf_count {
            return None;
        }

        let mut path = Vec::with_capacity(self.levels.len() - 1);
        let mut position = leaf_index;

        // every level below the root was padded to an even length during build
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling, side) = if position % 2 == 0 {
                (&level[position + 1], Side::Right)
            } else {
                (&level[position - 1], Side::Left)
            };
            path.push(ProofStep {
                sibling: sibling.clone(),
                side,
            });
            position /= 2;
        }

        Some(MembershipProof {
            leaf_index,
            leaf_hash: self.levels[0][leaf_index].clone(),
            path,
        })
    }

    /// Proof for the first leaf matching `entry`
    pub fn prove_entry(&self, entry: &Entry) -> Option<MembershipProof> {
        let wanted = leaf_hash(entry);
        let position = self.levels[0][..self.leaf_count]
            .iter()
            .position(|h| *h == wanted)?;
        self.prove(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u8) -> Entry {
        Entry::new(
            format!("{:02x}00000000000000", n),
            vec![n, n, n],
            vec![0xAA, n],
            "2024-03-01T10:00:00Z",
            "1234567890abcdef",
        )
    }

    fn entries(count: u8) -> Vec<Entry> {
        (0..count).map(entry).collect()
    }

    #[test]
    fn test_empty_commitment() {
        assert_eq!(commit(&[]), empty_digest());
        assert_eq!(
            empty_digest(),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn test_single_entry_root_is_leaf() {
        let e = entry(1);
        assert_eq!(commit(&[e.clone()]), leaf_hash(&e));
    }

    #[test]
    fn test_order_sensitive() {
        let (a, b, c) = (entry(1), entry(2), entry(3));
        let forward = commit(&[a.clone(), b.clone(), c.clone()]);
        let backward = commit(&[c, b, a]);
        assert_ne!(forward, backward);
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let (a, b, c) = (entry(1), entry(2), entry(3));
        let ab = node_hash(&leaf_hash(&a), &leaf_hash(&b));
        let cc = node_hash(&leaf_hash(&c), &leaf_hash(&c));
        assert_eq!(commit(&[a, b, c]), node_hash(&ab, &cc));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        for size in 1..=9u8 {
            let list = entries(size);
            let tree = CommitmentTree::build(&list);
            let root = tree.root().to_string();
            assert_eq!(root, commit(&list));

            for (i, e) in list.iter().enumerate() {
                let proof = tree.prove(i).unwrap();
                assert_eq!(proof.leaf_index, i);
                assert!(
                    verify_membership(e, &proof, &root),
                    "leaf {} of {} failed",
                    i,
                    size
                );
            }
            assert!(tree.prove(size as usize).is_none());
        }
    }

    #[test]
    fn test_proof_rejects_wrong_entry() {
        let list = entries(5);
        let tree = CommitmentTree::build(&list);
        let proof = tree.prove(2).unwrap();

        assert!(!verify_membership(&list[3], &proof, tree.root()));
        assert!(!verify_membership(&entry(42), &proof, tree.root()));
    }

    #[test]
    fn test_proof_rejects_tampered_path() {
        let list = entries(6);
        let tree = CommitmentTree::build(&list);
        let root = tree.root().to_string();

        // altered sibling
        let mut proof = tree.prove(1).unwrap();
        proof.path[1].sibling = leaf_hash(&entry(99));
        assert!(!verify_membership(&list[1], &proof, &root));

        // flipped side
        let mut proof = tree.prove(1).unwrap();
        proof.path[0].side = Side::Right;
        assert!(!verify_membership(&list[1], &proof, &root));

        // wrong root
        let proof = tree.prove(1).unwrap();
        assert!(!verify_membership(&list[1], &proof, &empty_digest()));
    }

    #[test]
    fn test_prove_membership_against_digest() {
        let list = entries(4);
        let digest = commit(&list);

        let proof = prove_membership(&list, &list[3], &digest).unwrap();
        assert_eq!(proof.leaf_index, 3);

        assert!(prove_membership(&list, &entry(77), &digest).is_none());
        assert!(prove_membership(&list, &list[0], &empty_digest()).is_none());
    }

    #[test]
    fn test_empty_tree_has_no_proofs() {
        let tree = CommitmentTree::build(&[]);
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.prove(0).is_none());
        assert!(tree.prove_entry(&entry(1)).is_none());
    }
}

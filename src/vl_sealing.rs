//! Entry Sealing
//!
//! Content hashing and proof-of-work for blocks.
//!
//! # Process
//! 1. Encode the block pre-image canonically (see `vl_interface`)
//! 2. Hash `prefix || nonce || "}"` with BLAKE3
//! 3. Increment the nonce until the hex digest starts with `difficulty` zeros
//!
//! The prefix (everything before the nonce digits) is fed to the hasher once;
//! every attempt clones the hasher state and only adds the nonce. Sealing is
//! fully deterministic, so any party can re-verify a block without re-mining.

use std::time::Instant;

use serde::Serialize;

use crate::vl_error::SealError;
use crate::vl_interface::{
    encode_canonical, Block, BlockIndex, CanonicalEntry, Difficulty, HexDigest, Nonce,
};

/// Log mining progress every this many attempts
const PROGRESS_INTERVAL: u64 = 250_000;

/// Block pre-image without the nonce - serde keeps this field order
#[derive(Serialize)]
struct BlockHeader<'a> {
    index: BlockIndex,
    entries: Vec<CanonicalEntry<'a>>,
    timestamp: &'a str,
    previous_hash: &'a str,
}

/// Hasher primed with everything in the canonical encoding up to the nonce value
struct Preimage {
    hasher: blake3::Hasher,
}

impl Preimage {
    fn of(block: &Block) -> Self {
        let header = BlockHeader {
            index: block.index,
            entries: block.entries.iter().map(|e| e.canonical()).collect(),
            timestamp: &block.timestamp,
            previous_hash: &block.previous_hash,
        };

        // {"index":..,"previous_hash":".."} -> {"index":..,"previous_hash":"..","nonce":
        let mut prefix = encode_canonical(&header);
        prefix.pop();
        prefix.extend_from_slice(b",\"nonce\":");

        let mut hasher = blake3::Hasher::new();
        hasher.update(&prefix);
        Self { hasher }
    }

    fn digest(&self, nonce: Nonce) -> HexDigest {
        let mut hasher = self.hasher.clone();
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(b"}");
        hasher.finalize().to_hex().to_string()
    }
}

/// Recompute the content hash of a block from its stored fields
pub fn compute_hash(block: &Block) -> HexDigest {
    Preimage::of(block).digest(block.nonce)
}

/// Number of leading `'0'` hex characters
pub fn leading_zero_digits(hash: &str) -> usize {
    hash.bytes().take_while(|b| *b == b'0').count()
}

/// Check that the first `difficulty` hex characters are all `'0'`
pub fn meets_difficulty(hash: &str, difficulty: Difficulty) -> bool {
    leading_zero_digits(hash) >= difficulty as usize
}

/// Seal a block: search nonces (starting at the block's current nonce) until the
/// hash meets `difficulty`. Sets `nonce` and `hash` on the block and returns the hash.
///
/// Unbounded - see [`seal_bounded`] for a capped search.
pub fn seal(block: &mut Block, difficulty: Difficulty) -> HexDigest {
    match search(block, difficulty, None) {
        Ok(hash) => hash,
        // without a cap the search only returns once it found a nonce
        Err(_) => unreachable!("unbounded nonce search can not hit a cap"),
    }
}

/// Seal with a soft iteration cap.
///
/// On `IterationCapExceeded` the block is left unsealed (nonce advanced past the
/// attempts made, hash cleared) so a retry continues where the search stopped.
pub fn seal_bounded(
    block: &mut Block,
    difficulty: Difficulty,
    max_iterations: u64,
) -> Result<HexDigest, SealError> {
    search(block, difficulty, Some(max_iterations))
}

fn search(
    block: &mut Block,
    difficulty: Difficulty,
    cap: Option<u64>,
) -> Result<HexDigest, SealError> {
    let preimage = Preimage::of(block);
    let start = Instant::now();
    let mut attempts = 0u64;
    let mut nonce = block.nonce;

    loop {
        if let Some(cap) = cap {
            if attempts >= cap {
                log::warn!(
                    "Sealing block {} gave up after {} attempts (difficulty {})",
                    block.index,
                    attempts,
                    difficulty
                );
                block.nonce = nonce;
                block.hash.clear();
                return Err(SealError::IterationCapExceeded {
                    iterations: attempts,
                    difficulty,
                });
            }
        }

        attempts += 1;
        let hash = preimage.digest(nonce);

        if meets_difficulty(&hash, difficulty) {
            log::debug!(
                "Block {} sealed after {} attempts in {:.3}s (nonce {})",
                block.index,
                attempts,
                start.elapsed().as_secs_f64(),
                nonce
            );
            block.nonce = nonce;
            block.hash = hash.clone();
            return Ok(hash);
        }

        if attempts % PROGRESS_INTERVAL == 0 {
            log::debug!(
                "Sealing block {}: {} attempts, {:.2}s elapsed",
                block.index,
                attempts,
                start.elapsed().as_secs_f64()
            );
        }

        nonce = nonce.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vl_interface::{Entry, GENESIS_PREVIOUS_HASH};

    fn entry(id: &str) -> Entry {
        Entry::new(
            id,
            vec![1, 2, 3],
            vec![9, 9],
            "2024-03-01T10:00:00Z",
            "abcdef0123456789",
        )
    }

    fn candidate() -> Block {
        Block::candidate(
            1,
            vec![entry("00112233aabbccdd")],
            "2024-03-01T10:00:01Z",
            "00ab",
        )
    }

    #[test]
    fn test_hash_matches_full_canonical_encoding() {
        // The primed-prefix digest must equal hashing the whole pre-image at once
        #[derive(Serialize)]
        struct Full<'a> {
            index: BlockIndex,
            entries: Vec<CanonicalEntry<'a>>,
            timestamp: &'a str,
            previous_hash: &'a str,
            nonce: Nonce,
        }

        let mut block = candidate();
        block.nonce = 4711;
        let full = Full {
            index: block.index,
            entries: block.entries.iter().map(|e| e.canonical()).collect(),
            timestamp: &block.timestamp,
            previous_hash: &block.previous_hash,
            nonce: block.nonce,
        };
        let expected = blake3::hash(&serde_json::to_vec(&full).unwrap())
            .to_hex()
            .to_string();

        assert_eq!(compute_hash(&block), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn test_compute_hash_deterministic() {
        let block = candidate();
        assert_eq!(compute_hash(&block), compute_hash(&block.clone()));
    }

    #[test]
    fn test_every_field_changes_hash() {
        let base = candidate();
        let h = compute_hash(&base);

        let mut b = base.clone();
        b.index += 1;
        assert_ne!(compute_hash(&b), h);

        let mut b = base.clone();
        b.timestamp.push('0');
        assert_ne!(compute_hash(&b), h);

        let mut b = base.clone();
        b.previous_hash = GENESIS_PREVIOUS_HASH.to_string();
        assert_ne!(compute_hash(&b), h);

        let mut b = base.clone();
        b.nonce += 1;
        assert_ne!(compute_hash(&b), h);

        let mut b = base.clone();
        b.entries[0].encrypted_choice[0] ^= 0x01;
        assert_ne!(compute_hash(&b), h);

        let mut b = base.clone();
        b.entries[0].signature.push(0);
        assert_ne!(compute_hash(&b), h);

        // annotations are not part of the encoding
        let mut b = base.clone();
        b.entries[0] = b.entries[0].clone().with_annotation("tag", "x");
        assert_eq!(compute_hash(&b), h);
    }

    #[test]
    fn test_seal_meets_difficulty() {
        for difficulty in 0..=3 {
            let mut block = candidate();
            let hash = seal(&mut block, difficulty);

            assert_eq!(block.hash, hash);
            assert!(meets_difficulty(&hash, difficulty));
            assert!(hash.starts_with(&"0".repeat(difficulty as usize)));
            // sealing is verifiable by recomputation
            assert_eq!(compute_hash(&block), hash);
        }
    }

    #[test]
    fn test_seal_is_deterministic() {
        let mut a = candidate();
        let mut b = candidate();
        assert_eq!(seal(&mut a, 2), seal(&mut b, 2));
        assert_eq!(a.nonce, b.nonce);
    }

    #[test]
    fn test_resealing_with_higher_difficulty_never_loses_zeros() {
        let mut block = candidate();
        let mut previous_zeros = 0;

        for difficulty in 1..=3 {
            let hash = seal(&mut block, difficulty);
            let zeros = leading_zero_digits(&hash);
            assert!(zeros >= difficulty as usize);
            assert!(zeros >= previous_zeros);
            previous_zeros = zeros;
        }
    }

    #[test]
    fn test_seal_bounded_gives_up() {
        // 64 zero digits will never be found in 10 attempts
        let mut block = candidate();
        let result = seal_bounded(&mut block, 64, 10);

        assert_eq!(
            result,
            Err(SealError::IterationCapExceeded {
                iterations: 10,
                difficulty: 64
            })
        );
        assert!(block.hash.is_empty());
        assert_eq!(block.nonce, 10);
    }

    #[test]
    fn test_seal_bounded_succeeds_within_cap() {
        let mut block = candidate();
        let hash = seal_bounded(&mut block, 1, 1_000_000).unwrap();
        assert!(meets_difficulty(&hash, 1));
    }

    #[test]
    fn test_difficulty_check() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("00ab", 3));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("0", 2));
        assert_eq!(leading_zero_digits("000f00"), 3);
    }
}

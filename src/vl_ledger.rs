//! Ledger Module
//!
//! Ordered, hash-linked sequence of sealed blocks. Block 0 is an empty genesis
//! block created once at construction; after that the chain only grows at the tail.
//!
//! # Locking
//! - `writer` serialises everything that moves the tail: `append`,
//!   `replace_chain`, `extend_with`. Sealing runs while holding only this lock.
//! - `state` is read-locked by every query and write-locked only for the final
//!   push/swap, so readers never wait on mining and never see a half-appended block.

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::vl_commitment::{self, CommitmentTree, MembershipProof};
use crate::vl_config::LedgerConfig;
use crate::vl_error::{IntegrityFailure, LedgerError, SealError};
use crate::vl_interface::{
    now_timestamp, Block, BlockIndex, Difficulty, Entry, EntryLocation, HexDigest, LedgerStats,
    LocatedEntry, GENESIS_PREVIOUS_HASH,
};
use crate::vl_sealing::{compute_hash, meets_difficulty, seal, seal_bounded};

/// Result of offering a whole peer chain to [`Ledger::replace_chain`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local chain replaced
    Adopted { previous_len: usize, new_len: usize },
    /// Peer chain not strictly longer - local chain kept
    RejectedShorter { local_len: usize, peer_len: usize },
    /// Peer chain failed validation - local chain kept
    RejectedInvalid(IntegrityFailure),
}

impl SyncOutcome {
    pub fn is_adopted(&self) -> bool {
        matches!(self, SyncOutcome::Adopted { .. })
    }
}

/// Result of offering a single announced block to [`Ledger::extend_with`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendOutcome {
    /// Block linked onto our tail and was appended
    Extended,
    /// We already hold this exact block
    AlreadyKnown,
    /// Block does not link onto our tail (gap or fork) - a full resolve is needed
    NeedsResolve,
    /// Block links but does not verify
    Rejected(IntegrityFailure),
}

/// An entry together with its inclusion proof against the block commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryProof {
    pub located: LocatedEntry,
    pub commitment: HexDigest,
    pub proof: MembershipProof,
}

/// Validate a chain under `difficulty`.
///
/// Checks genesis shape, then walks from index 1 checking (in order) position,
/// recomputed hash, link to the predecessor and proof-of-work. Stops at the
/// first failure.
pub fn validate_chain(blocks: &[Block], difficulty: Difficulty) -> Result<(), IntegrityFailure> {
    let genesis = blocks.first().ok_or(IntegrityFailure::EmptyChain)?;

    if genesis.index != 0
        || genesis.previous_hash != GENESIS_PREVIOUS_HASH
        || !genesis.entries.is_empty()
        || compute_hash(genesis) != genesis.hash
    {
        return Err(IntegrityFailure::MalformedGenesis);
    }
    if !meets_difficulty(&genesis.hash, difficulty) {
        return Err(IntegrityFailure::DifficultyUnmet {
            index: 0,
            difficulty,
        });
    }

    for (position, pair) in blocks.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let position = position + 1;

        if current.index != position as BlockIndex {
            return Err(IntegrityFailure::IndexMismatch {
                position,
                claimed: current.index,
            });
        }
        if current.hash != compute_hash(current) {
            return Err(IntegrityFailure::HashMismatch {
                index: current.index,
            });
        }
        if current.previous_hash != previous.hash {
            return Err(IntegrityFailure::BrokenLink {
                index: current.index,
            });
        }
        if !meets_difficulty(&current.hash, difficulty) {
            return Err(IntegrityFailure::DifficultyUnmet {
                index: current.index,
                difficulty,
            });
        }
    }

    Ok(())
}

/// Chain plus the identity index kept in step with it
struct ChainState {
    blocks: Vec<Block>,
    identities: HashMap<HexDigest, EntryLocation>,
    total_entries: usize,
}

impl ChainState {
    fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut state = ChainState {
            blocks: Vec::with_capacity(blocks.len()),
            identities: HashMap::new(),
            total_entries: 0,
        };
        for block in blocks {
            state.push(block);
        }
        state
    }

    fn push(&mut self, block: Block) {
        for (position, entry) in block.entries.iter().enumerate() {
            // first occurrence wins
            self.identities
                .entry(entry.identity_hash.clone())
                .or_insert(EntryLocation {
                    block_index: block.index,
                    position,
                });
        }
        self.total_entries += block.entries.len();
        self.blocks.push(block);
    }

    fn tail(&self) -> &Block {
        // never empty: genesis is pushed at construction and swaps require a valid chain
        &self.blocks[self.blocks.len() - 1]
    }
}

/// Thread-safe, append-only ledger
pub struct Ledger {
    config: LedgerConfig,
    writer: Mutex<()>,
    state: RwLock<ChainState>,
}

impl Ledger {
    /// Create a ledger and seal its genesis block
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::new_at(config, now_timestamp())
    }

    /// Like [`Ledger::new`] with a fixed genesis timestamp - two ledgers created
    /// with the same config and timestamp share an identical genesis block
    pub fn new_at(config: LedgerConfig, genesis_timestamp: String) -> Result<Self, LedgerError> {
        config.check()?;
        let genesis = Self::genesis(&config, genesis_timestamp)?;

        log::info!(
            "Genesis block sealed: {} (difficulty {})",
            genesis.hash,
            config.difficulty
        );

        Ok(Self {
            config,
            writer: Mutex::new(()),
            state: RwLock::new(ChainState::from_blocks(vec![genesis])),
        })
    }

    fn genesis(config: &LedgerConfig, timestamp: String) -> Result<Block, SealError> {
        let mut block = Block::candidate(0, Vec::new(), timestamp, GENESIS_PREVIOUS_HASH);
        Self::seal_with(config, &mut block)?;
        Ok(block)
    }

    /// Rebuild a ledger from existing blocks. The chain must validate under `config`.
    pub fn from_blocks(blocks: Vec<Block>, config: LedgerConfig) -> Result<Self, LedgerError> {
        config.check()?;
        validate_chain(&blocks, config.difficulty)?;
        Ok(Self {
            config,
            writer: Mutex::new(()),
            state: RwLock::new(ChainState::from_blocks(blocks)),
        })
    }

    /// Inverse of [`Ledger::export`]
    pub fn import(json: &str, config: LedgerConfig) -> Result<Self, LedgerError> {
        let blocks: Vec<Block> = serde_json::from_str(json)?;
        Self::from_blocks(blocks, config)
    }

    fn seal_with(config: &LedgerConfig, block: &mut Block) -> Result<HexDigest, SealError> {
        match config.max_seal_iterations {
            Some(cap) => seal_bounded(block, config.difficulty, cap),
            None => Ok(seal(block, config.difficulty)),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn difficulty(&self) -> Difficulty {
        self.config.difficulty
    }

    /// Append `entry` in a new block stamped with the current time.
    ///
    /// Unconditional: the caller is responsible for duplicate and fraud checks.
    pub fn append(&self, entry: Entry) -> Result<Block, LedgerError> {
        self.append_at(entry, now_timestamp())
    }

    /// Append with an explicit block timestamp
    pub fn append_at(&self, entry: Entry, timestamp: String) -> Result<Block, LedgerError> {
        let _writer = self.writer.lock();

        let (index, previous_hash) = {
            let state = self.state.read();
            (state.blocks.len() as BlockIndex, state.tail().hash.clone())
        };

        let mut block = Block::candidate(index, vec![entry], timestamp, previous_hash);
        Self::seal_with(&self.config, &mut block)?;

        log::debug!("Appended block {} ({})", block.index, block.hash);

        self.state.write().push(block.clone());
        Ok(block)
    }

    /// Integrity check over the whole chain. Read-only.
    pub fn validate(&self) -> bool {
        self.validate_report().is_ok()
    }

    /// Like [`Ledger::validate`] but reports the first failure
    pub fn validate_report(&self) -> Result<(), IntegrityFailure> {
        let state = self.state.read();
        let result = validate_chain(&state.blocks, self.config.difficulty);
        if let Err(ref failure) = result {
            log::warn!("Ledger integrity failure: {}", failure);
        }
        result
    }

    /// First entry recorded for `identity_hash`, if any
    pub fn find_by_identity_hash(&self, identity_hash: &str) -> Option<LocatedEntry> {
        let state = self.state.read();
        let location = state.identities.get(identity_hash)?;
        let block = state.blocks.get(location.block_index as usize)?;
        let entry = block.entries.get(location.position)?;

        Some(LocatedEntry {
            block_index: block.index,
            block_hash: block.hash.clone(),
            position: location.position,
            entry: entry.clone(),
        })
    }

    pub fn block_by_index(&self, index: BlockIndex) -> Option<Block> {
        let state = self.state.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| state.blocks.get(i))
            .cloned()
    }

    /// Linear scan
    pub fn block_by_hash(&self, hash: &str) -> Option<Block> {
        self.state
            .read()
            .blocks
            .iter()
            .find(|b| b.hash == hash)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().blocks.is_empty()
    }

    pub fn tail(&self) -> Block {
        self.state.read().tail().clone()
    }

    /// All entries in block order (genesis has none)
    pub fn entries(&self) -> Vec<Entry> {
        self.state
            .read()
            .blocks
            .iter()
            .flat_map(|b| b.entries.iter().cloned())
            .collect()
    }

    /// Consistent copy of the chain
    pub fn snapshot(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }

    /// Full chain as pretty JSON, index 0 first
    pub fn export(&self) -> Result<String, LedgerError> {
        let state = self.state.read();
        Ok(serde_json::to_string_pretty(&state.blocks)?)
    }

    pub fn stats(&self) -> LedgerStats {
        let state = self.state.read();
        LedgerStats {
            total_blocks: state.blocks.len(),
            total_entries: state.total_entries,
            chain_valid: validate_chain(&state.blocks, self.config.difficulty).is_ok(),
            difficulty: self.config.difficulty,
            latest_block_hash: state.tail().hash.clone(),
            genesis_block_hash: state.blocks[0].hash.clone(),
        }
    }

    /// Commitment digest over the entries of block `index`
    pub fn block_commitment(&self, index: BlockIndex) -> Option<HexDigest> {
        self.block_by_index(index)
            .map(|block| vl_commitment::commit(&block.entries))
    }

    /// Locate `identity_hash` and prove its entry against the block commitment
    pub fn prove_entry(&self, identity_hash: &str) -> Option<EntryProof> {
        let located = self.find_by_identity_hash(identity_hash)?;
        let block = self.block_by_index(located.block_index)?;

        let tree = CommitmentTree::build(&block.entries);
        let proof = tree.prove(located.position)?;

        Some(EntryProof {
            commitment: tree.root().to_string(),
            located,
            proof,
        })
    }

    /// Longest-valid-chain swap.
    ///
    /// Adopts `candidate` only if it is strictly longer than the local chain and
    /// validates under the local difficulty. Runs under the writer lock, so it can
    /// not interleave with an in-flight append.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> SyncOutcome {
        let _writer = self.writer.lock();

        let local_len = self.state.read().blocks.len();
        if candidate.len() <= local_len {
            log::debug!(
                "Sync rejected: peer chain length {} <= local {}",
                candidate.len(),
                local_len
            );
            return SyncOutcome::RejectedShorter {
                local_len,
                peer_len: candidate.len(),
            };
        }

        if let Err(failure) = validate_chain(&candidate, self.config.difficulty) {
            log::warn!("Sync rejected: peer chain invalid ({})", failure);
            return SyncOutcome::RejectedInvalid(failure);
        }

        let new_len = candidate.len();
        let rebuilt = ChainState::from_blocks(candidate);
        *self.state.write() = rebuilt;

        log::info!("Adopted peer chain: {} -> {} blocks", local_len, new_len);
        SyncOutcome::Adopted {
            previous_len: local_len,
            new_len,
        }
    }

    /// Accept a single announced block if it links onto our tail
    pub fn extend_with(&self, block: Block) -> ExtendOutcome {
        let _writer = self.writer.lock();

        let (len, tail_hash, known_hash) = {
            let state = self.state.read();
            let known = usize::try_from(block.index)
                .ok()
                .and_then(|i| state.blocks.get(i))
                .map(|b| b.hash.clone());
            (state.blocks.len(), state.tail().hash.clone(), known)
        };

        if let Some(known) = known_hash {
            return if known == block.hash {
                ExtendOutcome::AlreadyKnown
            } else {
                ExtendOutcome::NeedsResolve
            };
        }
        if block.index != len as BlockIndex || block.previous_hash != tail_hash {
            return ExtendOutcome::NeedsResolve;
        }

        if block.hash != compute_hash(&block) {
            return ExtendOutcome::Rejected(IntegrityFailure::HashMismatch { index: block.index });
        }
        if !meets_difficulty(&block.hash, self.config.difficulty) {
            return ExtendOutcome::Rejected(IntegrityFailure::DifficultyUnmet {
                index: block.index,
                difficulty: self.config.difficulty,
            });
        }

        log::debug!("Extended chain with announced block {}", block.index);
        self.state.write().push(block);
        ExtendOutcome::Extended
    }

    #[cfg(test)]
    pub(crate) fn tamper<F: FnOnce(&mut Block)>(&self, index: usize, f: F) {
        f(&mut self.state.write().blocks[index]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vl_error::ConfigError;
    use std::sync::Arc;
    use std::thread;

    fn config(difficulty: Difficulty) -> LedgerConfig {
        LedgerConfig {
            difficulty,
            max_seal_iterations: None,
        }
    }

    fn vote(identity: &str) -> Entry {
        Entry::new(
            identity,
            identity.as_bytes().to_vec(),
            vec![0x5a; 8],
            "2024-03-01T10:00:00Z",
            "c0ffee00c0ffee00",
        )
    }

    fn ledger_with(difficulty: Difficulty, identities: &[&str]) -> Ledger {
        let ledger = Ledger::new(config(difficulty)).unwrap();
        for id in identities {
            ledger.append(vote(id)).unwrap();
        }
        ledger
    }

    #[test]
    fn test_genesis_block() {
        let ledger = Ledger::new(config(2)).unwrap();
        assert_eq!(ledger.len(), 1);

        let genesis = ledger.block_by_index(0).unwrap();
        assert!(genesis.is_genesis());
        assert!(genesis.entries.is_empty());
        assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(genesis.hash.starts_with("00"));
        assert!(ledger.validate());
    }

    #[test]
    fn test_shared_genesis_timestamp() {
        let ts = "2024-01-01T00:00:00Z".to_string();
        let a = Ledger::new_at(config(1), ts.clone()).unwrap();
        let b = Ledger::new_at(config(1), ts).unwrap();
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn test_valid_after_every_append() {
        let ledger = Ledger::new(config(1)).unwrap();
        for i in 0..5 {
            let block = ledger.append(vote(&format!("{:016x}", i))).unwrap();
            assert_eq!(block.index, i + 1);
            assert!(ledger.validate(), "invalid after append {}", i);
        }
        assert_eq!(ledger.len(), 6);
    }

    #[test]
    fn test_append_links_to_tail() {
        let ledger = Ledger::new(config(1)).unwrap();
        let genesis_hash = ledger.tail().hash;

        let first = ledger.append(vote("aaaaaaaaaaaaaaaa")).unwrap();
        let second = ledger.append(vote("bbbbbbbbbbbbbbbb")).unwrap();

        assert_eq!(first.previous_hash, genesis_hash);
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(ledger.tail(), second);
        assert_eq!(compute_hash(&second), second.hash);
    }

    #[test]
    fn test_find_by_identity_hash() {
        let ledger = ledger_with(1, &["1111111111111111", "2222222222222222"]);

        let found = ledger.find_by_identity_hash("2222222222222222").unwrap();
        assert_eq!(found.block_index, 2);
        assert_eq!(found.block_hash, ledger.block_by_index(2).unwrap().hash);
        assert_eq!(found.entry, vote("2222222222222222"));

        assert!(ledger.find_by_identity_hash("3333333333333333").is_none());
    }

    #[test]
    fn test_duplicate_identity_returns_first_occurrence() {
        let ledger = ledger_with(1, &["dddddddddddddddd", "eeeeeeeeeeeeeeee", "dddddddddddddddd"]);

        // append is unconditional, the chain holds both
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.stats().total_entries, 3);

        let found = ledger.find_by_identity_hash("dddddddddddddddd").unwrap();
        assert_eq!(found.block_index, 1);
    }

    #[test]
    fn test_block_lookups() {
        let ledger = ledger_with(1, &["1234123412341234"]);
        let block = ledger.block_by_index(1).unwrap();

        assert_eq!(ledger.block_by_hash(&block.hash), Some(block));
        assert!(ledger.block_by_index(2).is_none());
        assert!(ledger.block_by_index(u64::MAX).is_none());
        assert!(ledger.block_by_hash("not-a-hash").is_none());
    }

    #[test]
    fn test_tampered_ciphertext_isolated_to_block() {
        let ledger = Ledger::new(config(2)).unwrap();
        assert!(ledger.validate());

        ledger.append(vote("abababababababab")).unwrap();
        ledger.append(vote("cdcdcdcdcdcdcdcd")).unwrap();
        assert!(ledger.validate());

        ledger.tamper(1, |b| b.entries[0].encrypted_choice[0] ^= 0xff);

        assert!(!ledger.validate());
        let failure = ledger.validate_report().unwrap_err();
        assert_eq!(failure, IntegrityFailure::HashMismatch { index: 1 });
        assert_eq!(failure.block_index(), Some(1));
    }

    #[test]
    fn test_any_field_mutation_invalidates() {
        let mutations: Vec<Box<dyn Fn(&mut Block)>> = vec![
            Box::new(|b| b.index += 10),
            Box::new(|b| b.timestamp.push('x')),
            Box::new(|b| b.previous_hash = "ff".repeat(32)),
            Box::new(|b| b.nonce += 1),
            Box::new(|b| b.hash = "00".repeat(32)),
            Box::new(|b| b.entries[0].identity_hash.push('0')),
            Box::new(|b| b.entries[0].signature[0] ^= 1),
            Box::new(|b| b.entries[0].timestamp = "2030-01-01T00:00:00Z".to_string()),
            Box::new(|b| b.entries[0].origin_hash = "0".repeat(16)),
            Box::new(|b| b.entries.clear()),
        ];

        for (i, mutate) in mutations.iter().enumerate() {
            let ledger = ledger_with(1, &["0101010101010101", "0202020202020202"]);
            ledger.tamper(1, |b| mutate(b));
            assert!(!ledger.validate(), "mutation {} not detected", i);
        }
    }

    #[test]
    fn test_tampered_genesis_detected() {
        let ledger = ledger_with(1, &["0101010101010101"]);
        ledger.tamper(0, |b| b.timestamp = "1970-01-01T00:00:00Z".to_string());
        assert_eq!(
            ledger.validate_report(),
            Err(IntegrityFailure::MalformedGenesis)
        );
    }

    #[test]
    fn test_rehashed_block_breaks_successor_link() {
        let ledger = ledger_with(1, &["0101010101010101", "0202020202020202"]);

        // re-seal block 1 after editing - its own hash is consistent again,
        // but block 2 still points at the old hash
        ledger.tamper(1, |b| {
            b.entries[0].encrypted_choice = vec![0xEE];
            seal(b, 1);
        });

        assert_eq!(
            ledger.validate_report(),
            Err(IntegrityFailure::BrokenLink { index: 2 })
        );
    }

    #[test]
    fn test_difficulty_enforced_on_validation() {
        let blocks = ledger_with(1, &["0101010101010101"]).snapshot();
        // a chain sealed at difficulty 1 is rarely valid at difficulty 8
        let result = validate_chain(&blocks, 8);
        assert!(matches!(
            result,
            Err(IntegrityFailure::DifficultyUnmet { .. })
        ));
    }

    #[test]
    fn test_empty_chain_invalid() {
        assert_eq!(validate_chain(&[], 1), Err(IntegrityFailure::EmptyChain));
    }

    #[test]
    fn test_stats() {
        let ledger = ledger_with(2, &["aaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbb"]);
        let stats = ledger.stats();

        assert_eq!(stats.total_blocks, 3);
        assert_eq!(stats.total_entries, 2);
        assert!(stats.chain_valid);
        assert_eq!(stats.difficulty, 2);
        assert_eq!(stats.latest_block_hash, ledger.tail().hash);
        assert_eq!(
            stats.genesis_block_hash,
            ledger.block_by_index(0).unwrap().hash
        );
    }

    #[test]
    fn test_export_import_preserves_chain() {
        let ledger = ledger_with(1, &["aaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbb"]);
        let json = ledger.export().unwrap();

        let restored = Ledger::import(&json, config(1)).unwrap();
        assert_eq!(restored.snapshot(), ledger.snapshot());
        assert!(restored.validate());
        assert!(restored
            .find_by_identity_hash("bbbbbbbbbbbbbbbb")
            .is_some());
    }

    #[test]
    fn test_export_schema() {
        let ledger = ledger_with(1, &["aaaaaaaaaaaaaaaa"]);
        let value: serde_json::Value = serde_json::from_str(&ledger.export().unwrap()).unwrap();

        let blocks = value.as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["index"], 0);
        assert_eq!(blocks[0]["previous_hash"], "0");
        for key in ["index", "entries", "timestamp", "previous_hash", "nonce", "hash"] {
            assert!(blocks[1].get(key).is_some(), "missing {}", key);
        }
        assert_eq!(
            blocks[1]["entries"][0]["encrypted_choice"],
            hex::encode("aaaaaaaaaaaaaaaa")
        );
    }

    #[test]
    fn test_import_rejects_tampered_export() {
        let ledger = ledger_with(1, &["aaaaaaaaaaaaaaaa"]);
        let mut blocks = ledger.snapshot();
        blocks[1].entries[0].signature = vec![0];
        let json = serde_json::to_string(&blocks).unwrap();

        let result = Ledger::import(&json, config(1));
        assert!(matches!(
            result,
            Err(LedgerError::Integrity(IntegrityFailure::HashMismatch { index: 1 }))
        ));
    }

    #[test]
    fn test_entry_proof() {
        let ledger = ledger_with(1, &["aaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbb"]);
        let proof = ledger.prove_entry("bbbbbbbbbbbbbbbb").unwrap();

        assert_eq!(proof.located.block_index, 2);
        assert_eq!(Some(proof.commitment.clone()), ledger.block_commitment(2));
        assert!(vl_commitment::verify_membership(
            &proof.located.entry,
            &proof.proof,
            &proof.commitment
        ));
        assert!(ledger.prove_entry("cccccccccccccccc").is_none());
    }

    #[test]
    fn test_genesis_commitment_is_empty_digest() {
        let ledger = Ledger::new(config(1)).unwrap();
        assert_eq!(
            ledger.block_commitment(0),
            Some(vl_commitment::empty_digest())
        );
        assert_eq!(ledger.block_commitment(1), None);
    }

    #[test]
    fn test_replace_chain_adopts_longer_valid() {
        let longer = ledger_with(1, &["aaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbb"]);
        let shorter = ledger_with(1, &["cccccccccccccccc"]);

        let outcome = shorter.replace_chain(longer.snapshot());
        assert_eq!(
            outcome,
            SyncOutcome::Adopted {
                previous_len: 2,
                new_len: 3
            }
        );
        assert_eq!(shorter.snapshot(), longer.snapshot());
        // index rebuilt from the adopted chain
        assert!(shorter.find_by_identity_hash("cccccccccccccccc").is_none());
        assert!(shorter.find_by_identity_hash("bbbbbbbbbbbbbbbb").is_some());
    }

    #[test]
    fn test_replace_chain_rejects_shorter_or_equal() {
        let local = ledger_with(1, &["aaaaaaaaaaaaaaaa"]);
        let peer = ledger_with(1, &["bbbbbbbbbbbbbbbb"]);
        let before = local.snapshot();

        assert_eq!(
            local.replace_chain(peer.snapshot()),
            SyncOutcome::RejectedShorter {
                local_len: 2,
                peer_len: 2
            }
        );
        assert_eq!(local.snapshot(), before);
    }

    #[test]
    fn test_replace_chain_rejects_tampered() {
        let longer = ledger_with(1, &["aaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbb"]);
        let shorter = Ledger::new(config(1)).unwrap();
        let before = shorter.snapshot();

        let mut tampered = longer.snapshot();
        tampered[2].entries[0].encrypted_choice = b"forged".to_vec();

        let outcome = shorter.replace_chain(tampered);
        assert_eq!(
            outcome,
            SyncOutcome::RejectedInvalid(IntegrityFailure::HashMismatch { index: 2 })
        );
        assert_eq!(shorter.snapshot(), before);
    }

    #[test]
    fn test_extend_with_announced_block() {
        let source = ledger_with(1, &["aaaaaaaaaaaaaaaa"]);
        let follower = Ledger::from_blocks(source.snapshot(), config(1)).unwrap();

        let block = source.append(vote("bbbbbbbbbbbbbbbb")).unwrap();
        assert_eq!(follower.extend_with(block.clone()), ExtendOutcome::Extended);
        assert_eq!(follower.extend_with(block), ExtendOutcome::AlreadyKnown);
        assert_eq!(follower.snapshot(), source.snapshot());

        // skipping ahead leaves a gap
        source.append(vote("cccccccccccccccc")).unwrap();
        let ahead = source.append(vote("dddddddddddddddd")).unwrap();
        assert_eq!(follower.extend_with(ahead), ExtendOutcome::NeedsResolve);
        assert_eq!(follower.len(), 3);
    }

    #[test]
    fn test_extend_with_rejects_forged_block() {
        let source = ledger_with(1, &[]);
        let follower = Ledger::from_blocks(source.snapshot(), config(1)).unwrap();

        let mut block = source.append(vote("aaaaaaaaaaaaaaaa")).unwrap();
        block.entries[0].signature = vec![1, 2, 3];

        assert_eq!(
            follower.extend_with(block),
            ExtendOutcome::Rejected(IntegrityFailure::HashMismatch { index: 1 })
        );
        assert_eq!(follower.len(), 1);
    }

    #[test]
    fn test_concurrent_appends_never_fork() {
        let ledger = Arc::new(Ledger::new(config(1)).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..5 {
                        ledger.append(vote(&format!("{:08x}{:08x}", t, i))).unwrap();
                    }
                })
            })
            .collect();

        // readers run alongside the writers
        for _ in 0..10 {
            let _ = ledger.stats();
            assert!(ledger.validate());
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 21);
        assert!(ledger.validate());
        assert_eq!(ledger.entries().len(), 20);
    }

    #[test]
    fn test_seal_cap_surfaces_error() {
        let result = Ledger::new(LedgerConfig {
            difficulty: 64,
            max_seal_iterations: Some(5),
        });
        assert!(matches!(
            result,
            Err(LedgerError::Seal(SealError::IterationCapExceeded { iterations: 5, .. }))
        ));
    }

    #[test]
    fn test_unreachable_difficulty_rejected_before_sealing() {
        // unbounded sealing at 65 would never return
        assert!(matches!(
            Ledger::new(config(65)),
            Err(LedgerError::Config(ConfigError::DifficultyOutOfRange { difficulty: 65, .. }))
        ));

        let blocks = Ledger::new(config(1)).unwrap().snapshot();
        assert!(matches!(
            Ledger::from_blocks(blocks, config(65)),
            Err(LedgerError::Config(_))
        ));
    }
}

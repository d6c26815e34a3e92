//! Voting Context
//!
//! The one object a process builds at start-up and hands (by reference or
//! `Arc`) to everything that records or audits votes. Owns the shard router.
//!
//! `cast` is the collaborator-facing append: it validates the record, refuses an
//! identity that is already on the ledger, then routes and seals. The
//! check-and-append pair runs under a per-shard gate so two casts for the same
//! identity can not both get through.

use parking_lot::Mutex;
use serde::Serialize;

use crate::vl_commitment;
use crate::vl_config::NodeConfig;
use crate::vl_error::{CastError, LedgerError};
use crate::vl_interface::{BlockIndex, Entry, HexDigest, LedgerStats, LocatedEntry};
use crate::vl_ledger::EntryProof;
use crate::vl_shards::ShardRouter;

/// Where a cast vote landed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CastReceipt {
    pub shard: usize,
    pub block_index: BlockIndex,
    pub block_hash: HexDigest,
    pub nonce: u64,
}

/// Aggregate view over every shard
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub node_id: String,
    pub total_votes: usize,
    pub all_valid: bool,
    pub shards: Vec<LedgerStats>,
}

pub struct VotingContext {
    node_id: String,
    router: ShardRouter,
    cast_gates: Vec<Mutex<()>>,
}

impl VotingContext {
    pub fn new(node_id: impl Into<String>, router: ShardRouter) -> Self {
        let cast_gates = (0..router.num_shards()).map(|_| Mutex::new(())).collect();
        Self {
            node_id: node_id.into(),
            router,
            cast_gates,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Result<Self, LedgerError> {
        let router = ShardRouter::from_config(config)?;
        log::info!(
            "Voting context {} up with {} shards",
            config.node_id,
            router.num_shards()
        );
        Ok(Self::new(config.node_id.clone(), router))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    /// Validate, de-duplicate and record one vote
    pub fn cast(&self, entry: Entry) -> Result<CastReceipt, CastError> {
        entry.validate()?;
        let shard = self.router.shard_index(&entry.identity_hash)?;

        let _gate = self.cast_gates[shard].lock();

        if let Some((_, existing)) = self.router.find_by_identity_hash(&entry.identity_hash) {
            log::warn!(
                "Duplicate cast for {} (already in shard {} block {})",
                entry.identity_hash,
                shard,
                existing.block_index
            );
            return Err(CastError::AlreadyRecorded(existing.location()));
        }

        let (shard, block) = self.router.append(entry)?;

        Ok(CastReceipt {
            shard,
            block_index: block.index,
            block_hash: block.hash,
            nonce: block.nonce,
        })
    }

    pub fn has_voted(&self, identity_hash: &str) -> bool {
        self.router.find_by_identity_hash(identity_hash).is_some()
    }

    pub fn find(&self, identity_hash: &str) -> Option<(usize, LocatedEntry)> {
        self.router.find_by_identity_hash(identity_hash)
    }

    /// Inclusion proof for a recorded vote against its block commitment
    pub fn prove(&self, identity_hash: &str) -> Option<EntryProof> {
        self.router
            .shard_for(identity_hash)
            .ok()?
            .prove_entry(identity_hash)
    }

    /// Check a proof produced by [`VotingContext::prove`], with the commitment
    /// recomputed from the stored block rather than taken from the proof.
    pub fn verify_proof(&self, proof: &EntryProof) -> bool {
        let Ok(shard) = self.router.shard_for(&proof.located.entry.identity_hash) else {
            return false;
        };
        match shard.block_commitment(proof.located.block_index) {
            Some(commitment) => {
                commitment == proof.commitment
                    && vl_commitment::verify_membership(
                        &proof.located.entry,
                        &proof.proof,
                        &commitment,
                    )
            }
            None => false,
        }
    }

    pub fn verify_all(&self) -> bool {
        self.router.all_valid()
    }

    pub fn total_votes(&self) -> usize {
        self.router.stats().iter().map(|s| s.total_entries).sum()
    }

    pub fn stats(&self) -> ContextStats {
        let shards = self.router.stats();
        ContextStats {
            node_id: self.node_id.clone(),
            total_votes: shards.iter().map(|s| s.total_entries).sum(),
            all_valid: shards.iter().all(|s| s.chain_valid),
            shards,
        }
    }
}

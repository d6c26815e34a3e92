//! Replica Node
//!
//! Wraps a [`Ledger`] with a peer set and applies the longest-valid-chain rule.
//!
//! # Synchronisation protocol
//! 1. Ask every peer for its chain length (cheap)
//! 2. Fetch only chains strictly longer than the best seen so far
//! 3. Validate each fetched chain locally under our own difficulty
//! 4. Swap in the winner atomically under the ledger's writer lock, which
//!    re-checks that it is still longer than the local chain
//!
//! Ties keep the local chain. Unreachable peers are skipped. Nothing here is a
//! hard error - rejected syncs are counted and logged for collaborators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::RwLock;
use serde::Serialize;

use crate::vl_config::NodeConfig;
use crate::vl_error::LedgerError;
use crate::vl_interface::{Block, Entry, PeerAddress, PeerTransport};
use crate::vl_ledger::{validate_chain, ExtendOutcome, Ledger, SyncOutcome};

/// Snapshot of the replica's sync counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub adopted: u64,
    pub rejected_shorter: u64,
    pub rejected_invalid: u64,
    pub unreachable: u64,
    pub broadcasts_delivered: u64,
    pub broadcasts_failed: u64,
}

#[derive(Default)]
struct SyncCounters {
    adopted: AtomicU64,
    rejected_shorter: AtomicU64,
    rejected_invalid: AtomicU64,
    unreachable: AtomicU64,
    broadcasts_delivered: AtomicU64,
    broadcasts_failed: AtomicU64,
}

impl SyncCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Adopted { .. } => Self::bump(&self.adopted),
            SyncOutcome::RejectedShorter { .. } => Self::bump(&self.rejected_shorter),
            SyncOutcome::RejectedInvalid(_) => Self::bump(&self.rejected_invalid),
        }
    }

    fn snapshot(&self) -> SyncStats {
        SyncStats {
            adopted: self.adopted.load(Ordering::Relaxed),
            rejected_shorter: self.rejected_shorter.load(Ordering::Relaxed),
            rejected_invalid: self.rejected_invalid.load(Ordering::Relaxed),
            unreachable: self.unreachable.load(Ordering::Relaxed),
            broadcasts_delivered: self.broadcasts_delivered.load(Ordering::Relaxed),
            broadcasts_failed: self.broadcasts_failed.load(Ordering::Relaxed),
        }
    }
}

pub struct ReplicaNode {
    node_id: String,
    ledger: Arc<Ledger>,
    peers: RwLock<IndexSet<PeerAddress>>,
    transport: Arc<dyn PeerTransport>,
    counters: SyncCounters,
}

impl ReplicaNode {
    pub fn new(node_id: impl Into<String>, ledger: Arc<Ledger>, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            node_id: node_id.into(),
            ledger,
            peers: RwLock::new(IndexSet::new()),
            transport,
            counters: SyncCounters::default(),
        }
    }

    /// Fresh ledger plus the configured peer set
    pub fn from_config(
        config: &NodeConfig,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Self, LedgerError> {
        let ledger = Arc::new(Ledger::new(config.ledger.clone())?);
        let node = Self::new(config.node_id.clone(), ledger, transport);
        for peer in &config.peers {
            node.add_peer(peer.clone());
        }
        Ok(node)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Returns false if the peer was already known. Does not trigger a sync.
    pub fn add_peer(&self, peer: impl Into<PeerAddress>) -> bool {
        self.peers.write().insert(peer.into())
    }

    /// Returns false if the peer was not known
    pub fn remove_peer(&self, peer: &str) -> bool {
        self.peers.write().shift_remove(peer)
    }

    /// Peers in insertion order
    pub fn peers(&self) -> Vec<PeerAddress> {
        self.peers.read().iter().cloned().collect()
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.counters.snapshot()
    }

    /// Append locally, then announce the block to every peer
    pub fn append(&self, entry: Entry) -> Result<Block, LedgerError> {
        let block = self.ledger.append(entry)?;
        self.broadcast_block(&block);
        Ok(block)
    }

    /// Replace the local chain with `peer_chain` if it is longer and valid
    pub fn sync(&self, peer_chain: Vec<Block>) -> SyncOutcome {
        let outcome = self.ledger.replace_chain(peer_chain);
        self.counters.record(&outcome);
        outcome
    }

    /// Consensus entry point. Returns true if the local chain was replaced.
    pub fn resolve_conflicts(&self) -> bool {
        let difficulty = self.ledger.difficulty();
        let mut best_len = self.ledger.len();
        let mut best: Option<(PeerAddress, Vec<Block>)> = None;

        for peer in self.peers() {
            let length = match self.transport.chain_length(&peer) {
                Ok(length) => length,
                Err(e) => {
                    log::warn!("[{}] skipping peer: {}", self.node_id, e);
                    SyncCounters::bump(&self.counters.unreachable);
                    continue;
                }
            };

            if length <= best_len {
                continue;
            }

            let chain = match self.transport.fetch_chain(&peer) {
                Ok(chain) => chain,
                Err(e) => {
                    log::warn!("[{}] failed to fetch chain: {}", self.node_id, e);
                    SyncCounters::bump(&self.counters.unreachable);
                    continue;
                }
            };

            // advertised length is only a hint
            if chain.len() <= best_len {
                SyncCounters::bump(&self.counters.rejected_shorter);
                continue;
            }

            if let Err(failure) = validate_chain(&chain, difficulty) {
                log::warn!(
                    "[{}] peer {} serves an invalid chain: {}",
                    self.node_id,
                    peer,
                    failure
                );
                SyncCounters::bump(&self.counters.rejected_invalid);
                continue;
            }

            best_len = chain.len();
            best = Some((peer, chain));
        }

        match best {
            Some((peer, chain)) => {
                log::info!(
                    "[{}] adopting chain of {} blocks from {}",
                    self.node_id,
                    chain.len(),
                    peer
                );
                self.sync(chain).is_adopted()
            }
            None => false,
        }
    }

    /// Best-effort announcement of `block` to every peer. Returns the number of
    /// peers that accepted delivery; failures are counted, never retried.
    pub fn broadcast_block(&self, block: &Block) -> usize {
        let mut delivered = 0;

        for peer in self.peers() {
            match self.transport.announce_block(&peer, block) {
                Ok(()) => {
                    delivered += 1;
                    SyncCounters::bump(&self.counters.broadcasts_delivered);
                }
                Err(e) => {
                    log::debug!("[{}] broadcast of block {} failed: {}", self.node_id, block.index, e);
                    SyncCounters::bump(&self.counters.broadcasts_failed);
                }
            }
        }

        delivered
    }

    /// Handle a block announced by a peer
    pub fn receive_block(&self, block: Block) -> ExtendOutcome {
        let outcome = self.ledger.extend_with(block);
        if let ExtendOutcome::Rejected(ref failure) = outcome {
            log::warn!("[{}] rejected announced block: {}", self.node_id, failure);
            SyncCounters::bump(&self.counters.rejected_invalid);
        }
        outcome
    }
}

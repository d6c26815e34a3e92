// In-memory peer transport
//
// Implements the PeerTransport contract by handing calls directly to other
// ledgers in the same process. Used by tests, the demo driver and the replica
// simulator to exercise the consensus rule without a network.
//
// Peers can be taken offline, and a peer can be registered with a fixed block
// list to model a node serving a forged or stale chain.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;

use crate::vl_error::TransportError;
use crate::vl_interface::{Block, PeerAddress, PeerTransport};
use crate::vl_ledger::{ExtendOutcome, Ledger};

enum PeerHandle {
    /// A running ledger - answers with its current chain
    Live(Arc<Ledger>),
    /// Always serves the same blocks and ignores announcements
    Fixed(Vec<Block>),
}

pub struct MemoryTransport {
    peers: RwLock<HashMap<PeerAddress, PeerHandle>>,
    offline: RwLock<HashSet<PeerAddress>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            offline: RwLock::new(HashSet::new()),
        }
    }

    /// Make `ledger` reachable under `address`
    pub fn register(&self, address: impl Into<PeerAddress>, ledger: Arc<Ledger>) {
        self.peers
            .write()
            .insert(address.into(), PeerHandle::Live(ledger));
    }

    /// Make `address` serve exactly `blocks`, whatever they contain
    pub fn register_chain(&self, address: impl Into<PeerAddress>, blocks: Vec<Block>) {
        self.peers
            .write()
            .insert(address.into(), PeerHandle::Fixed(blocks));
    }

    pub fn set_offline(&self, address: &str, offline: bool) {
        let mut set = self.offline.write();
        if offline {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    fn with_peer<R>(
        &self,
        peer: &PeerAddress,
        f: impl FnOnce(&PeerHandle) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        if self.offline.read().contains(peer) {
            return Err(TransportError::Unreachable(peer.clone()));
        }
        let peers = self.peers.read();
        let handle = peers
            .get(peer)
            .ok_or_else(|| TransportError::Unreachable(peer.clone()))?;
        f(handle)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTransport for MemoryTransport {
    fn chain_length(&self, peer: &PeerAddress) -> Result<usize, TransportError> {
        self.with_peer(peer, |handle| {
            Ok(match handle {
                PeerHandle::Live(ledger) => ledger.len(),
                PeerHandle::Fixed(blocks) => blocks.len(),
            })
        })
    }

    fn fetch_chain(&self, peer: &PeerAddress) -> Result<Vec<Block>, TransportError> {
        self.with_peer(peer, |handle| {
            Ok(match handle {
                PeerHandle::Live(ledger) => ledger.snapshot(),
                PeerHandle::Fixed(blocks) => blocks.clone(),
            })
        })
    }

    fn announce_block(&self, peer: &PeerAddress, block: &Block) -> Result<(), TransportError> {
        self.with_peer(peer, |handle| match handle {
            PeerHandle::Live(ledger) => match ledger.extend_with(block.clone()) {
                ExtendOutcome::Rejected(failure) => Err(TransportError::Rejected {
                    peer: peer.clone(),
                    reason: failure.to_string(),
                }),
                // delivered; a gap is the receiver's business to resolve
                _ => Ok(()),
            },
            PeerHandle::Fixed(_) => Err(TransportError::Rejected {
                peer: peer.clone(),
                reason: "peer does not accept blocks".to_string(),
            }),
        })
    }
}

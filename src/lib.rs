//! # vlRust - Tamper-Evident Vote Ledger
//!
//! An append-only, hash-linked ledger of vote entries. Every entry is sealed in
//! its own block with a proof-of-work nonce, so altering any stored field breaks
//! validation from that block on. Ledgers are sharded by voter identity hash and
//! replicated between nodes with a longest-valid-chain rule.
//!
//! ## Core Components
//!
//! - **Ledger**: Hash-linked block chain with append, validation, lookup, export and stats
//! - **Sealing**: Canonical block hash and proof-of-work nonce search
//! - **Commitment**: Merkle tree over a block's entries with inclusion proofs
//! - **ReplicaNode**: Peer set plus chain sync / conflict resolution over a `PeerTransport`
//! - **ShardRouter**: Deterministic identity-hash partitioning over independent ledgers
//! - **VotingContext**: Application context owning the shards; validated, de-duplicated casts
//!
//! ## Usage
//!
//! ```no_run
//! use vl_rust::{Entry, NodeConfig, VotingContext};
//!
//! let context = VotingContext::from_config(&NodeConfig::default()).unwrap();
//!
//! let vote = Entry::new(
//!     "3f9a61c2d8e4b7a0",
//!     b"ciphertext".to_vec(),
//!     b"signature".to_vec(),
//!     "2024-03-01T10:00:00Z",
//!     "77c1a0e2f4d6b8c9",
//! );
//! let receipt = context.cast(vote).unwrap();
//! assert!(context.has_voted("3f9a61c2d8e4b7a0"));
//! println!("sealed in shard {} block {}", receipt.shard, receipt.block_index);
//! ```
//!
//! ## Replication
//!
//! `ReplicaNode` talks to peers only through the `PeerTransport` trait. The
//! in-process `MemoryTransport` backs the tests, the demo driver and the
//! `replica_sim` scenario binary in `simulator/`.

// Data model and errors
pub mod vl_error;
pub mod vl_interface;

// Core ledger modules
pub mod vl_commitment;
pub mod vl_ledger;
pub mod vl_sealing;

// Distribution
pub mod vl_replica;
pub mod vl_shards;

// Application surface
pub mod vl_config;
pub mod vl_context;

// Transports
pub mod vl_memory_transport;

// Re-export commonly used types
pub use vl_config::{LedgerConfig, NodeConfig};
pub use vl_context::{CastReceipt, ContextStats, VotingContext};
pub use vl_error::{
    CastError, ConfigError, IntegrityFailure, LedgerError, RecordError, SealError, TransportError,
};
pub use vl_interface::{
    Block, BlockIndex, Difficulty, Entry, EntryLocation, HexDigest, LedgerStats, LocatedEntry,
    PeerAddress, PeerTransport,
};
pub use vl_ledger::{validate_chain, EntryProof, ExtendOutcome, Ledger, SyncOutcome};
pub use vl_memory_transport::MemoryTransport;
pub use vl_replica::{ReplicaNode, SyncStats};
pub use vl_shards::ShardRouter;

//! Error taxonomy
//!
//! Lookups that miss are not errors (they return `None`), and neither is a
//! duplicate identity: the ledger has no concept of "already voted".

use thiserror::Error;

use crate::vl_interface::{BlockIndex, EntryLocation, PeerAddress};

/// A chain failed validation. Reported, never repaired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityFailure {
    #[error("chain is empty (no genesis block)")]
    EmptyChain,

    #[error("genesis block is malformed")]
    MalformedGenesis,

    #[error("block at position {position} claims index {claimed}")]
    IndexMismatch { position: usize, claimed: BlockIndex },

    #[error("block {index}: stored hash does not match recomputed hash")]
    HashMismatch { index: BlockIndex },

    #[error("block {index}: previous_hash does not match predecessor hash")]
    BrokenLink { index: BlockIndex },

    #[error("block {index}: hash does not meet difficulty {difficulty}")]
    DifficultyUnmet { index: BlockIndex, difficulty: u32 },
}

impl IntegrityFailure {
    /// Index of the offending block, if the failure is tied to one
    pub fn block_index(&self) -> Option<BlockIndex> {
        match self {
            IntegrityFailure::EmptyChain => None,
            IntegrityFailure::MalformedGenesis => Some(0),
            IntegrityFailure::IndexMismatch { position, .. } => Some(*position as BlockIndex),
            IntegrityFailure::HashMismatch { index }
            | IntegrityFailure::BrokenLink { index }
            | IntegrityFailure::DifficultyUnmet { index, .. } => Some(*index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SealError {
    /// Soft cap hit - caller should back off and retry (or lower difficulty)
    #[error("no nonce found within {iterations} iterations at difficulty {difficulty}")]
    IterationCapExceeded { iterations: u64, difficulty: u32 },
}

/// Record rejected at the collaborator boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{field} must be at least {min} hex characters (got {len})")]
    HashTooShort {
        field: &'static str,
        len: usize,
        min: usize,
    },

    #[error("{field} is not a lowercase hex string")]
    NotHex { field: &'static str },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("timestamp {0:?} is not RFC 3339")]
    InvalidTimestamp(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(PeerAddress),

    #[error("peer {peer} rejected the request: {reason}")]
    Rejected { peer: PeerAddress, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("num_shards must be at least 1")]
    NoShards,

    #[error("difficulty {difficulty} is unreachable (a digest has {max} hex characters)")]
    DifficultyOutOfRange { difficulty: u32, max: usize },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Crate level error
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Integrity(#[from] IntegrityFailure),

    #[error(transparent)]
    Seal(#[from] SealError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of [`crate::vl_context::VotingContext::cast`]
#[derive(Debug, Error)]
pub enum CastError {
    #[error("identity already recorded in block {}", .0.block_index)]
    AlreadyRecorded(EntryLocation),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<RecordError> for CastError {
    fn from(e: RecordError) -> Self {
        CastError::Ledger(LedgerError::Record(e))
    }
}

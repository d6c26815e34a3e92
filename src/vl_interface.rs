use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::vl_error::{RecordError, TransportError};

/// Lowercase hex rendering of a BLAKE3 digest (64 chars), or a caller supplied hex hash
pub type HexDigest = String;

pub type BlockIndex = u64;
pub type Nonce = u64;

/// Number of leading `'0'` hex characters a sealed block hash must carry
pub type Difficulty = u32;

/// Opaque peer address - the replica never interprets it, transports do
pub type PeerAddress = String;

/// previous_hash of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Width (in hex characters) of the identity-hash prefix used for shard routing.
/// Also the minimum accepted length of identity and origin hashes.
pub const SHARD_PREFIX_LEN: usize = 8;

/// Hex characters in a BLAKE3 digest, and so the highest reachable difficulty
pub const HEX_DIGEST_LEN: usize = 64;

/// Lowercase hex only. Identity hashes are compared as strings, so one
/// spelling per digest.
pub(crate) fn is_lower_hex(value: &str) -> bool {
    value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

// ============================================================================
// Canonical encoding
// ============================================================================
//
// Fixed once - changing any of this breaks verification of every block ever sealed.
//
// Entry:  {"identity_hash":..,"encrypted_choice":<hex>,"signature":<hex>,"timestamp":..,"origin_hash":..}
// Block:  {"index":..,"entries":[<entry>..],"timestamp":..,"previous_hash":..,"nonce":..}
//
// Compact JSON, fields in exactly that order (serde emits struct fields in
// declaration order). Entry annotations are never part of the encoding.
// ============================================================================

#[derive(Serialize)]
pub(crate) struct CanonicalEntry<'a> {
    identity_hash: &'a str,
    encrypted_choice: String,
    signature: String,
    timestamp: &'a str,
    origin_hash: &'a str,
}

/// Serialize a canonical structure. Only used with structs of strings and integers,
/// for which serde_json can not fail.
pub(crate) fn encode_canonical<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("canonical structures always serialize")
}

/// One vote's immutable footprint.
///
/// Produced by external collaborators, checked once at the boundary with
/// [`Entry::validate`], then handed to the ledger which never mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// One-way hash of the voter identity (never the raw identity)
    pub identity_hash: HexDigest,
    /// Opaque ciphertext of the choice
    #[serde(with = "hex::serde")]
    pub encrypted_choice: Vec<u8>,
    /// Signature-like authenticity tag
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    /// RFC 3339 submission time
    pub timestamp: String,
    /// Hash of the submitting network origin
    pub origin_hash: HexDigest,
    /// Caller supplied side data (e.g. a tally tag). Exported, never hashed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Entry {
    pub fn new(
        identity_hash: impl Into<HexDigest>,
        encrypted_choice: Vec<u8>,
        signature: Vec<u8>,
        timestamp: impl Into<String>,
        origin_hash: impl Into<HexDigest>,
    ) -> Self {
        Self {
            identity_hash: identity_hash.into(),
            encrypted_choice,
            signature,
            timestamp: timestamp.into(),
            origin_hash: origin_hash.into(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Boundary check for records handed over by collaborators.
    ///
    /// The ledger itself never calls this - `append` is unconditional.
    pub fn validate(&self) -> Result<(), RecordError> {
        check_hex_field("identity_hash", &self.identity_hash)?;
        check_hex_field("origin_hash", &self.origin_hash)?;

        if self.encrypted_choice.is_empty() {
            return Err(RecordError::EmptyField("encrypted_choice"));
        }
        if self.signature.is_empty() {
            return Err(RecordError::EmptyField("signature"));
        }

        OffsetDateTime::parse(&self.timestamp, &Rfc3339)
            .map_err(|_| RecordError::InvalidTimestamp(self.timestamp.clone()))?;

        Ok(())
    }

    pub(crate) fn canonical(&self) -> CanonicalEntry<'_> {
        CanonicalEntry {
            identity_hash: &self.identity_hash,
            encrypted_choice: hex::encode(&self.encrypted_choice),
            signature: hex::encode(&self.signature),
            timestamp: &self.timestamp,
            origin_hash: &self.origin_hash,
        }
    }

    /// Canonical byte encoding (commitment tree leaf pre-image)
    pub fn canonical_bytes(&self) -> Vec<u8> {
        encode_canonical(&self.canonical())
    }
}

fn check_hex_field(field: &'static str, value: &str) -> Result<(), RecordError> {
    if value.len() < SHARD_PREFIX_LEN {
        return Err(RecordError::HashTooShort {
            field,
            len: value.len(),
            min: SHARD_PREFIX_LEN,
        });
    }
    if !is_lower_hex(value) {
        return Err(RecordError::NotHex { field });
    }
    Ok(())
}

/// Atomic unit of the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: BlockIndex,
    pub entries: Vec<Entry>,
    pub timestamp: String,
    pub previous_hash: HexDigest,
    pub nonce: Nonce,
    pub hash: HexDigest,
}

impl Block {
    /// Unsealed block (nonce 0, empty hash) - see [`crate::vl_sealing::seal`]
    pub fn candidate(
        index: BlockIndex,
        entries: Vec<Entry>,
        timestamp: impl Into<String>,
        previous_hash: impl Into<HexDigest>,
    ) -> Self {
        Self {
            index,
            entries,
            timestamp: timestamp.into(),
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: HexDigest::new(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

/// Where an identity hash was first recorded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryLocation {
    pub block_index: BlockIndex,
    /// Position of the entry inside the block
    pub position: usize,
}

/// Result of an identity lookup
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocatedEntry {
    pub block_index: BlockIndex,
    pub block_hash: HexDigest,
    pub position: usize,
    pub entry: Entry,
}

impl LocatedEntry {
    pub fn location(&self) -> EntryLocation {
        EntryLocation {
            block_index: self.block_index,
            position: self.position,
        }
    }
}

/// Read-only ledger summary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_blocks: usize,
    pub total_entries: usize,
    pub chain_valid: bool,
    pub difficulty: Difficulty,
    pub latest_block_hash: HexDigest,
    pub genesis_block_hash: HexDigest,
}

/// Current UTC time as an RFC 3339 string
pub fn now_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

// ============================================================================
// Peer transport
// ============================================================================

/// Contract a peer-to-peer protocol must satisfy for replica synchronisation.
///
/// Implementations decide framing, addressing and retries. The replica only
/// relies on these three calls and treats every error as "peer unreachable".
pub trait PeerTransport: Send + Sync {
    /// Length of the peer's chain - lets the replica skip transferring short chains
    fn chain_length(&self, peer: &PeerAddress) -> Result<usize, TransportError>;

    /// Full chain of the peer, index 0 first
    fn fetch_chain(&self, peer: &PeerAddress) -> Result<Vec<Block>, TransportError>;

    /// Best-effort notification of a freshly appended block
    fn announce_block(&self, peer: &PeerAddress, block: &Block) -> Result<(), TransportError>;
}

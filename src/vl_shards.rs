//! Shard Router
//!
//! Partitions entries over `num_shards` independent ledgers. The owning shard is
//! the first [`SHARD_PREFIX_LEN`] hex characters of the identity hash, read as a
//! 32-bit number, modulo `num_shards`. Pure and stable for a given shard count:
//! changing `num_shards` once data exists would need a re-sharding migration.
//!
//! Shards share nothing, so appends to different shards run in parallel.

use std::sync::Arc;

use crate::vl_config::{LedgerConfig, NodeConfig};
use crate::vl_error::{ConfigError, LedgerError, RecordError};
use crate::vl_interface::{is_lower_hex, Block, Entry, LedgerStats, LocatedEntry, SHARD_PREFIX_LEN};
use crate::vl_ledger::Ledger;

/// Bucket for `identity_hash` among `num_shards` shards.
///
/// The prefix must be lowercase hex, the same form `Entry::validate` accepts.
pub fn shard_index_for(identity_hash: &str, num_shards: usize) -> Result<usize, RecordError> {
    if identity_hash.len() < SHARD_PREFIX_LEN {
        return Err(RecordError::HashTooShort {
            field: "identity_hash",
            len: identity_hash.len(),
            min: SHARD_PREFIX_LEN,
        });
    }

    // `get` is None when byte 8 splits a multi-byte char
    let prefix = identity_hash
        .get(..SHARD_PREFIX_LEN)
        .filter(|p| is_lower_hex(p))
        .ok_or(RecordError::NotHex {
            field: "identity_hash",
        })?;

    let value = u32::from_str_radix(prefix, 16).map_err(|_| RecordError::NotHex {
        field: "identity_hash",
    })?;

    Ok(value as usize % num_shards)
}

pub struct ShardRouter {
    shards: Vec<Arc<Ledger>>,
}

impl ShardRouter {
    pub fn new(num_shards: usize, config: LedgerConfig) -> Result<Self, LedgerError> {
        if num_shards == 0 {
            return Err(ConfigError::NoShards.into());
        }

        let shards = (0..num_shards)
            .map(|_| Ledger::new(config.clone()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "Shard router ready: {} shards at difficulty {}",
            num_shards,
            config.difficulty
        );

        Ok(Self { shards })
    }

    pub fn from_config(config: &NodeConfig) -> Result<Self, LedgerError> {
        config.check()?;
        Self::new(config.num_shards, config.ledger.clone())
    }

    /// Reassemble a router from existing shard ledgers, in shard order
    pub fn from_shards(shards: Vec<Arc<Ledger>>) -> Result<Self, LedgerError> {
        if shards.is_empty() {
            return Err(ConfigError::NoShards.into());
        }
        Ok(Self { shards })
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_index(&self, identity_hash: &str) -> Result<usize, RecordError> {
        shard_index_for(identity_hash, self.shards.len())
    }

    /// Owning ledger for `identity_hash`
    pub fn shard_for(&self, identity_hash: &str) -> Result<&Arc<Ledger>, RecordError> {
        let index = self.shard_index(identity_hash)?;
        Ok(&self.shards[index])
    }

    pub fn shard(&self, index: usize) -> Option<&Arc<Ledger>> {
        self.shards.get(index)
    }

    pub fn shards(&self) -> &[Arc<Ledger>] {
        &self.shards
    }

    /// Append to the owning shard; returns the shard index with the sealed block
    pub fn append(&self, entry: Entry) -> Result<(usize, Block), LedgerError> {
        let index = self.shard_index(&entry.identity_hash)?;
        log::debug!("Routing {} to shard {}", entry.identity_hash, index);
        let block = self.shards[index].append(entry)?;
        Ok((index, block))
    }

    /// Lookup in the owning shard only. A malformed hash can not be recorded, so it is absent.
    pub fn find_by_identity_hash(&self, identity_hash: &str) -> Option<(usize, LocatedEntry)> {
        let index = self.shard_index(identity_hash).ok()?;
        self.shards[index]
            .find_by_identity_hash(identity_hash)
            .map(|located| (index, located))
    }

    /// Every entry, shard order first, then block order within a shard
    pub fn all_entries(&self) -> Vec<Entry> {
        self.shards.iter().flat_map(|s| s.entries()).collect()
    }

    pub fn all_valid(&self) -> bool {
        self.shards.iter().all(|s| s.validate())
    }

    pub fn stats(&self) -> Vec<LedgerStats> {
        self.shards.iter().map(|s| s.stats()).collect()
    }
}

//! Configuration
//!
//! All structs deserialize from YAML with every field optional (falling back to
//! `Default`), so a config file only needs to name what it overrides:
//!
//! ```yaml
//! node_id: polling-station-3
//! num_shards: 8
//! ledger:
//!   difficulty: 3
//! peers:
//!   - replica-a
//!   - replica-b
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::vl_error::ConfigError;
use crate::vl_interface::{Difficulty, PeerAddress, HEX_DIGEST_LEN};

/// Per-ledger settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Leading zero hex digits required on every block hash (default: 4)
    pub difficulty: Difficulty,

    /// Soft cap on nonce attempts per block. `None` = unbounded proof-of-work.
    /// When hit, `append` fails with a retryable `SealError`.
    pub max_seal_iterations: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            max_seal_iterations: None,
        }
    }
}

impl LedgerConfig {
    /// Fast settings for tests and demos
    pub const TEST: Self = LedgerConfig {
        difficulty: 1,
        max_seal_iterations: None,
    };

    /// A target longer than the digest can never be met, so sealing would not stop
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.difficulty as usize > HEX_DIGEST_LEN {
            return Err(ConfigError::DifficultyOutOfRange {
                difficulty: self.difficulty,
                max: HEX_DIGEST_LEN,
            });
        }
        Ok(())
    }
}

/// Settings for a full node: shard layout plus replica peers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: String,

    /// Number of independent shards (default: 4). Fixed for the lifetime of the data.
    pub num_shards: usize,

    pub ledger: LedgerConfig,

    /// Initial peer set for replication
    pub peers: Vec<PeerAddress>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node-0".to_string(),
            num_shards: 4,
            ledger: LedgerConfig::default(),
            peers: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        log::info!("Loading node config from {}", path.as_ref().display());
        Self::from_yaml_str(&text)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.num_shards == 0 {
            return Err(ConfigError::NoShards);
        }
        self.ledger.check()
    }
}

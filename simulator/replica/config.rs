// Replica Simulator Configuration

use serde::Deserialize;
use vl_rust::LedgerConfig;

// ============================================================================
// Main Configuration
// ============================================================================

/// Main configuration for a replica consensus simulation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplicaSimConfig {
    /// Total number of simulation rounds
    pub rounds: usize,

    /// Number of honest replicas
    pub num_nodes: usize,

    /// Random seed for reproducibility (set from the command line)
    #[serde(skip)]
    pub seed: Option<[u8; 32]>,

    /// Ledger settings shared by every replica
    pub ledger: LedgerConfig,

    /// Network behaviour
    pub network: NetworkConfig,

    /// Every replica runs `resolve_conflicts` each N rounds
    pub resolve_every: usize,

    /// Optional peer serving a longer but tampered chain
    pub forger: Option<ForgerConfig>,
}

impl Default for ReplicaSimConfig {
    fn default() -> Self {
        Self {
            rounds: 50,
            num_nodes: 5,
            seed: None,
            ledger: LedgerConfig {
                difficulty: 2,
                max_seal_iterations: None,
            },
            network: NetworkConfig::default(),
            resolve_every: 5,
            forger: None,
        }
    }
}

impl ReplicaSimConfig {
    pub fn summary(&self) -> String {
        format!(
            "{} nodes, {} rounds, difficulty {}, offline {:.0}%, append {:.0}%, resolve every {}{}",
            self.num_nodes,
            self.rounds,
            self.ledger.difficulty,
            self.network.offline_fraction * 100.0,
            self.network.append_probability * 100.0,
            self.resolve_every,
            if self.forger.is_some() { ", with forger" } else { "" }
        )
    }
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Chance per round that a replica is unreachable (0.0 to 1.0)
    pub offline_fraction: f64,

    /// Chance per round that a replica records a local vote
    pub append_probability: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            offline_fraction: 0.2,
            append_probability: 0.3,
        }
    }
}

// ============================================================================
// Adversary
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForgerConfig {
    /// How many blocks longer than the honest maximum the forged chain is
    pub extra_blocks: usize,
}

impl Default for ForgerConfig {
    fn default() -> Self {
        Self { extra_blocks: 10 }
    }
}

// Replica Consensus Simulator Module

pub mod config;
pub mod runner;
pub mod stats;

// Re-export commonly used types
pub use config::{ForgerConfig, NetworkConfig, ReplicaSimConfig};
pub use runner::ReplicaSimRunner;
pub use stats::{NodeOutcome, RoundMetrics, SimulationResult};

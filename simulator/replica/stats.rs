// Replica Simulator Statistics

use vl_rust::SyncStats;

// ============================================================================
// Simulation Result
// ============================================================================

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub config_summary: String,
    pub seed_used: [u8; 32],
    pub total_rounds: usize,

    /// Blocks appended by honest replicas
    pub appended: usize,

    /// Sampled each round
    pub history: Vec<RoundMetrics>,

    /// Per replica state after the final resolve
    pub nodes: Vec<NodeOutcome>,

    /// All replicas hold the same tail after the final resolve
    pub converged: bool,

    /// Tie-breaking appends needed before convergence
    pub tie_breaks: usize,

    /// Any replica ended on the forged chain
    pub forged_adopted: bool,
}

/// Chain spread at a single round
#[derive(Debug, Clone, Copy)]
pub struct RoundMetrics {
    pub round: usize,
    pub offline: usize,
    pub min_len: usize,
    pub max_len: usize,
    pub distinct_tails: usize,
}

#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub node_id: String,
    pub len: usize,
    pub tail: String,
    pub valid: bool,
    pub sync: SyncStats,
}

impl SimulationResult {
    pub fn max_divergence(&self) -> usize {
        self.history
            .iter()
            .map(|m| m.distinct_tails)
            .max()
            .unwrap_or(0)
    }

    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║    REPLICA CONSENSUS SIMULATION RESULTS                ║");
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Configuration: {}", self.config_summary);
        println!("Rounds: {}", self.total_rounds);
        println!("Seed: {}", hex::encode(self.seed_used));
        println!();

        println!("═══ Chain Growth ═══");
        println!("  Appended: {} blocks", self.appended);
        println!("  Max divergence: {} distinct tails", self.max_divergence());
        for m in self.history.iter().step_by((self.history.len() / 10).max(1)) {
            println!(
                "  round {:>4}: offline {:>2}  len {}..{}  tails {}",
                m.round, m.offline, m.min_len, m.max_len, m.distinct_tails
            );
        }
        println!();

        println!("═══ Replicas ═══");
        for node in &self.nodes {
            println!(
                "  {:<10} len {:>4}  tail {}..  valid {}",
                node.node_id,
                node.len,
                &node.tail[..12.min(node.tail.len())],
                node.valid
            );
            println!(
                "             adopted {}  shorter {}  invalid {}  unreachable {}  broadcast {}/{}",
                node.sync.adopted,
                node.sync.rejected_shorter,
                node.sync.rejected_invalid,
                node.sync.unreachable,
                node.sync.broadcasts_delivered,
                node.sync.broadcasts_delivered + node.sync.broadcasts_failed
            );
        }
        println!();

        println!("═══ Outcome ═══");
        println!("  Converged: {}", self.converged);
        println!("  Tie breaks: {}", self.tie_breaks);
        println!("  Forged chain adopted: {}", self.forged_adopted);
    }
}

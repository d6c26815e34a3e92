// Replica Simulator Runner
//
// Honest replicas share one MemoryTransport. Each round some replicas drop
// off the network, some record a vote (and announce it), and on every
// `resolve_every` round the reachable ones run the longest-valid-chain rule.
// At the end everyone comes back online and resolves until the tails agree.

use std::sync::Arc;

use hashbrown::HashSet;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use vl_rust::vl_interface::now_timestamp;
use vl_rust::{Entry, Ledger, LedgerError, MemoryTransport, PeerTransport, ReplicaNode};

use super::config::ReplicaSimConfig;
use super::stats::{NodeOutcome, RoundMetrics, SimulationResult};

const FORGER: &str = "forger";
const MAX_TIE_BREAKS: usize = 5;

pub struct ReplicaSimRunner {
    config: ReplicaSimConfig,
    rng: StdRng,
    seed: [u8; 32],
    transport: Arc<MemoryTransport>,
    nodes: Vec<ReplicaNode>,
    genesis_timestamp: String,
}

impl ReplicaSimRunner {
    pub fn new(mut config: ReplicaSimConfig) -> Result<Self, LedgerError> {
        config.network.offline_fraction = config.network.offline_fraction.clamp(0.0, 1.0);
        config.network.append_probability = config.network.append_probability.clamp(0.0, 1.0);

        let seed = config.seed.unwrap_or_else(|| {
            let mut s = [0u8; 32];
            rand::thread_rng().fill(&mut s);
            s
        });

        let transport = Arc::new(MemoryTransport::new());
        // one genesis for everybody, so chains only differ after block 0
        let genesis_timestamp = now_timestamp();

        let names: Vec<String> = (0..config.num_nodes).map(|i| format!("node-{}", i)).collect();
        let mut nodes = Vec::with_capacity(names.len());
        for name in &names {
            let ledger = Arc::new(Ledger::new_at(
                config.ledger.clone(),
                genesis_timestamp.clone(),
            )?);
            transport.register(name.clone(), Arc::clone(&ledger));

            let dyn_transport: Arc<dyn PeerTransport> = transport.clone();
            let node = ReplicaNode::new(name.clone(), ledger, dyn_transport);
            for peer in names.iter().filter(|p| *p != name) {
                node.add_peer(peer.clone());
            }
            if config.forger.is_some() {
                node.add_peer(FORGER);
            }
            nodes.push(node);
        }

        Ok(Self {
            rng: StdRng::from_seed(seed),
            seed,
            config,
            transport,
            nodes,
            genesis_timestamp,
        })
    }

    pub fn run(mut self) -> Result<SimulationResult, LedgerError> {
        let mut appended = 0;
        let mut history = Vec::with_capacity(self.config.rounds);

        if let Some(forger) = self.config.forger.clone() {
            self.install_forger(self.config.rounds + forger.extra_blocks)?;
        }

        for round in 1..=self.config.rounds {
            let mut offline = vec![false; self.nodes.len()];
            for (i, node) in self.nodes.iter().enumerate() {
                offline[i] = self.rng.gen_bool(self.config.network.offline_fraction);
                self.transport.set_offline(node.node_id(), offline[i]);
            }

            for i in 0..self.nodes.len() {
                if self.rng.gen_bool(self.config.network.append_probability) {
                    let vote = self.random_vote();
                    self.nodes[i].append(vote)?;
                    appended += 1;
                }
            }

            if self.config.resolve_every > 0 && round % self.config.resolve_every == 0 {
                for (i, node) in self.nodes.iter().enumerate() {
                    if !offline[i] {
                        node.resolve_conflicts();
                    }
                }
            }

            history.push(self.metrics(round, offline.iter().filter(|o| **o).count()));
        }

        // heal the network
        for node in &self.nodes {
            self.transport.set_offline(node.node_id(), false);
        }

        let mut tie_breaks = 0;
        let mut converged = self.resolve_all();
        while !converged && tie_breaks < MAX_TIE_BREAKS {
            // equal-length forks never resolve on their own
            let vote = self.random_vote();
            self.nodes[0].append(vote)?;
            appended += 1;
            tie_breaks += 1;
            converged = self.resolve_all();
        }

        let forged_tail = self
            .transport
            .fetch_chain(&FORGER.to_string())
            .ok()
            .and_then(|chain| chain.last().map(|b| b.hash.clone()));

        let nodes: Vec<NodeOutcome> = self
            .nodes
            .iter()
            .map(|node| NodeOutcome {
                node_id: node.node_id().to_string(),
                len: node.ledger().len(),
                tail: node.ledger().tail().hash,
                valid: node.ledger().validate(),
                sync: node.sync_stats(),
            })
            .collect();

        let forged_adopted = forged_tail
            .map(|tail| nodes.iter().any(|n| n.tail == tail))
            .unwrap_or(false);

        Ok(SimulationResult {
            config_summary: self.config.summary(),
            seed_used: self.seed,
            total_rounds: self.config.rounds,
            appended,
            history,
            nodes,
            converged,
            tie_breaks,
            forged_adopted,
        })
    }

    /// Two resolve passes over every replica; true once all tails agree
    fn resolve_all(&self) -> bool {
        for _ in 0..2 {
            for node in &self.nodes {
                node.resolve_conflicts();
            }
        }
        self.distinct_tails() <= 1
    }

    /// A chain of `len` sealed blocks with one entry altered after sealing
    fn install_forger(&mut self, len: usize) -> Result<(), LedgerError> {
        let ledger = Ledger::new_at(self.config.ledger.clone(), self.genesis_timestamp.clone())?;
        while ledger.len() < len {
            let vote = self.random_vote();
            ledger.append(vote)?;
        }

        let mut chain = ledger.snapshot();
        if let Some(entry) = chain.get_mut(1).and_then(|b| b.entries.first_mut()) {
            entry.encrypted_choice = b"rewritten".to_vec();
        }
        self.transport.register_chain(FORGER, chain);
        Ok(())
    }

    fn random_vote(&mut self) -> Entry {
        let mut voter = [0u8; 16];
        self.rng.fill_bytes(&mut voter);
        let mut ciphertext = vec![0u8; 16];
        self.rng.fill_bytes(&mut ciphertext);
        let origin = blake3::hash(&self.rng.next_u32().to_le_bytes());

        Entry::new(
            blake3::hash(&voter).to_hex().to_string(),
            ciphertext,
            voter.to_vec(),
            now_timestamp(),
            origin.to_hex().to_string(),
        )
    }

    fn distinct_tails(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.ledger().tail().hash)
            .collect::<HashSet<_>>()
            .len()
    }

    fn metrics(&self, round: usize, offline: usize) -> RoundMetrics {
        let lens = self.nodes.iter().map(|n| n.ledger().len());
        RoundMetrics {
            round,
            offline,
            min_len: lens.clone().min().unwrap_or(0),
            max_len: lens.max().unwrap_or(0),
            distinct_tails: self.distinct_tails(),
        }
    }
}

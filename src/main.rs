use std::env;
use std::error::Error;
use std::sync::Arc;

use log::{info, warn, LevelFilter};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use simple_logger::SimpleLogger;

use vl_rust::vl_interface::now_timestamp;
use vl_rust::{
    CastError, Entry, Ledger, LedgerConfig, MemoryTransport, NodeConfig, PeerTransport,
    ReplicaNode, VotingContext,
};

const VOTES: usize = 24;
const CHOICES: [&str; 3] = ["alpha", "beta", "gamma"];

fn random_vote(rng: &mut StdRng, origins: &[String]) -> Entry {
    let mut voter = [0u8; 16];
    rng.fill_bytes(&mut voter);

    // stand-in for an encrypted ballot and its tag
    let choice = CHOICES.choose(rng).copied().unwrap_or("alpha");
    let mut ciphertext = vec![0u8; 24];
    rng.fill_bytes(&mut ciphertext);
    ciphertext.extend_from_slice(choice.as_bytes());
    let signature = blake3::keyed_hash(&[7u8; 32], &ciphertext).as_bytes().to_vec();

    Entry::new(
        blake3::hash(&voter).to_hex().to_string(),
        ciphertext,
        signature,
        now_timestamp(),
        origins.choose(rng).cloned().unwrap_or_default(),
    )
}

fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    info!("starting");

    let config = match env::args().nth(1) {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig {
            ledger: LedgerConfig {
                difficulty: 2,
                ..LedgerConfig::default()
            },
            ..NodeConfig::default()
        },
    };

    let mut seed = [0u8; 32];
    rand::thread_rng().fill(&mut seed);
    let mut rng = StdRng::from_seed(seed);

    let origins: Vec<String> = (0..4)
        .map(|i| blake3::hash(format!("10.0.0.{}", i).as_bytes()).to_hex().to_string())
        .collect();

    // sharded casting
    let context = VotingContext::from_config(&config)?;

    let mut cast = Vec::new();
    for _ in 0..VOTES {
        let vote = random_vote(&mut rng, &origins);
        let identity = vote.identity_hash.clone();
        let receipt = context.cast(vote)?;
        info!(
            "cast {}.. -> shard {} block {} nonce {}",
            &identity[..8],
            receipt.shard,
            receipt.block_index,
            receipt.nonce
        );
        cast.push(identity);
    }

    // duplicate detection
    if let Some(identity) = cast.choose(&mut rng) {
        let mut again = random_vote(&mut rng, &origins);
        again.identity_hash = identity.clone();
        match context.cast(again) {
            Err(CastError::AlreadyRecorded(location)) => info!(
                "duplicate {}.. refused (first seen in block {})",
                &identity[..8],
                location.block_index
            ),
            other => warn!("duplicate {}.. not refused: {:?}", &identity[..8], other),
        }

        if let Some(proof) = context.prove(identity) {
            info!(
                "inclusion proof for {}.. against {}: {}",
                &identity[..8],
                proof.commitment,
                context.verify_proof(&proof)
            );
        }
    }

    let stats = context.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    // replica consensus
    let transport = Arc::new(MemoryTransport::new());
    let names = ["replica-a", "replica-b", "replica-c"];
    let replicas: Vec<ReplicaNode> = names
        .iter()
        .map(|name| -> Result<ReplicaNode, Box<dyn Error>> {
            let ledger = Arc::new(Ledger::new(config.ledger.clone())?);
            transport.register(*name, Arc::clone(&ledger));
            let dyn_transport: Arc<dyn PeerTransport> = transport.clone();
            let node = ReplicaNode::new(*name, ledger, dyn_transport);
            for peer in names.iter().filter(|p| *p != name) {
                node.add_peer(*peer);
            }
            Ok(node)
        })
        .collect::<Result<_, _>>()?;

    // a works alone for a while
    transport.set_offline("replica-b", true);
    transport.set_offline("replica-c", true);
    for _ in 0..3 {
        replicas[0].append(random_vote(&mut rng, &origins))?;
    }
    transport.set_offline("replica-b", false);
    transport.set_offline("replica-c", false);

    replicas[1].append(random_vote(&mut rng, &origins))?;

    for replica in &replicas {
        let replaced = replica.resolve_conflicts();
        info!(
            "{}: resolve -> replaced {} len {}",
            replica.node_id(),
            replaced,
            replica.ledger().len()
        );
    }

    // online again: new blocks propagate by announcement
    replicas[2].append(random_vote(&mut rng, &origins))?;

    for replica in &replicas {
        info!(
            "{}: len {} tail {} valid {} {:?}",
            replica.node_id(),
            replica.ledger().len(),
            replica.ledger().tail().hash,
            replica.ledger().validate(),
            replica.sync_stats()
        );
    }

    info!("let seed = {:?};", seed);
    info!(
        "done. votes {} shards {} valid {}",
        stats.total_votes,
        stats.shards.len(),
        stats.all_valid
    );

    Ok(())
}

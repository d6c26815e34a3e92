// Replica Simulator - run longest-valid-chain scenarios over an in-memory network
//
// Usage:
//   cargo run --bin replica_sim                                 (built-in defaults)
//   cargo run --bin replica_sim scenarios/partition.yaml
//   cargo run --bin replica_sim scenarios/                      (runs all .yaml files in directory)
//   cargo run --bin replica_sim scenarios/forger.yaml --seed 0x1234...

mod replica;

use std::env;
use std::fs;
use std::path::Path;

use log::LevelFilter;
use simple_logger::SimpleLogger;

use replica::{ReplicaSimConfig, ReplicaSimRunner};

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    meta: ScenarioMeta,

    #[serde(default)]
    config: ReplicaSimConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
}

fn main() {
    // library warnings about rejected peers would drown the summary
    SimpleLogger::new()
        .with_level(LevelFilter::Error)
        .init()
        .unwrap();

    let args: Vec<String> = env::args().collect();

    let seed = args
        .iter()
        .position(|a| a == "--seed")
        .and_then(|i| args.get(i + 1))
        .map(|s| {
            parse_seed_hex(s).unwrap_or_else(|e| {
                eprintln!("{}", e);
                std::process::exit(1);
            })
        });

    let path = args.get(1).filter(|a| *a != "--seed").map(Path::new);

    match path {
        None => {
            let mut config = ReplicaSimConfig::default();
            config.seed = seed;
            run_config("defaults", None, config);
        }
        Some(path) if path.is_file() => run_scenario_file(path, seed),
        Some(path) if path.is_dir() => run_scenario_directory(path, seed),
        Some(path) => {
            eprintln!("Error: Path does not exist: {}", path.display());
            std::process::exit(1);
        }
    }
}

fn run_scenario_directory(dir: &Path, seed: Option<[u8; 32]>) {
    let mut scenarios = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path.extension().and_then(|s| s.to_str());
            if ext == Some("yaml") || ext == Some("yml") {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("Found {} scenario(s) to run\n", scenarios.len());

    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        run_scenario_file(scenario_path, seed);
    }
}

fn run_scenario_file(path: &Path, seed: Option<[u8; 32]>) {
    println!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let name = scenario.meta.name.unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("scenario")
            .to_string()
    });

    let mut config = scenario.config;
    config.seed = seed;
    run_config(&name, scenario.meta.description.as_deref(), config);
}

fn run_config(name: &str, description: Option<&str>, config: ReplicaSimConfig) {
    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  {}{}║", name, " ".repeat(54_usize.saturating_sub(name.len())));
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(desc) = description {
        println!("{}\n", desc);
    }

    println!("Configuration: {}", config.summary());
    println!("\nStarting simulation...\n");

    let result = ReplicaSimRunner::new(config).and_then(|runner| runner.run());

    match result {
        Ok(result) => {
            result.print_summary();
            println!("\n✓ Scenario complete!\n");
        }
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// 32-byte seed from 64 hex characters, with or without a `0x` prefix
fn parse_seed_hex(text: &str) -> Result<[u8; 32], String> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    let bytes = hex::decode(digits).map_err(|e| format!("invalid hex seed: {}", e))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| format!("seed must be 32 bytes, got {}", bytes.len()))
}

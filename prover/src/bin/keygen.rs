//! Key Generation CLI for the WhaleVault circuits
//!
//! Generates proving and verifying keys for the withdraw and transfer
//! circuits and writes them as `<kind>.pk` / `<kind>.vk` into one directory.
//!
//! Usage:
//!   cargo run --package whalevault-prover --bin keygen -- --out-dir ./keys
//!
//! Note: Keys must be regenerated whenever a circuit changes.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ark_std::rand::{SeedableRng, rngs::StdRng};

use whalevault_prover::constants::{NUM_PUBLIC_INPUTS, TREE_DEPTH};
use whalevault_prover::prover::key_paths;
use whalevault_prover::{Groth16Prover, ProofKind};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut out_dir = PathBuf::from("./keys");
    let mut seed: Option<u64> = None;
    let mut force = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--out-dir" => {
                i += 1;
                if i < args.len() {
                    out_dir = PathBuf::from(&args[i]);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    seed = Some(args[i].parse().context("--seed must be an integer")?);
                }
            }
            "--force" | "-f" => {
                force = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let kinds = [ProofKind::Withdraw, ProofKind::Transfer];
    let all_exist = kinds.iter().all(|kind| {
        let (pk, vk) = key_paths(&out_dir, *kind);
        pk.exists() && vk.exists()
    });
    if !force && all_exist {
        println!("Keys already exist in {}", out_dir.display());
        println!("\nUse --force to regenerate keys.");
        return Ok(());
    }

    println!("WhaleVault Key Generation");
    println!("=========================");
    println!("  Tree depth:    {}", TREE_DEPTH);
    println!("  Public inputs: {} per circuit", NUM_PUBLIC_INPUTS);
    println!("    withdraw: root, nullifier_hash, recipient, amount");
    println!("    transfer: root, nullifier_hash, new_commitment, amount");
    println!();

    let mut rng = match seed {
        Some(seed) => {
            println!("WARNING: deterministic seed {seed}; keys are NOT safe for production");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };

    println!("Performing Groth16 circuit-specific setup...");
    let start = std::time::Instant::now();
    let prover = Groth16Prover::setup(&mut rng).context("Failed to perform circuit setup")?;
    println!("Setup complete in {:?}", start.elapsed());
    println!();

    fs::create_dir_all(&out_dir).context("Failed to create key directory")?;

    for kind in kinds {
        let keys = prover.keys(kind);
        let (pk_bytes, vk_bytes) = keys.to_bytes()?;
        let (pk_path, vk_path) = key_paths(&out_dir, kind);

        fs::write(&pk_path, &pk_bytes)
            .with_context(|| format!("Failed to write {}", pk_path.display()))?;
        fs::write(&vk_path, &vk_bytes)
            .with_context(|| format!("Failed to write {}", vk_path.display()))?;

        println!("{kind}:");
        println!(
            "  {} ({:.2} MB)",
            pk_path.display(),
            pk_bytes.len() as f64 / 1024.0 / 1024.0
        );
        println!("  {} ({} bytes)", vk_path.display(), vk_bytes.len());
        println!("  vk hash (blake3): {}", hex::encode(keys.vk_hash()?));
    }

    println!();
    println!("Key generation complete!");
    println!();
    println!("To use with the WhaleVault server:");
    println!("  export WV_PROVER_MODE=groth16");
    println!("  export WV_PROVER_KEYS_DIR={}", out_dir.display());

    Ok(())
}

fn print_help() {
    println!("WhaleVault Key Generation Tool");
    println!();
    println!("USAGE:");
    println!("    keygen [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --out-dir <PATH>   Directory for key files (default: ./keys)");
    println!("    --seed <N>         Deterministic RNG seed (testing only)");
    println!("    --force, -f        Overwrite existing keys");
    println!("    --help, -h         Show this help message");
}

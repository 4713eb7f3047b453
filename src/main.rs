use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multibank_core::config::{GenesisConfig, SimulatorConfig, TokenConfig};
use multibank_core::identity::Identity;
use multibank_core::{Chain, Receipt};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod script;

const DEFAULT_CONFIG: &str = "multibank.toml";

#[derive(Parser)]
#[command(name = "multibank", version, about = "MultiBank ledger simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a fresh signing key
    Keygen {
        #[arg(long, default_value = "anonymous")]
        name: String,
    },
    /// Print the address of a development identity
    Address { name: String },
    /// Build genesis from a config and execute a script of signed calls
    Run {
        /// Genesis config; `multibank.toml` is tried when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        script: PathBuf,
        /// Write the final state snapshot here
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Run the built-in claim/deposit/faucet walkthrough
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Keygen { name } => {
            init_logging("info");
            keygen_cmd(name)
        }
        Command::Address { name } => {
            init_logging("info");
            println!("{}", Identity::dev(&name).address());
            Ok(())
        }
        Command::Run {
            config: config_path,
            script,
            snapshot,
        } => {
            let config = load_config(config_path.as_deref())?;
            init_logging(&config.log_level);
            match &config_path {
                Some(path) => info!(path = %path.display(), "config loaded"),
                None if Path::new(DEFAULT_CONFIG).exists() => {
                    info!(path = DEFAULT_CONFIG, "config loaded")
                }
                None => info!("{DEFAULT_CONFIG} not found, using default genesis"),
            }
            run_cmd(&config, &script, snapshot.as_deref())
        }
        Command::Demo => {
            init_logging("info");
            demo_cmd()
        }
    }
}

/// An explicit path must exist; only the implicit default may be absent.
fn load_config(explicit: Option<&Path>) -> Result<SimulatorConfig> {
    let config = match explicit {
        Some(path) => SimulatorConfig::load(path)?,
        None => SimulatorConfig::load_or_default(Path::new(DEFAULT_CONFIG))?,
    };
    Ok(config)
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

//==================== commands ====================//

fn keygen_cmd(name: String) -> Result<()> {
    let identity = Identity::generate(name);
    let out = json!({
        "name": identity.name(),
        "address": identity.address().to_string(),
        "public_key": hex::encode(identity.verifying_key().to_bytes()),
        "secret_key": hex::encode(identity.signing_key().to_bytes()),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_cmd(config: &SimulatorConfig, script_path: &Path, snapshot: Option<&Path>) -> Result<()> {
    info!(
        owner = %config.genesis.owner,
        authorized = config.genesis.authorized.len(),
        "building genesis"
    );
    let mut chain = Chain::genesis(&config.genesis).context("genesis failed")?;
    info!(bank = %chain.bank_address(), "genesis complete");
    let steps = script::load(script_path)?;
    let receipts = script::run(&mut chain, &steps)?;
    print_receipts(&receipts)?;
    chain
        .check_invariants()
        .context("ledger invariants broken after script")?;

    if let Some(path) = snapshot {
        let body = serde_json::to_vec_pretty(&chain.snapshot())?;
        std::fs::write(path, body)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        info!(path = %path.display(), height = chain.height(), "snapshot written");
    }
    Ok(())
}

fn demo_cmd() -> Result<()> {
    let genesis = GenesisConfig {
        authorized: vec!["alice".into()],
        faucet_amount: 10,
        bank_reserve: 100,
        token: Some(TokenConfig {
            pool_funding: 3_000,
            allocations: [("alice".to_string(), 1_000)].into_iter().collect(),
            ..TokenConfig::default()
        }),
        ..GenesisConfig::default()
    };
    let mut chain = Chain::genesis(&genesis).context("genesis failed")?;
    let steps: Vec<script::Step> = serde_json::from_value(json!([
        { "signer": "alice", "call": { "token_approve": { "token": "@token", "spender": "@bank", "value": 4000 } } },
        { "signer": "alice", "call": { "bank": { "type": "claim", "value": 400 } } },
        { "signer": "alice", "call": { "bank": { "type": "deposit", "value": 200 } } },
        { "signer": "alice", "call": { "bank": { "type": "deposit", "value": 400 } } },
        { "signer": "owner", "call": { "bank": { "type": "faucet", "target": "@alice" } } },
        { "signer": "guest", "call": { "bank": { "type": "claim", "value": 10 } } }
    ]))?;
    let receipts = script::run(&mut chain, &steps)?;
    print_receipts(&receipts)?;
    chain.check_invariants().context("ledger invariants broken")?;

    let alice = Identity::dev("alice").address();
    let bank = chain.bank();
    let summary = json!({
        "pool": bank.current_balance(),
        "alice": {
            "debet": bank.balance_of(&alice, 0)?,
            "credit": bank.balance_of(&alice, 1)?,
            "token": chain.bank_token_balance(&alice),
            "native": chain.native_balance(&alice),
        },
        "bank_native": chain.native_balance(&chain.bank_address()),
        "head": hex::encode(chain.head()),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_receipts(receipts: &[Receipt]) -> Result<()> {
    for receipt in receipts {
        println!("{}", serde_json::to_string(receipt)?);
    }
    Ok(())
}

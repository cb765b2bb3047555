//! # Relay CLI
//!
//! Runs the multicall and multisig workflows against an in-memory devnet.
//!
//! ## Usage
//!
//! ```bash
//! # Batched account execution
//! relay --config hints.json multicall
//!
//! # 2-of-3 multisig relay, report as JSON
//! relay --config hints.json multisig --json
//!
//! # Both flows on one chain
//! relay -vv --config hints.json all
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use account_relay::{
    init_tracing, run_multicall, run_multisig, ChainClient, Devnet, DevnetConfig, RelayConfig, VERSION,
};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Batched account execution and multi-owner relay workflows")]
#[command(version)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Hints file with PRIVATE_KEY, MAX_FEE and contract paths
    #[arg(short, long, default_value = "hints.json")]
    config: PathBuf,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    devnet: DevnetArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DevnetArgs {
    /// Total amount held by the devnet faucet
    #[arg(long)]
    faucet_balance: Option<u128>,

    /// Amount credited to each funded account
    #[arg(long)]
    funding_amount: Option<u128>,

    /// Flat fee charged per invoke
    #[arg(long)]
    fee_per_invoke: Option<u128>,
}

impl DevnetArgs {
    fn to_config(&self) -> DevnetConfig {
        let defaults = DevnetConfig::default();
        DevnetConfig {
            faucet_balance: self.faucet_balance.unwrap_or(defaults.faucet_balance),
            funding_amount: self.funding_amount.unwrap_or(defaults.funding_amount),
            fee_per_invoke: self.fee_per_invoke.unwrap_or(defaults.fee_per_invoke),
            ..defaults
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a multicall account and execute one batched transaction
    Multicall,
    /// Deploy owner accounts and a multisig, then submit, confirm and execute
    Multisig,
    /// Run both workflows on the same chain
    All,
}

fn print_report<T: Serialize>(title: &str, report: &T, json: bool) -> Result<()> {
    let rendered = if json {
        serde_json::to_string_pretty(report)?
    } else {
        format!("{}\n{}", title, serde_json::to_string_pretty(report)?)
    };
    println!("{}", rendered);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    init_tracing(level);

    let config = RelayConfig::load(&cli.config)
        .and_then(RelayConfig::with_env_overrides)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    info!("relay v{} using devnet", VERSION);
    let client: Arc<dyn ChainClient> = Arc::new(Devnet::with_contracts(cli.devnet.to_config(), &config.contracts));

    match cli.command {
        Commands::Multicall => {
            let report = run_multicall(client, &config).await?;
            print_report("Multicall", &report, cli.json)
        }
        Commands::Multisig => {
            let report = run_multisig(client, &config).await?;
            print_report("Multisig", &report, cli.json)
        }
        Commands::All => {
            let multicall = run_multicall(client.clone(), &config).await?;
            let multisig = run_multisig(client, &config).await?;
            if cli.json {
                print_report(
                    "All",
                    &serde_json::json!({ "multicall": multicall, "multisig": multisig }),
                    true,
                )
            } else {
                print_report("Multicall", &multicall, false)?;
                print_report("Multisig", &multisig, false)
            }
        }
    }
}

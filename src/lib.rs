//! # Account Relay
//!
//! Batched account execution ("multicall") and multi-owner transaction relay
//! ("multisig") workflows for StarkNet-style chains, together with an
//! in-memory devnet that hosts the account, multisig and evaluator contracts.

pub mod blockchain;
pub mod config;
pub mod devnet;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use types::{RelayError, RelayResult};
pub use config::{ContractPaths, RelayConfig};

// Re-export the chain seam and contract handles
pub use blockchain::client::ChainClient;
pub use blockchain::contracts::{EvaluatorContract, MulticallAccount, MultisigContract, SignerAccount};
pub use blockchain::signing::StarkSigner;
pub use blockchain::types::{CallArrayEntry, CallBatch, InclusionResult, TransactionState};

// Re-export the devnet
pub use devnet::{ContractKind, Devnet, DevnetConfig};

// Re-export workflows
pub use workflow::{run_multicall, run_multisig, MulticallReport, MultisigReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a `tracing` subscriber honouring `RUST_LOG`, defaulting to `default_level`
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // a subscriber may already be installed by a test harness or an embedding binary
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

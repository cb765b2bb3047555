//! # Blockchain Integration
//!
//! Chain-facing types, signing, the [`ChainClient`] seam and typed contract handles.

pub mod client;
pub mod contracts;
pub mod signing;
pub mod types;

pub use client::{wait_for_transaction, ChainClient};
pub use contracts::{EvaluatorContract, InvocationRecord, MulticallAccount, MultisigContract, SignerAccount, TransactionView};
pub use signing::{invoke_tx_hash, sign_digest, StarkSigner};
pub use types::*;

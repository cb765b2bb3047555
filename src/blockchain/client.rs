//! # Chain Client
//!
//! The SDK surface the workflows consume. Every step of a workflow is a
//! request/response call against this trait; the in-memory devnet is the
//! implementation shipped with the crate.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use starknet::core::types::FieldElement;
use tracing::{debug, warn};

use crate::blockchain::types::{Deployment, InclusionResult, InvokeTransaction, TransactionReceipt};
use crate::types::{RelayError, RelayResult};

/// Operations required from a StarkNet-style chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Deploy the contract class stored at `contract_path`
    async fn deploy(
        &self,
        contract_path: &Path,
        constructor_args: Vec<FieldElement>,
    ) -> RelayResult<Deployment>;

    /// Current nonce of an account contract
    async fn get_nonce(&self, account: FieldElement) -> RelayResult<FieldElement>;

    /// Call a contract function (read-only)
    async fn call(
        &self,
        contract_address: FieldElement,
        selector: FieldElement,
        calldata: Vec<FieldElement>,
    ) -> RelayResult<Vec<FieldElement>>;

    /// Submit a signed invoke transaction to an account's `__execute__`
    async fn execute(&self, transaction: InvokeTransaction) -> RelayResult<TransactionReceipt>;

    /// Block until the transaction is included and return what it emitted
    async fn await_inclusion(&self, receipt: &TransactionReceipt) -> RelayResult<InclusionResult>;

    /// Credit an account from the faucet, returning the reward account
    async fn fund_account(&self, address: FieldElement) -> RelayResult<FieldElement>;

    /// Address of the evaluator contract the workflows report to
    async fn evaluator(&self) -> RelayResult<FieldElement>;
}

/// Poll `await_inclusion` until it succeeds or `timeout` elapses.
///
/// Only `TransactionNotFound` is treated as "not yet included"; any other
/// error is returned immediately.
pub async fn wait_for_transaction(
    client: &dyn ChainClient,
    receipt: &TransactionReceipt,
    timeout: Duration,
    poll_interval: Duration,
) -> RelayResult<InclusionResult> {
    let start = tokio::time::Instant::now();

    loop {
        match client.await_inclusion(receipt).await {
            Ok(result) => return Ok(result),
            Err(RelayError::TransactionNotFound(hash)) => {
                if start.elapsed() > timeout {
                    warn!("Transaction {:#x} not included after {:?}", hash, timeout);
                    return Err(RelayError::TransactionNotFound(hash));
                }
                debug!("Transaction {:#x} not included yet, polling again", hash);
            }
            Err(e) => return Err(e),
        }

        tokio::time::sleep(poll_interval).await;
    }
}

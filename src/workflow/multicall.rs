//! Batched account execution: one signed `__execute__` fanning out to the
//! evaluator's `validate_multicall` once per reward-account argument.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blockchain::client::ChainClient;
use crate::blockchain::contracts::{EvaluatorContract, MulticallAccount};
use crate::blockchain::signing::StarkSigner;
use crate::blockchain::types::selectors;
use crate::config::RelayConfig;
use crate::workflow::{felt_hex, StepReceipt};

/// Number of calls packed into the batch
pub const MULTICALL_BATCH_SIZE: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticallReport {
    pub account: String,
    pub reward_account: String,
    pub evaluator: String,
    pub calls: usize,
    pub nonce_before: String,
    pub nonce_after: String,
    pub evaluator_invocations: usize,
    pub execution: StepReceipt,
    pub completed_at: DateTime<Utc>,
}

/// Deploy a multicall account, fund it and execute one batched transaction
pub async fn run_multicall(client: Arc<dyn ChainClient>, config: &RelayConfig) -> Result<MulticallReport> {
    info!("Starting multicall workflow");

    let signer = StarkSigner::new(config.private_key);
    let account = MulticallAccount::deploy(client.clone(), &config.contracts.multicall, signer, config.max_fee)
        .await
        .context("Failed to deploy multicall account")?;

    let reward_account = client
        .fund_account(account.address())
        .await
        .context("Account must have funds to cover transaction fees")?;

    let evaluator = EvaluatorContract::from_client(client.clone())
        .await
        .context("Failed to locate evaluator")?;

    let nonce_before = account.nonce().await.context("Failed to read account nonce")?;

    let calls = (0..MULTICALL_BATCH_SIZE)
        .map(|_| evaluator.validate_multicall_call(reward_account))
        .collect();
    let inclusion = account
        .execute_calls(calls)
        .await
        .context("Multicall execution failed")?;

    let nonce_after = account.nonce().await.context("Failed to read account nonce")?;
    let evaluator_invocations = evaluator
        .invocation_count(*selectors::VALIDATE_MULTICALL)
        .await
        .context("Failed to read evaluator invocations")?;

    info!(
        "Multicall workflow complete: {} calls in tx {:#x}, nonce {:#x} -> {:#x}",
        MULTICALL_BATCH_SIZE, inclusion.transaction_hash, nonce_before, nonce_after
    );

    Ok(MulticallReport {
        account: felt_hex(account.address()),
        reward_account: felt_hex(reward_account),
        evaluator: felt_hex(evaluator.address()),
        calls: MULTICALL_BATCH_SIZE,
        nonce_before: felt_hex(nonce_before),
        nonce_after: felt_hex(nonce_after),
        evaluator_invocations,
        execution: StepReceipt::from_inclusion("execute", &inclusion),
        completed_at: Utc::now(),
    })
}

//! Multi-owner relay: deploy the owner accounts and the multisig, submit a
//! `validate_multisig` call, gather confirmations from the other owners and
//! execute it from the submitting owner.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starknet::core::types::FieldElement;
use tracing::info;

use crate::blockchain::client::ChainClient;
use crate::blockchain::contracts::{EvaluatorContract, MultisigContract, SignerAccount};
use crate::blockchain::signing::StarkSigner;
use crate::blockchain::types::TransactionState;
use crate::config::RelayConfig;
use crate::workflow::{felt_hex, StepReceipt};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultisigReport {
    pub owners: Vec<String>,
    pub multisig: String,
    pub threshold: usize,
    pub reward_account: String,
    pub tx_id: String,
    pub confirmations: usize,
    pub state: TransactionState,
    pub steps: Vec<StepReceipt>,
    pub completed_at: DateTime<Utc>,
}

/// Owners confirming the transaction owner 0 submitted: the next `threshold`
/// owners in order, wrapping around to the submitter only when needed
fn confirming_owners(owner_count: usize, threshold: usize) -> Vec<usize> {
    (1..=threshold).map(|i| i % owner_count).collect()
}

pub async fn run_multisig(client: Arc<dyn ChainClient>, config: &RelayConfig) -> Result<MultisigReport> {
    info!(
        "Starting multisig workflow with {} owners, threshold {}",
        config.multisig_owners, config.multisig_threshold
    );

    let mut owners = Vec::with_capacity(config.multisig_owners);
    let mut reward_account = FieldElement::ZERO;
    for index in 0..config.multisig_owners {
        let signer = StarkSigner::new(config.owner_private_key(index));
        let owner = SignerAccount::deploy(client.clone(), &config.contracts.signature_basic, signer, config.max_fee)
            .await
            .with_context(|| format!("Failed to deploy signer account {}", index + 1))?;

        let funded = client
            .fund_account(owner.address())
            .await
            .with_context(|| format!("Signer account {} must have funds to cover transaction fees", index + 1))?;
        if index == 0 {
            reward_account = funded;
        }
        owners.push(owner);
    }

    let owner_addresses: Vec<FieldElement> = owners.iter().map(SignerAccount::address).collect();
    let multisig = MultisigContract::deploy(
        client.clone(),
        &config.contracts.multisig,
        &owner_addresses,
        config.multisig_threshold,
    )
    .await
    .context("Failed to deploy multisig")?;

    let evaluator = EvaluatorContract::from_client(client.clone())
        .await
        .context("Failed to locate evaluator")?;

    let mut steps = Vec::new();
    let submitter = &owners[0];

    let call = evaluator.validate_multisig_call(&[reward_account]);
    let (tx_id, inclusion) = multisig
        .submit(submitter, &call)
        .await
        .context("Failed to submit transaction to multisig")?;
    steps.push(StepReceipt::from_inclusion("submit", &inclusion));

    for index in confirming_owners(owners.len(), config.multisig_threshold) {
        let inclusion = multisig
            .confirm(&owners[index], tx_id)
            .await
            .with_context(|| format!("Owner {} failed to confirm {:#x}", index + 1, tx_id))?;
        steps.push(StepReceipt::from_inclusion(&format!("confirm_{}", index + 1), &inclusion));
    }

    let inclusion = multisig
        .execute(submitter, tx_id)
        .await
        .with_context(|| format!("Failed to execute multisig transaction {:#x}", tx_id))?;
    steps.push(StepReceipt::from_inclusion("execute", &inclusion));

    let view = multisig
        .transaction(tx_id)
        .await
        .context("Failed to read multisig transaction")?;
    if view.state != TransactionState::Executed {
        bail!("Multisig transaction {:#x} ended in state {:?}", tx_id, view.state);
    }

    info!(
        "Multisig workflow complete: tx {:#x} executed with {}/{} confirmations",
        tx_id, view.confirmations, config.multisig_threshold
    );

    Ok(MultisigReport {
        owners: owner_addresses.into_iter().map(felt_hex).collect(),
        multisig: felt_hex(multisig.address()),
        threshold: config.multisig_threshold,
        reward_account: felt_hex(reward_account),
        tx_id: felt_hex(tx_id),
        confirmations: view.confirmations,
        state: view.state,
        steps,
        completed_at: Utc::now(),
    })
}

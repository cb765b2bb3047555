//! # Relay Workflows
//!
//! End-to-end flows driven against any [`ChainClient`](crate::blockchain::ChainClient):
//! each step waits for the previous transaction to be included before the
//! next nonce is read, and the first failing step aborts the run.

pub mod multicall;
pub mod multisig;

use serde::{Deserialize, Serialize};
use starknet::core::types::FieldElement;
use tracing::debug;

use crate::blockchain::types::InclusionResult;

pub use multicall::{run_multicall, MulticallReport, MULTICALL_BATCH_SIZE};
pub use multisig::{run_multisig, MultisigReport};

/// Inclusion details of one workflow transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepReceipt {
    pub step: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub actual_fee: u128,
    pub events: usize,
}

impl StepReceipt {
    pub(crate) fn from_inclusion(step: &str, inclusion: &InclusionResult) -> Self {
        for event in &inclusion.events {
            debug!(
                "{}: event from {:#x} keys={:?} data={:?}",
                step,
                event.from_address,
                event.keys.iter().map(|k| format!("{:#x}", k)).collect::<Vec<_>>(),
                event.data.iter().map(|d| format!("{:#x}", d)).collect::<Vec<_>>()
            );
        }

        Self {
            step: step.to_string(),
            transaction_hash: felt_hex(inclusion.transaction_hash),
            block_number: inclusion.block_number,
            actual_fee: inclusion.actual_fee,
            events: inclusion.events.len(),
        }
    }
}

pub(crate) fn felt_hex(value: FieldElement) -> String {
    format!("{:#x}", value)
}

//! # In-Memory Devnet
//!
//! A single-node StarkNet-style chain that runs the relay contracts natively.
//! Every accepted invoke executes on a snapshot of the chain state, is
//! committed only when it succeeds, and is sealed into its own block.

pub mod accounts;
pub mod evaluator;
pub mod multisig;
pub mod state;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use starknet::core::crypto::compute_hash_on_elements;
use starknet::core::types::FieldElement;
use starknet::core::utils::{cairo_short_string_to_felt, get_contract_address, starknet_keccak};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::blockchain::client::ChainClient;
use crate::blockchain::types::{
    selectors, Deployment, InclusionResult, InvokeTransaction, TransactionReceipt,
};
use crate::config::ContractPaths;
use crate::types::{felt_to_u128, RelayError, RelayResult};

pub use evaluator::{EvaluatorState, Invocation};
pub use state::{ChainState, ContractKind, DeployedContract, ExecutionContext, TxInfo};

/// Devnet parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevnetConfig {
    pub chain_id: FieldElement,
    /// Total amount the faucet can hand out
    pub faucet_balance: u128,
    /// Amount credited per `fund_account`
    pub funding_amount: u128,
    /// Flat fee charged for every accepted invoke
    pub fee_per_invoke: u128,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            chain_id: starknet::core::chain_id::TESTNET,
            faucet_balance: 1_000_000_000_000_000_000_000,
            funding_amount: 1_000_000_000_000_000_000,
            fee_per_invoke: 1_000_000_000_000,
        }
    }
}

struct DevnetInner {
    state: ChainState,
    classes: HashMap<PathBuf, ContractKind>,
    receipts: HashMap<FieldElement, InclusionResult>,
    block_number: u64,
    faucet_balance: u128,
    deploy_counter: u64,
    evaluator: FieldElement,
}

/// In-memory chain implementing [`ChainClient`]
pub struct Devnet {
    config: DevnetConfig,
    inner: RwLock<DevnetInner>,
}

fn short_string(value: &str) -> RelayResult<FieldElement> {
    cairo_short_string_to_felt(value).map_err(|e| RelayError::Serialization(format!("{}: {}", value, e)))
}

fn class_hash(kind: ContractKind) -> FieldElement {
    starknet_keccak(kind.name().as_bytes())
}

impl Devnet {
    /// Start a chain at genesis with the evaluator predeployed
    pub fn new(config: DevnetConfig) -> Self {
        let mut state = ChainState::default();

        let evaluator = get_contract_address(
            FieldElement::ZERO,
            class_hash(ContractKind::Evaluator),
            &[],
            FieldElement::ZERO,
        );
        state.insert(
            evaluator,
            DeployedContract::Evaluator(EvaluatorState::new(evaluator)),
        );

        info!("Devnet started with evaluator at {:#x}", evaluator);

        Self {
            inner: RwLock::new(DevnetInner {
                state,
                classes: HashMap::new(),
                receipts: HashMap::new(),
                block_number: 0,
                faucet_balance: config.faucet_balance,
                deploy_counter: 1,
                evaluator,
            }),
            config,
        }
    }

    /// Start a chain with the relay contract classes registered under their configured paths
    pub fn with_contracts(config: DevnetConfig, contracts: &ContractPaths) -> Self {
        Self::new(config)
            .declare(&contracts.multicall, ContractKind::MulticallAccount)
            .declare(&contracts.signature_basic, ContractKind::SignerAccount)
            .declare(&contracts.multisig, ContractKind::Multisig)
    }

    /// Register the class stored at `path`
    pub fn declare(mut self, path: impl AsRef<Path>, kind: ContractKind) -> Self {
        let path = path.as_ref().to_path_buf();
        debug!("Declared {} class at {}", kind.name(), path.display());
        self.inner.get_mut().classes.insert(path, kind);
        self
    }

    pub fn config(&self) -> &DevnetConfig {
        &self.config
    }

    pub async fn balance(&self, address: FieldElement) -> u128 {
        self.inner.read().await.state.balance(&address)
    }

    pub async fn block_number(&self) -> u64 {
        self.inner.read().await.block_number
    }

    pub async fn faucet_balance(&self) -> u128 {
        self.inner.read().await.faucet_balance
    }

    fn transaction_hash(&self, transaction: &InvokeTransaction) -> RelayResult<FieldElement> {
        Ok(compute_hash_on_elements(&[
            short_string("invoke")?,
            transaction.sender_address,
            *selectors::EXECUTE,
            compute_hash_on_elements(&transaction.calldata),
            transaction.max_fee,
            self.config.chain_id,
        ]))
    }
}

#[async_trait]
impl ChainClient for Devnet {
    async fn deploy(&self, contract_path: &Path, constructor_args: Vec<FieldElement>) -> RelayResult<Deployment> {
        let mut inner = self.inner.write().await;

        let kind = *inner
            .classes
            .get(contract_path)
            .ok_or_else(|| RelayError::UnknownContractClass(contract_path.display().to_string()))?;

        let class_hash = class_hash(kind);
        let salt = FieldElement::from(inner.deploy_counter);
        let address = get_contract_address(salt, class_hash, &constructor_args, FieldElement::ZERO);
        let contract = DeployedContract::construct(kind, address, &constructor_args)?;

        let transaction_hash = compute_hash_on_elements(&[
            short_string("deploy")?,
            address,
            class_hash,
            compute_hash_on_elements(&constructor_args),
            self.config.chain_id,
        ]);

        inner.deploy_counter += 1;
        inner.state.insert(address, contract);
        inner.block_number += 1;
        let block_number = inner.block_number;
        inner.receipts.insert(
            transaction_hash,
            InclusionResult {
                transaction_hash,
                block_number,
                events: Vec::new(),
                actual_fee: 0,
                retdata: Vec::new(),
            },
        );

        info!("Deployed {} at {:#x} (block {})", kind.name(), address, block_number);

        Ok(Deployment {
            address,
            class_hash,
            transaction_hash,
        })
    }

    async fn get_nonce(&self, account: FieldElement) -> RelayResult<FieldElement> {
        let inner = self.inner.read().await;
        let contract = inner
            .state
            .contracts
            .get(&account)
            .ok_or(RelayError::ContractNotFound(account))?;

        contract.nonce().ok_or(RelayError::EntryPointNotFound {
            contract: account,
            selector: *selectors::GET_NONCE,
        })
    }

    async fn call(
        &self,
        contract_address: FieldElement,
        selector: FieldElement,
        calldata: Vec<FieldElement>,
    ) -> RelayResult<Vec<FieldElement>> {
        let mut snapshot = self.inner.read().await.state.clone();
        let mut ctx = ExecutionContext::new(&mut snapshot, TxInfo::default());
        ctx.call_contract(FieldElement::ZERO, contract_address, selector, &calldata)
    }

    async fn execute(&self, transaction: InvokeTransaction) -> RelayResult<TransactionReceipt> {
        let mut inner = self.inner.write().await;
        let sender = transaction.sender_address;

        match inner.state.kind_of(&sender) {
            Some(kind) if kind.is_account() => {}
            Some(_) => {
                return Err(RelayError::EntryPointNotFound {
                    contract: sender,
                    selector: *selectors::EXECUTE,
                })
            }
            None => return Err(RelayError::ContractNotFound(sender)),
        }

        let max_fee = felt_to_u128(transaction.max_fee).unwrap_or(u128::MAX);
        if max_fee < self.config.fee_per_invoke {
            return Err(RelayError::MaxFeeTooLow {
                max_fee,
                required: self.config.fee_per_invoke,
            });
        }
        let balance = inner.state.balance(&sender);
        if balance < max_fee {
            return Err(RelayError::InsufficientBalance {
                account: sender,
                balance,
                max_fee,
            });
        }

        let transaction_hash = self.transaction_hash(&transaction)?;
        let tx_info = TxInfo {
            account_address: sender,
            signature: transaction.signature.clone(),
            transaction_hash,
        };

        let mut snapshot = inner.state.clone();
        let mut ctx = ExecutionContext::new(&mut snapshot, tx_info);
        let retdata = match ctx.call_contract(FieldElement::ZERO, sender, *selectors::EXECUTE, &transaction.calldata) {
            Ok(retdata) => retdata,
            Err(e) => {
                warn!("Transaction {:#x} from {:#x} rejected: {}", transaction_hash, sender, e);
                return Err(e);
            }
        };
        let events = ctx.into_events();

        snapshot.debit(sender, self.config.fee_per_invoke);
        inner.state = snapshot;
        inner.block_number += 1;
        let block_number = inner.block_number;

        info!(
            "Transaction {:#x} from {:#x} included in block {} ({} events)",
            transaction_hash,
            sender,
            block_number,
            events.len()
        );

        inner.receipts.insert(
            transaction_hash,
            InclusionResult {
                transaction_hash,
                block_number,
                events,
                actual_fee: self.config.fee_per_invoke,
                retdata,
            },
        );

        Ok(TransactionReceipt { transaction_hash })
    }

    async fn await_inclusion(&self, receipt: &TransactionReceipt) -> RelayResult<InclusionResult> {
        self.inner
            .read()
            .await
            .receipts
            .get(&receipt.transaction_hash)
            .cloned()
            .ok_or(RelayError::TransactionNotFound(receipt.transaction_hash))
    }

    async fn fund_account(&self, address: FieldElement) -> RelayResult<FieldElement> {
        let mut inner = self.inner.write().await;
        let amount = self.config.funding_amount;

        if inner.faucet_balance < amount {
            return Err(RelayError::Funding(format!(
                "faucet holds {} but funding requires {}",
                inner.faucet_balance, amount
            )));
        }

        inner.faucet_balance -= amount;
        inner.state.credit(address, amount);
        debug!("Funded {:#x} with {}", address, amount);

        Ok(address)
    }

    async fn evaluator(&self) -> RelayResult<FieldElement> {
        Ok(self.inner.read().await.evaluator)
    }
}

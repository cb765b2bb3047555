//! Chain state and the execution context contracts run in.

use std::collections::HashMap;

use starknet::core::types::FieldElement;
use tracing::debug;

use crate::blockchain::types::EmittedEvent;
use crate::devnet::accounts::{MulticallAccountState, SignerAccountState};
use crate::devnet::evaluator::EvaluatorState;
use crate::devnet::multisig::MultisigState;
use crate::types::{RelayError, RelayResult};

/// Contract classes the devnet knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    MulticallAccount,
    SignerAccount,
    Multisig,
    Evaluator,
}

impl ContractKind {
    pub fn name(&self) -> &'static str {
        match self {
            ContractKind::MulticallAccount => "multicall_account",
            ContractKind::SignerAccount => "signature_basic",
            ContractKind::Multisig => "multisig",
            ContractKind::Evaluator => "evaluator",
        }
    }

    pub fn is_account(&self) -> bool {
        matches!(self, ContractKind::MulticallAccount | ContractKind::SignerAccount)
    }
}

/// A deployed contract instance and its storage
#[derive(Debug, Clone)]
pub enum DeployedContract {
    MulticallAccount(MulticallAccountState),
    SignerAccount(SignerAccountState),
    Multisig(MultisigState),
    Evaluator(EvaluatorState),
}

impl DeployedContract {
    /// Run the constructor for `kind` at `address`
    pub fn construct(
        kind: ContractKind,
        address: FieldElement,
        constructor_args: &[FieldElement],
    ) -> RelayResult<Self> {
        Ok(match kind {
            ContractKind::MulticallAccount => {
                DeployedContract::MulticallAccount(MulticallAccountState::new(address, constructor_args)?)
            }
            ContractKind::SignerAccount => {
                DeployedContract::SignerAccount(SignerAccountState::new(address, constructor_args)?)
            }
            ContractKind::Multisig => {
                DeployedContract::Multisig(MultisigState::new(address, constructor_args)?)
            }
            ContractKind::Evaluator => DeployedContract::Evaluator(EvaluatorState::new(address)),
        })
    }

    pub fn kind(&self) -> ContractKind {
        match self {
            DeployedContract::MulticallAccount(_) => ContractKind::MulticallAccount,
            DeployedContract::SignerAccount(_) => ContractKind::SignerAccount,
            DeployedContract::Multisig(_) => ContractKind::Multisig,
            DeployedContract::Evaluator(_) => ContractKind::Evaluator,
        }
    }

    /// Account nonce, for account contracts
    pub fn nonce(&self) -> Option<FieldElement> {
        match self {
            DeployedContract::MulticallAccount(account) => Some(account.nonce()),
            DeployedContract::SignerAccount(account) => Some(account.nonce()),
            _ => None,
        }
    }

    fn invoke(&mut self, ctx: &mut ExecutionContext<'_>, call: &CallInfo<'_>) -> RelayResult<Vec<FieldElement>> {
        match self {
            DeployedContract::MulticallAccount(account) => account.invoke(ctx, call),
            DeployedContract::SignerAccount(account) => account.invoke(ctx, call),
            DeployedContract::Multisig(multisig) => multisig.invoke(ctx, call),
            DeployedContract::Evaluator(evaluator) => evaluator.invoke(ctx, call),
        }
    }
}

/// Everything the devnet persists between transactions
#[derive(Debug, Clone, Default)]
pub struct ChainState {
    pub contracts: HashMap<FieldElement, DeployedContract>,
    /// Kind of every deployed address; stays populated while a contract is executing
    pub kinds: HashMap<FieldElement, ContractKind>,
    pub balances: HashMap<FieldElement, u128>,
}

impl ChainState {
    pub fn insert(&mut self, address: FieldElement, contract: DeployedContract) {
        self.kinds.insert(address, contract.kind());
        self.contracts.insert(address, contract);
    }

    pub fn kind_of(&self, address: &FieldElement) -> Option<ContractKind> {
        self.kinds.get(address).copied()
    }

    pub fn balance(&self, address: &FieldElement) -> u128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, address: FieldElement, amount: u128) {
        let balance = self.balances.entry(address).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn debit(&mut self, address: FieldElement, amount: u128) {
        let balance = self.balances.entry(address).or_insert(0);
        *balance = balance.saturating_sub(amount);
    }
}

/// Transaction-level data visible to every frame of an execution
#[derive(Debug, Clone, Default)]
pub struct TxInfo {
    pub account_address: FieldElement,
    pub signature: Vec<FieldElement>,
    pub transaction_hash: FieldElement,
}

/// One frame of a contract call
#[derive(Debug, Clone, Copy)]
pub struct CallInfo<'a> {
    pub caller: FieldElement,
    pub contract_address: FieldElement,
    pub selector: FieldElement,
    pub calldata: &'a [FieldElement],
}

impl CallInfo<'_> {
    pub fn entry_point_not_found(&self) -> RelayError {
        RelayError::EntryPointNotFound {
            contract: self.contract_address,
            selector: self.selector,
        }
    }
}

/// Mutable view of the chain for one transaction (or one read-only call)
pub struct ExecutionContext<'a> {
    state: &'a mut ChainState,
    tx_info: TxInfo,
    call_stack: Vec<FieldElement>,
    events: Vec<EmittedEvent>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(state: &'a mut ChainState, tx_info: TxInfo) -> Self {
        Self {
            state,
            tx_info,
            call_stack: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn tx_info(&self) -> &TxInfo {
        &self.tx_info
    }

    pub fn kind_of(&self, address: &FieldElement) -> Option<ContractKind> {
        self.state.kind_of(address)
    }

    pub fn emit(&mut self, from_address: FieldElement, keys: Vec<FieldElement>, data: Vec<FieldElement>) {
        self.events.push(EmittedEvent { from_address, keys, data });
    }

    /// Invoke `selector` on `to` with `caller` as the calling contract.
    ///
    /// The callee is taken out of storage for the duration of the call, so a
    /// call back into a contract already on the stack is rejected.
    pub fn call_contract(
        &mut self,
        caller: FieldElement,
        to: FieldElement,
        selector: FieldElement,
        calldata: &[FieldElement],
    ) -> RelayResult<Vec<FieldElement>> {
        if self.call_stack.contains(&to) {
            return Err(RelayError::Reentrancy(to));
        }

        let mut contract = self
            .state
            .contracts
            .remove(&to)
            .ok_or(RelayError::ContractNotFound(to))?;

        debug!(
            "call {:#x} -> {:#x} selector={:#x} calldata_len={}",
            caller,
            to,
            selector,
            calldata.len()
        );

        let call = CallInfo {
            caller,
            contract_address: to,
            selector,
            calldata,
        };

        self.call_stack.push(to);
        let result = contract.invoke(self, &call);
        self.call_stack.pop();
        self.state.contracts.insert(to, contract);

        result
    }

    pub fn into_events(self) -> Vec<EmittedEvent> {
        self.events
    }
}

//! Multi-owner relay contract.
//!
//! Owners submit a call, other owners confirm it, and once distinct
//! confirmations reach the threshold any owner can execute it exactly once.
//! Submitting does not count as a confirmation.

use std::collections::HashMap;

use starknet::core::crypto::compute_hash_on_elements;
use starknet::core::types::FieldElement;
use tracing::{debug, info};

use crate::blockchain::types::{selectors, CalldataReader, PendingTransaction, TransactionState};
use crate::devnet::state::{CallInfo, ExecutionContext};
use crate::types::{felt_from_bool, RelayError, RelayResult};

#[derive(Debug, Clone)]
pub struct MultisigState {
    address: FieldElement,
    owners: Vec<FieldElement>,
    threshold: usize,
    transactions: Vec<PendingTransaction>,
    by_id: HashMap<FieldElement, usize>,
}

impl MultisigState {
    /// Constructor calldata: `[owners_len, owners*, threshold]`
    pub fn new(address: FieldElement, constructor_args: &[FieldElement]) -> RelayResult<Self> {
        let mut reader = CalldataReader::new(constructor_args);
        let owners = reader
            .next_array()
            .map_err(|e| RelayError::InvalidConstructor(e.to_string()))?
            .to_vec();
        let threshold = reader
            .next_len()
            .map_err(|e| RelayError::InvalidConstructor(e.to_string()))?;
        reader
            .finish()
            .map_err(|e| RelayError::InvalidConstructor(e.to_string()))?;

        if owners.is_empty() {
            return Err(RelayError::InvalidConstructor("no owners provided".to_string()));
        }
        for (i, owner) in owners.iter().enumerate() {
            if owners[..i].contains(owner) {
                return Err(RelayError::InvalidConstructor(format!("duplicate owner {:#x}", owner)));
            }
        }
        if threshold == 0 || threshold > owners.len() {
            return Err(RelayError::InvalidConstructor(format!(
                "threshold must be between 1 and {}, got {}",
                owners.len(),
                threshold
            )));
        }

        Ok(Self {
            address,
            owners,
            threshold,
            transactions: Vec::new(),
            by_id: HashMap::new(),
        })
    }

    pub fn owners(&self) -> &[FieldElement] {
        &self.owners
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn transaction(&self, tx_id: &FieldElement) -> Option<&PendingTransaction> {
        self.by_id.get(tx_id).map(|i| &self.transactions[*i])
    }

    pub fn invoke(&mut self, ctx: &mut ExecutionContext<'_>, call: &CallInfo<'_>) -> RelayResult<Vec<FieldElement>> {
        let mut reader = CalldataReader::new(call.calldata);

        let result = match call.selector {
            s if s == *selectors::SUBMIT_TX => {
                let to = reader.next()?;
                let selector = reader.next()?;
                let calldata = reader.next_array()?.to_vec();
                reader.finish()?;
                self.submit(ctx, call.caller, to, selector, calldata)?
            }
            s if s == *selectors::CONFIRM_TX => {
                let tx_id = reader.next()?;
                reader.finish()?;
                self.confirm(ctx, call.caller, tx_id)?
            }
            s if s == *selectors::EXECUTE || s == *selectors::EXECUTE_TX => {
                let tx_id = reader.next()?;
                reader.finish()?;
                self.execute(ctx, call.caller, tx_id)?
            }
            s if s == *selectors::GET_CONFIRMATIONS => {
                let tx_id = reader.next()?;
                reader.finish()?;
                let count = self.transaction(&tx_id).map_or(0, |tx| tx.confirmations.len());
                vec![FieldElement::from(count as u64)]
            }
            s if s == *selectors::GET_OWNER_CONFIRMED => {
                let tx_id = reader.next()?;
                let owner = reader.next()?;
                reader.finish()?;
                let confirmed = self.transaction(&tx_id).map_or(false, |tx| tx.has_confirmed(&owner));
                vec![felt_from_bool(confirmed)]
            }
            s if s == *selectors::GET_NUM_OWNERS => vec![FieldElement::from(self.owners.len() as u64)],
            s if s == *selectors::GET_OWNERS => {
                let mut out = vec![FieldElement::from(self.owners.len() as u64)];
                out.extend_from_slice(&self.owners);
                out
            }
            s if s == *selectors::GET_THRESHOLD => vec![FieldElement::from(self.threshold as u64)],
            s if s == *selectors::GET_TRANSACTION => {
                let tx_id = reader.next()?;
                reader.finish()?;
                self.transaction(&tx_id)
                    .map(PendingTransaction::to_calldata)
                    .ok_or(RelayError::TransactionNotFound(tx_id))?
            }
            s if s == *selectors::GET_TRANSACTIONS_LEN => {
                vec![FieldElement::from(self.transactions.len() as u64)]
            }
            _ => return Err(call.entry_point_not_found()),
        };

        Ok(result)
    }

    fn require_owner(&self, caller: FieldElement) -> RelayResult<()> {
        if self.owners.contains(&caller) {
            Ok(())
        } else {
            Err(RelayError::NotOwner(caller))
        }
    }

    fn pending_mut(&mut self, tx_id: FieldElement) -> RelayResult<&mut PendingTransaction> {
        let index = *self.by_id.get(&tx_id).ok_or(RelayError::TransactionNotFound(tx_id))?;
        Ok(&mut self.transactions[index])
    }

    fn submit(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        owner: FieldElement,
        to: FieldElement,
        selector: FieldElement,
        calldata: Vec<FieldElement>,
    ) -> RelayResult<Vec<FieldElement>> {
        self.require_owner(owner)?;

        let index = self.transactions.len() as u64;
        let tx_id = compute_hash_on_elements(&[
            self.address,
            to,
            selector,
            compute_hash_on_elements(&calldata),
            FieldElement::from(index),
        ]);

        self.by_id.insert(tx_id, self.transactions.len());
        self.transactions.push(PendingTransaction {
            tx_id,
            index,
            to,
            selector,
            calldata,
            confirmations: Vec::new(),
            state: TransactionState::Submitted,
        });

        info!("Multisig {:#x}: owner {:#x} submitted tx {:#x}", self.address, owner, tx_id);
        ctx.emit(
            self.address,
            vec![*selectors::EVENT_TRANSACTION_SUBMITTED],
            vec![owner, tx_id, FieldElement::from(index)],
        );

        Ok(vec![tx_id])
    }

    fn confirm(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        owner: FieldElement,
        tx_id: FieldElement,
    ) -> RelayResult<Vec<FieldElement>> {
        self.require_owner(owner)?;
        let threshold = self.threshold;
        let address = self.address;
        let tx = self.pending_mut(tx_id)?;

        if tx.state == TransactionState::Executed {
            return Err(RelayError::AlreadyExecuted(tx_id));
        }
        if tx.has_confirmed(&owner) {
            return Err(RelayError::AlreadyConfirmed { owner, tx_id });
        }

        tx.confirmations.push(owner);
        tx.state = if tx.confirmations.len() >= threshold {
            TransactionState::Confirmed
        } else {
            TransactionState::PartiallyConfirmed
        };
        let count = tx.confirmations.len();

        debug!("Multisig {:#x}: tx {:#x} has {}/{} confirmations", address, tx_id, count, threshold);
        ctx.emit(
            address,
            vec![*selectors::EVENT_TRANSACTION_CONFIRMED],
            vec![owner, tx_id, FieldElement::from(count as u64)],
        );

        Ok(vec![FieldElement::from(count as u64)])
    }

    fn execute(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        owner: FieldElement,
        tx_id: FieldElement,
    ) -> RelayResult<Vec<FieldElement>> {
        self.require_owner(owner)?;
        let threshold = self.threshold;
        let address = self.address;
        let tx = self.pending_mut(tx_id)?;

        match tx.state {
            TransactionState::Executed => return Err(RelayError::AlreadyExecuted(tx_id)),
            TransactionState::Confirmed => {}
            _ => {
                return Err(RelayError::QuorumNotMet {
                    confirmations: tx.confirmations.len(),
                    threshold,
                })
            }
        }

        let (to, selector, calldata) = (tx.to, tx.selector, tx.calldata.clone());
        let retdata = ctx.call_contract(address, to, selector, &calldata)?;
        self.pending_mut(tx_id)?.state = TransactionState::Executed;

        info!("Multisig {:#x}: owner {:#x} executed tx {:#x}", address, owner, tx_id);
        ctx.emit(address, vec![*selectors::EVENT_TRANSACTION_EXECUTED], vec![owner, tx_id]);

        Ok(retdata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::state::{ChainState, TxInfo};

    fn felt(value: u64) -> FieldElement {
        FieldElement::from(value)
    }

    fn multisig() -> MultisigState {
        MultisigState::new(felt(0x100), &[felt(3), felt(1), felt(2), felt(3), felt(2)]).unwrap()
    }

    fn run(
        multisig: &mut MultisigState,
        caller: u64,
        selector: FieldElement,
        calldata: &[FieldElement],
    ) -> RelayResult<Vec<FieldElement>> {
        let mut state = ChainState::default();
        let mut ctx = ExecutionContext::new(&mut state, TxInfo::default());
        let call = CallInfo {
            caller: felt(caller),
            contract_address: felt(0x100),
            selector,
            calldata,
        };
        multisig.invoke(&mut ctx, &call)
    }

    fn submit(multisig: &mut MultisigState) -> FieldElement {
        // nothing is deployed at 0x999
        run(multisig, 1, *selectors::SUBMIT_TX, &[felt(0x999), felt(0x42), felt(0)]).unwrap()[0]
    }

    #[test]
    fn test_constructor_validation() {
        let no_owners = MultisigState::new(felt(1), &[felt(0), felt(1)]);
        assert!(matches!(no_owners, Err(RelayError::InvalidConstructor(_))));

        let duplicate = MultisigState::new(felt(1), &[felt(2), felt(5), felt(5), felt(1)]);
        assert!(matches!(duplicate, Err(RelayError::InvalidConstructor(_))));

        let threshold_too_high = MultisigState::new(felt(1), &[felt(1), felt(5), felt(2)]);
        assert!(matches!(threshold_too_high, Err(RelayError::InvalidConstructor(_))));

        let ok = multisig();
        assert_eq!(ok.owners(), &[felt(1), felt(2), felt(3)]);
        assert_eq!(ok.threshold(), 2);
    }

    #[test]
    fn test_submit_requires_owner() {
        let mut ms = multisig();
        let err = run(&mut ms, 9, *selectors::SUBMIT_TX, &[felt(1), felt(2), felt(0)]).unwrap_err();
        assert_eq!(err, RelayError::NotOwner(felt(9)));
    }

    #[test]
    fn test_state_progression() {
        let mut ms = multisig();
        let tx_id = submit(&mut ms);
        assert_eq!(ms.transaction(&tx_id).unwrap().state, TransactionState::Submitted);

        run(&mut ms, 2, *selectors::CONFIRM_TX, &[tx_id]).unwrap();
        assert_eq!(ms.transaction(&tx_id).unwrap().state, TransactionState::PartiallyConfirmed);

        run(&mut ms, 3, *selectors::CONFIRM_TX, &[tx_id]).unwrap();
        assert_eq!(ms.transaction(&tx_id).unwrap().state, TransactionState::Confirmed);
    }

    #[test]
    fn test_duplicate_confirmation_is_not_counted() {
        let mut ms = multisig();
        let tx_id = submit(&mut ms);

        run(&mut ms, 2, *selectors::CONFIRM_TX, &[tx_id]).unwrap();
        let err = run(&mut ms, 2, *selectors::CONFIRM_TX, &[tx_id]).unwrap_err();

        assert_eq!(err, RelayError::AlreadyConfirmed { owner: felt(2), tx_id });
        assert_eq!(ms.transaction(&tx_id).unwrap().confirmations.len(), 1);
    }

    #[test]
    fn test_execute_before_quorum_fails() {
        let mut ms = multisig();
        let tx_id = submit(&mut ms);
        run(&mut ms, 2, *selectors::CONFIRM_TX, &[tx_id]).unwrap();

        let err = run(&mut ms, 1, *selectors::EXECUTE, &[tx_id]).unwrap_err();
        assert_eq!(err, RelayError::QuorumNotMet { confirmations: 1, threshold: 2 });
    }

    #[test]
    fn test_failed_relay_leaves_transaction_confirmed() {
        let mut ms = multisig();
        let tx_id = submit(&mut ms);
        run(&mut ms, 2, *selectors::CONFIRM_TX, &[tx_id]).unwrap();
        run(&mut ms, 3, *selectors::CONFIRM_TX, &[tx_id]).unwrap();

        let err = run(&mut ms, 1, *selectors::EXECUTE, &[tx_id]).unwrap_err();
        assert_eq!(err, RelayError::ContractNotFound(felt(0x999)));
        assert_eq!(ms.transaction(&tx_id).unwrap().state, TransactionState::Confirmed);
    }

    #[test]
    fn test_unknown_transaction() {
        let mut ms = multisig();
        let err = run(&mut ms, 2, *selectors::CONFIRM_TX, &[felt(77)]).unwrap_err();
        assert_eq!(err, RelayError::TransactionNotFound(felt(77)));
    }

    #[test]
    fn test_views() {
        let mut ms = multisig();
        let tx_id = submit(&mut ms);
        run(&mut ms, 3, *selectors::CONFIRM_TX, &[tx_id]).unwrap();

        assert_eq!(run(&mut ms, 0, *selectors::GET_CONFIRMATIONS, &[tx_id]).unwrap(), vec![felt(1)]);
        assert_eq!(
            run(&mut ms, 0, *selectors::GET_OWNER_CONFIRMED, &[tx_id, felt(3)]).unwrap(),
            vec![FieldElement::ONE]
        );
        assert_eq!(
            run(&mut ms, 0, *selectors::GET_OWNER_CONFIRMED, &[tx_id, felt(2)]).unwrap(),
            vec![FieldElement::ZERO]
        );
        assert_eq!(run(&mut ms, 0, *selectors::GET_NUM_OWNERS, &[]).unwrap(), vec![felt(3)]);
        assert_eq!(
            run(&mut ms, 0, *selectors::GET_OWNERS, &[]).unwrap(),
            vec![felt(3), felt(1), felt(2), felt(3)]
        );
        assert_eq!(run(&mut ms, 0, *selectors::GET_TRANSACTIONS_LEN, &[]).unwrap(), vec![felt(1)]);

        let tx = run(&mut ms, 0, *selectors::GET_TRANSACTION, &[tx_id]).unwrap();
        assert_eq!(tx[2], TransactionState::PartiallyConfirmed.to_field_element());
    }

    #[test]
    fn test_identical_submissions_get_distinct_ids() {
        let mut ms = multisig();
        assert_ne!(submit(&mut ms), submit(&mut ms));
    }
}

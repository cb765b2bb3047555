//! # Blockchain Contract Types
//!
//! This module defines Rust types that correspond to the account, multisig and
//! evaluator contract interfaces, and the envelope layouts they consume.

use serde::{Deserialize, Serialize};
use starknet::accounts::Call;
use starknet::core::types::FieldElement;

use crate::types::{felt_to_usize, RelayError, RelayResult};

/// Number of felts per serialized call array entry
pub const CALL_ARRAY_ENTRY_SIZE: usize = 4;

/// One entry of an account call array: a target, an entry point and the
/// slice of the shared calldata buffer it receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallArrayEntry {
    pub to: FieldElement,
    pub selector: FieldElement,
    pub data_offset: usize,
    pub data_len: usize,
}

impl CallArrayEntry {
    /// Convert to calldata for Cairo contract calls
    pub fn to_calldata(&self) -> [FieldElement; CALL_ARRAY_ENTRY_SIZE] {
        [
            self.to,
            self.selector,
            FieldElement::from(self.data_offset as u64),
            FieldElement::from(self.data_len as u64),
        ]
    }

    /// Parse from a 4-felt chunk of calldata
    pub fn from_calldata(data: &[FieldElement]) -> RelayResult<Self> {
        if data.len() != CALL_ARRAY_ENTRY_SIZE {
            return Err(RelayError::MalformedCalldata(format!(
                "call array entry needs {} felts, got {}",
                CALL_ARRAY_ENTRY_SIZE,
                data.len()
            )));
        }

        Ok(Self {
            to: data[0],
            selector: data[1],
            data_offset: felt_to_usize(data[2])?,
            data_len: felt_to_usize(data[3])?,
        })
    }
}

/// An ordered call array plus the flat calldata buffer its entries slice into
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallBatch {
    pub call_array: Vec<CallArrayEntry>,
    pub calldata: Vec<FieldElement>,
}

impl CallBatch {
    /// Create a batch from an explicit call array and shared buffer
    pub fn new(call_array: Vec<CallArrayEntry>, calldata: Vec<FieldElement>) -> Self {
        Self { call_array, calldata }
    }

    /// Pack independent calls into one call array, assigning offsets in order
    pub fn from_calls(calls: Vec<Call>) -> Self {
        let mut call_array = Vec::with_capacity(calls.len());
        let mut calldata = Vec::new();

        for call in calls {
            call_array.push(CallArrayEntry {
                to: call.to,
                selector: call.selector,
                data_offset: calldata.len(),
                data_len: call.calldata.len(),
            });
            calldata.extend(call.calldata);
        }

        Self { call_array, calldata }
    }

    /// Number of calls in the batch
    pub fn len(&self) -> usize {
        self.call_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.call_array.is_empty()
    }

    /// Resolve every entry against the shared buffer, in submitted order
    pub fn split(&self) -> RelayResult<Vec<(FieldElement, FieldElement, &[FieldElement])>> {
        let mut calls = Vec::with_capacity(self.call_array.len());
        for (index, entry) in self.call_array.iter().enumerate() {
            let end = entry
                .data_offset
                .checked_add(entry.data_len)
                .filter(|end| *end <= self.calldata.len())
                .ok_or(RelayError::CallOutOfBounds {
                    index,
                    offset: entry.data_offset,
                    end: entry.data_offset.saturating_add(entry.data_len),
                    len: self.calldata.len(),
                })?;
            calls.push((entry.to, entry.selector, &self.calldata[entry.data_offset..end]));
        }
        Ok(calls)
    }

    /// Serialize into the `__execute__` envelope:
    /// `[nonce, call_array_len, entries*, calldata_len, calldata*]`
    pub fn to_execute_calldata(&self, nonce: FieldElement) -> Vec<FieldElement> {
        let mut out = Vec::with_capacity(
            3 + self.call_array.len() * CALL_ARRAY_ENTRY_SIZE + self.calldata.len(),
        );
        out.push(nonce);
        out.push(FieldElement::from(self.call_array.len() as u64));
        for entry in &self.call_array {
            out.extend_from_slice(&entry.to_calldata());
        }
        out.push(FieldElement::from(self.calldata.len() as u64));
        out.extend_from_slice(&self.calldata);
        out
    }

    /// Parse an `__execute__` envelope back into its nonce and batch
    pub fn from_execute_calldata(data: &[FieldElement]) -> RelayResult<(FieldElement, Self)> {
        let mut reader = CalldataReader::new(data);
        let nonce = reader.next()?;
        let call_array_len = reader.next_len()?;

        let mut call_array = Vec::with_capacity(call_array_len.min(data.len()));
        for _ in 0..call_array_len {
            call_array.push(CallArrayEntry::from_calldata(reader.take(CALL_ARRAY_ENTRY_SIZE)?)?);
        }

        let calldata = reader.next_array()?.to_vec();
        reader.finish()?;

        Ok((nonce, Self { call_array, calldata }))
    }
}

/// Build the single-call envelope consumed by a signer account:
/// `[to, selector, nonce, calldata_len, calldata*]`
pub fn single_call_calldata(call: &Call, nonce: FieldElement) -> Vec<FieldElement> {
    let mut out = Vec::with_capacity(4 + call.calldata.len());
    out.push(call.to);
    out.push(call.selector);
    out.push(nonce);
    out.push(FieldElement::from(call.calldata.len() as u64));
    out.extend_from_slice(&call.calldata);
    out
}

/// Parse a single-call envelope back into the call and its nonce
pub fn parse_single_call_calldata(data: &[FieldElement]) -> RelayResult<(Call, FieldElement)> {
    let mut reader = CalldataReader::new(data);
    let to = reader.next()?;
    let selector = reader.next()?;
    let nonce = reader.next()?;
    let calldata = reader.next_array()?.to_vec();
    reader.finish()?;

    Ok((Call { to, selector, calldata }, nonce))
}

/// Sequential reader over a calldata slice
#[derive(Debug)]
pub struct CalldataReader<'a> {
    data: &'a [FieldElement],
    position: usize,
}

impl<'a> CalldataReader<'a> {
    pub fn new(data: &'a [FieldElement]) -> Self {
        Self { data, position: 0 }
    }

    pub fn next(&mut self) -> RelayResult<FieldElement> {
        let value = self.data.get(self.position).copied().ok_or_else(|| {
            RelayError::MalformedCalldata(format!("expected a value at position {}", self.position))
        })?;
        self.position += 1;
        Ok(value)
    }

    pub fn next_len(&mut self) -> RelayResult<usize> {
        felt_to_usize(self.next()?)
    }

    pub fn take(&mut self, count: usize) -> RelayResult<&'a [FieldElement]> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                RelayError::MalformedCalldata(format!(
                    "expected {} values at position {}, only {} remain",
                    count,
                    self.position,
                    self.data.len() - self.position
                ))
            })?;
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Read a length-prefixed array
    pub fn next_array(&mut self) -> RelayResult<&'a [FieldElement]> {
        let len = self.next_len()?;
        self.take(len)
    }

    /// Fail if trailing values are left unread
    pub fn finish(self) -> RelayResult<()> {
        if self.position != self.data.len() {
            return Err(RelayError::MalformedCalldata(format!(
                "{} trailing values after position {}",
                self.data.len() - self.position,
                self.position
            )));
        }
        Ok(())
    }
}

/// Invoke transaction sent to an account's `__execute__` entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeTransaction {
    pub sender_address: FieldElement,
    pub calldata: Vec<FieldElement>,
    pub signature: Vec<FieldElement>,
    pub max_fee: FieldElement,
}

/// Receipt handed back when a transaction is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: FieldElement,
}

/// Event emitted by a contract during execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    pub from_address: FieldElement,
    pub keys: Vec<FieldElement>,
    pub data: Vec<FieldElement>,
}

/// Outcome of a transaction once it is included in a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionResult {
    pub transaction_hash: FieldElement,
    pub block_number: u64,
    pub events: Vec<EmittedEvent>,
    pub actual_fee: u128,
    pub retdata: Vec<FieldElement>,
}

impl InclusionResult {
    /// First event carrying the given key
    pub fn event(&self, key: FieldElement) -> Option<&EmittedEvent> {
        self.events.iter().find(|event| event.keys.first() == Some(&key))
    }
}

/// Result of deploying a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub address: FieldElement,
    pub class_hash: FieldElement,
    pub transaction_hash: FieldElement,
}

/// Relayed transaction lifecycle matching the multisig contract
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionState {
    Unsubmitted,
    Submitted,
    PartiallyConfirmed,
    Confirmed,
    Executed,
}

impl TransactionState {
    /// Convert to FieldElement for Cairo contract views
    pub fn to_field_element(self) -> FieldElement {
        match self {
            TransactionState::Unsubmitted => FieldElement::from(0u8),
            TransactionState::Submitted => FieldElement::from(1u8),
            TransactionState::PartiallyConfirmed => FieldElement::from(2u8),
            TransactionState::Confirmed => FieldElement::from(3u8),
            TransactionState::Executed => FieldElement::from(4u8),
        }
    }

    /// Convert from FieldElement received from a contract view
    pub fn from_field_element(field: FieldElement) -> Option<Self> {
        match field {
            f if f == FieldElement::from(0u8) => Some(TransactionState::Unsubmitted),
            f if f == FieldElement::from(1u8) => Some(TransactionState::Submitted),
            f if f == FieldElement::from(2u8) => Some(TransactionState::PartiallyConfirmed),
            f if f == FieldElement::from(3u8) => Some(TransactionState::Confirmed),
            f if f == FieldElement::from(4u8) => Some(TransactionState::Executed),
            _ => None,
        }
    }
}

/// A transaction waiting in the multisig for owner confirmations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub tx_id: FieldElement,
    pub index: u64,
    pub to: FieldElement,
    pub selector: FieldElement,
    pub calldata: Vec<FieldElement>,
    /// Distinct confirming owners, in confirmation order
    pub confirmations: Vec<FieldElement>,
    pub state: TransactionState,
}

impl PendingTransaction {
    pub fn has_confirmed(&self, owner: &FieldElement) -> bool {
        self.confirmations.contains(owner)
    }

    /// Serialize for the `get_transaction` view:
    /// `[to, selector, state, confirmations, calldata_len, calldata*]`
    pub fn to_calldata(&self) -> Vec<FieldElement> {
        let mut out = vec![
            self.to,
            self.selector,
            self.state.to_field_element(),
            FieldElement::from(self.confirmations.len() as u64),
            FieldElement::from(self.calldata.len() as u64),
        ];
        out.extend_from_slice(&self.calldata);
        out
    }
}

/// Contract function selectors (computed from function names)
/// `get_selector_from_name` only fails for non-ASCII names, none of which appear here
pub mod selectors {
    use starknet::core::types::FieldElement;
    use starknet::core::utils::get_selector_from_name;

    lazy_static::lazy_static! {
        // Account entry points
        pub static ref EXECUTE: FieldElement = get_selector_from_name("__execute__")
            .expect("Invalid selector name: __execute__");
        pub static ref GET_NONCE: FieldElement = get_selector_from_name("get_nonce")
            .expect("Invalid selector name: get_nonce");
        pub static ref GET_PUBLIC_KEY: FieldElement = get_selector_from_name("get_public_key")
            .expect("Invalid selector name: get_public_key");

        // Multisig entry points
        pub static ref SUBMIT_TX: FieldElement = get_selector_from_name("submit_tx")
            .expect("Invalid selector name: submit_tx");
        pub static ref CONFIRM_TX: FieldElement = get_selector_from_name("confirm_tx")
            .expect("Invalid selector name: confirm_tx");
        pub static ref EXECUTE_TX: FieldElement = get_selector_from_name("execute_tx")
            .expect("Invalid selector name: execute_tx");
        pub static ref GET_CONFIRMATIONS: FieldElement = get_selector_from_name("get_confirmations")
            .expect("Invalid selector name: get_confirmations");
        pub static ref GET_OWNER_CONFIRMED: FieldElement = get_selector_from_name("get_owner_confirmed")
            .expect("Invalid selector name: get_owner_confirmed");
        pub static ref GET_NUM_OWNERS: FieldElement = get_selector_from_name("get_num_owners")
            .expect("Invalid selector name: get_num_owners");
        pub static ref GET_OWNERS: FieldElement = get_selector_from_name("get_owners")
            .expect("Invalid selector name: get_owners");
        pub static ref GET_THRESHOLD: FieldElement = get_selector_from_name("get_threshold")
            .expect("Invalid selector name: get_threshold");
        pub static ref GET_TRANSACTION: FieldElement = get_selector_from_name("get_transaction")
            .expect("Invalid selector name: get_transaction");
        pub static ref GET_TRANSACTIONS_LEN: FieldElement = get_selector_from_name("get_transactions_len")
            .expect("Invalid selector name: get_transactions_len");

        // Evaluator entry points
        pub static ref VALIDATE_MULTICALL: FieldElement = get_selector_from_name("validate_multicall")
            .expect("Invalid selector name: validate_multicall");
        pub static ref VALIDATE_MULTISIG: FieldElement = get_selector_from_name("validate_multisig")
            .expect("Invalid selector name: validate_multisig");
        pub static ref GET_INVOCATION_COUNT: FieldElement = get_selector_from_name("get_invocation_count")
            .expect("Invalid selector name: get_invocation_count");
        pub static ref GET_INVOCATION: FieldElement = get_selector_from_name("get_invocation")
            .expect("Invalid selector name: get_invocation");

        // Event selectors
        pub static ref EVENT_TRANSACTION_SUBMITTED: FieldElement = get_selector_from_name("TransactionSubmitted")
            .expect("Invalid selector name: TransactionSubmitted");
        pub static ref EVENT_TRANSACTION_CONFIRMED: FieldElement = get_selector_from_name("TransactionConfirmed")
            .expect("Invalid selector name: TransactionConfirmed");
        pub static ref EVENT_TRANSACTION_EXECUTED: FieldElement = get_selector_from_name("TransactionExecuted")
            .expect("Invalid selector name: TransactionExecuted");
        pub static ref EVENT_INVOCATION_RECORDED: FieldElement = get_selector_from_name("InvocationRecorded")
            .expect("Invalid selector name: InvocationRecorded");
    }
}

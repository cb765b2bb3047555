//! Account contracts: the multicall (call array) account and the basic
//! single-call signer account used by multisig owners.
//!
//! Both authorize `__execute__` the same way: the nonce carried in the payload
//! must equal the stored nonce, and the transaction signature must verify
//! against the stored public key over `invoke_tx_hash(self, payload)`.

use starknet::core::types::FieldElement;
use tracing::debug;

use crate::blockchain::signing::{invoke_tx_hash, verify_signature};
use crate::blockchain::types::{parse_single_call_calldata, selectors, CallBatch};
use crate::devnet::state::{CallInfo, ExecutionContext};
use crate::types::{RelayError, RelayResult};

/// Storage shared by both account flavours
#[derive(Debug, Clone)]
struct AccountCore {
    address: FieldElement,
    public_key: FieldElement,
    nonce: FieldElement,
}

impl AccountCore {
    fn new(address: FieldElement, constructor_args: &[FieldElement]) -> RelayResult<Self> {
        match constructor_args {
            [public_key] if *public_key != FieldElement::ZERO => Ok(Self {
                address,
                public_key: *public_key,
                nonce: FieldElement::ZERO,
            }),
            _ => Err(RelayError::InvalidConstructor(
                "account constructor takes a single non-zero public key".to_string(),
            )),
        }
    }

    /// Check nonce and signature, then consume the nonce
    fn authorize(&mut self, ctx: &ExecutionContext<'_>, payload: &[FieldElement], nonce: FieldElement) -> RelayResult<()> {
        if nonce != self.nonce {
            return Err(RelayError::NonceMismatch {
                expected: self.nonce,
                actual: nonce,
            });
        }

        let digest = invoke_tx_hash(self.address, payload);
        if !verify_signature(self.public_key, digest, &ctx.tx_info().signature) {
            return Err(RelayError::InvalidSignature(self.address));
        }

        self.nonce = self.nonce + FieldElement::ONE;
        debug!("Account {:#x} nonce advanced to {:#x}", self.address, self.nonce);
        Ok(())
    }

    fn view(&self, call: &CallInfo<'_>) -> RelayResult<Vec<FieldElement>> {
        match call.selector {
            s if s == *selectors::GET_NONCE => Ok(vec![self.nonce]),
            s if s == *selectors::GET_PUBLIC_KEY => Ok(vec![self.public_key]),
            _ => Err(call.entry_point_not_found()),
        }
    }
}

/// Account whose `__execute__` fans out to a call array over a shared buffer
#[derive(Debug, Clone)]
pub struct MulticallAccountState {
    core: AccountCore,
}

impl MulticallAccountState {
    pub fn new(address: FieldElement, constructor_args: &[FieldElement]) -> RelayResult<Self> {
        Ok(Self {
            core: AccountCore::new(address, constructor_args)?,
        })
    }

    pub fn nonce(&self) -> FieldElement {
        self.core.nonce
    }

    pub fn public_key(&self) -> FieldElement {
        self.core.public_key
    }

    pub fn invoke(&mut self, ctx: &mut ExecutionContext<'_>, call: &CallInfo<'_>) -> RelayResult<Vec<FieldElement>> {
        if call.selector != *selectors::EXECUTE {
            return self.core.view(call);
        }

        let (nonce, batch) = CallBatch::from_execute_calldata(call.calldata)?;
        let calls = batch.split()?;
        self.core.authorize(ctx, call.calldata, nonce)?;

        debug!("Multicall account {:#x} dispatching {} calls", self.core.address, calls.len());

        let mut responses = Vec::new();
        for (to, selector, calldata) in calls {
            let retdata = ctx.call_contract(self.core.address, to, selector, calldata)?;
            responses.extend(retdata);
        }

        let mut out = Vec::with_capacity(responses.len() + 1);
        out.push(FieldElement::from(responses.len() as u64));
        out.extend(responses);
        Ok(out)
    }
}

/// Account whose `__execute__` forwards exactly one call
#[derive(Debug, Clone)]
pub struct SignerAccountState {
    core: AccountCore,
}

impl SignerAccountState {
    pub fn new(address: FieldElement, constructor_args: &[FieldElement]) -> RelayResult<Self> {
        Ok(Self {
            core: AccountCore::new(address, constructor_args)?,
        })
    }

    pub fn nonce(&self) -> FieldElement {
        self.core.nonce
    }

    pub fn public_key(&self) -> FieldElement {
        self.core.public_key
    }

    pub fn invoke(&mut self, ctx: &mut ExecutionContext<'_>, call: &CallInfo<'_>) -> RelayResult<Vec<FieldElement>> {
        if call.selector != *selectors::EXECUTE {
            return self.core.view(call);
        }

        let (inner, nonce) = parse_single_call_calldata(call.calldata)?;
        self.core.authorize(ctx, call.calldata, nonce)?;

        ctx.call_contract(self.core.address, inner.to, inner.selector, &inner.calldata)
    }
}

//! # Contract Handles
//!
//! Typed wrappers around a [`ChainClient`] for the relay contracts. Account
//! handles own a [`StarkSigner`] and take care of the nonce → hash → sign →
//! submit → await sequence for every invoke.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use starknet::accounts::Call;
use starknet::core::types::FieldElement;
use tracing::{debug, info};

use crate::blockchain::client::{wait_for_transaction, ChainClient};
use crate::blockchain::signing::StarkSigner;
use crate::blockchain::types::*;
use crate::types::{felt_to_usize, RelayError, RelayResult};

/// How long an account waits for its transaction to be included
pub const INCLUSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between inclusion polls
pub const INCLUSION_POLL_INTERVAL: Duration = Duration::from_millis(500);

async fn send_signed(
    client: &dyn ChainClient,
    signer: &StarkSigner,
    account: FieldElement,
    calldata: Vec<FieldElement>,
    max_fee: FieldElement,
) -> RelayResult<InclusionResult> {
    let (_, signature) = signer.sign_invoke(account, &calldata)?;

    let receipt = client
        .execute(InvokeTransaction {
            sender_address: account,
            calldata,
            signature,
            max_fee,
        })
        .await?;
    debug!("Submitted transaction {:#x} from {:#x}", receipt.transaction_hash, account);

    wait_for_transaction(client, &receipt, INCLUSION_TIMEOUT, INCLUSION_POLL_INTERVAL).await
}

/// Account that batches several calls into one signed `__execute__`
pub struct MulticallAccount {
    client: Arc<dyn ChainClient>,
    address: FieldElement,
    signer: StarkSigner,
    max_fee: FieldElement,
}

impl MulticallAccount {
    pub fn new(client: Arc<dyn ChainClient>, address: FieldElement, signer: StarkSigner, max_fee: FieldElement) -> Self {
        Self {
            client,
            address,
            signer,
            max_fee,
        }
    }

    /// Deploy a new account owned by `signer`
    pub async fn deploy(
        client: Arc<dyn ChainClient>,
        contract_path: &Path,
        signer: StarkSigner,
        max_fee: FieldElement,
    ) -> RelayResult<Self> {
        let deployment = client.deploy(contract_path, vec![signer.stark_key()]).await?;
        info!("Multicall account deployed at {:#x}", deployment.address);
        Ok(Self::new(client, deployment.address, signer, max_fee))
    }

    pub fn address(&self) -> FieldElement {
        self.address
    }

    pub async fn nonce(&self) -> RelayResult<FieldElement> {
        self.client.get_nonce(self.address).await
    }

    /// Execute a batch at the account's current nonce
    pub async fn execute(&self, batch: &CallBatch) -> RelayResult<InclusionResult> {
        let nonce = self.nonce().await?;
        self.execute_with_nonce(batch, nonce).await
    }

    pub async fn execute_calls(&self, calls: Vec<Call>) -> RelayResult<InclusionResult> {
        self.execute(&CallBatch::from_calls(calls)).await
    }

    /// Execute a batch with an explicit nonce
    pub async fn execute_with_nonce(&self, batch: &CallBatch, nonce: FieldElement) -> RelayResult<InclusionResult> {
        info!(
            "Executing {} calls from {:#x} with nonce {:#x}",
            batch.len(),
            self.address,
            nonce
        );
        let calldata = batch.to_execute_calldata(nonce);
        send_signed(self.client.as_ref(), &self.signer, self.address, calldata, self.max_fee).await
    }
}

/// Basic account forwarding one call per signed `__execute__`
pub struct SignerAccount {
    client: Arc<dyn ChainClient>,
    address: FieldElement,
    signer: StarkSigner,
    max_fee: FieldElement,
}

impl SignerAccount {
    pub fn new(client: Arc<dyn ChainClient>, address: FieldElement, signer: StarkSigner, max_fee: FieldElement) -> Self {
        Self {
            client,
            address,
            signer,
            max_fee,
        }
    }

    pub async fn deploy(
        client: Arc<dyn ChainClient>,
        contract_path: &Path,
        signer: StarkSigner,
        max_fee: FieldElement,
    ) -> RelayResult<Self> {
        let deployment = client.deploy(contract_path, vec![signer.stark_key()]).await?;
        info!("Signer account deployed at {:#x}", deployment.address);
        Ok(Self::new(client, deployment.address, signer, max_fee))
    }

    pub fn address(&self) -> FieldElement {
        self.address
    }

    pub async fn nonce(&self) -> RelayResult<FieldElement> {
        self.client.get_nonce(self.address).await
    }

    pub async fn invoke(&self, call: &Call) -> RelayResult<InclusionResult> {
        let nonce = self.nonce().await?;
        self.invoke_with_nonce(call, nonce).await
    }

    pub async fn invoke_with_nonce(&self, call: &Call, nonce: FieldElement) -> RelayResult<InclusionResult> {
        debug!(
            "Invoking {:#x} on {:#x} from {:#x} with nonce {:#x}",
            call.selector, call.to, self.address, nonce
        );
        let calldata = single_call_calldata(call, nonce);
        send_signed(self.client.as_ref(), &self.signer, self.address, calldata, self.max_fee).await
    }
}

/// Decoded `get_transaction` view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionView {
    pub to: FieldElement,
    pub selector: FieldElement,
    pub state: TransactionState,
    pub confirmations: usize,
    pub calldata: Vec<FieldElement>,
}

/// Multi-owner relay contract; every state change goes through an owner's account
pub struct MultisigContract {
    client: Arc<dyn ChainClient>,
    address: FieldElement,
}

impl MultisigContract {
    pub fn new(client: Arc<dyn ChainClient>, address: FieldElement) -> Self {
        Self { client, address }
    }

    pub async fn deploy(
        client: Arc<dyn ChainClient>,
        contract_path: &Path,
        owners: &[FieldElement],
        threshold: usize,
    ) -> RelayResult<Self> {
        let mut constructor_args = vec![FieldElement::from(owners.len() as u64)];
        constructor_args.extend_from_slice(owners);
        constructor_args.push(FieldElement::from(threshold as u64));

        let deployment = client.deploy(contract_path, constructor_args).await?;
        info!(
            "Multisig deployed at {:#x} ({} of {} owners)",
            deployment.address,
            threshold,
            owners.len()
        );
        Ok(Self::new(client, deployment.address))
    }

    pub fn address(&self) -> FieldElement {
        self.address
    }

    /// Submit `call` for confirmation, returning its transaction id
    pub async fn submit(&self, owner: &SignerAccount, call: &Call) -> RelayResult<(FieldElement, InclusionResult)> {
        let mut calldata = vec![call.to, call.selector, FieldElement::from(call.calldata.len() as u64)];
        calldata.extend_from_slice(&call.calldata);

        let inclusion = owner.invoke(&self.entry_point(*selectors::SUBMIT_TX, calldata)).await?;

        let event = inclusion
            .event(*selectors::EVENT_TRANSACTION_SUBMITTED)
            .ok_or_else(|| RelayError::MalformedCalldata("no TransactionSubmitted event emitted".to_string()))?;
        let tx_id = *event
            .data
            .get(1)
            .ok_or_else(|| RelayError::MalformedCalldata("TransactionSubmitted event has no tx id".to_string()))?;

        info!("Owner {:#x} submitted multisig tx {:#x}", owner.address(), tx_id);
        Ok((tx_id, inclusion))
    }

    pub async fn confirm(&self, owner: &SignerAccount, tx_id: FieldElement) -> RelayResult<InclusionResult> {
        let inclusion = owner.invoke(&self.entry_point(*selectors::CONFIRM_TX, vec![tx_id])).await?;
        info!("Owner {:#x} confirmed multisig tx {:#x}", owner.address(), tx_id);
        Ok(inclusion)
    }

    pub async fn execute(&self, owner: &SignerAccount, tx_id: FieldElement) -> RelayResult<InclusionResult> {
        let inclusion = owner.invoke(&self.entry_point(*selectors::EXECUTE, vec![tx_id])).await?;
        info!("Owner {:#x} executed multisig tx {:#x}", owner.address(), tx_id);
        Ok(inclusion)
    }

    pub async fn confirmations(&self, tx_id: FieldElement) -> RelayResult<usize> {
        let result = self.view(*selectors::GET_CONFIRMATIONS, vec![tx_id]).await?;
        felt_to_usize(first(&result)?)
    }

    pub async fn has_confirmed(&self, tx_id: FieldElement, owner: FieldElement) -> RelayResult<bool> {
        let result = self.view(*selectors::GET_OWNER_CONFIRMED, vec![tx_id, owner]).await?;
        Ok(first(&result)? != FieldElement::ZERO)
    }

    pub async fn owners(&self) -> RelayResult<Vec<FieldElement>> {
        let result = self.view(*selectors::GET_OWNERS, vec![]).await?;
        let mut reader = CalldataReader::new(&result);
        let owners = reader.next_array()?.to_vec();
        reader.finish()?;
        Ok(owners)
    }

    pub async fn num_owners(&self) -> RelayResult<usize> {
        let result = self.view(*selectors::GET_NUM_OWNERS, vec![]).await?;
        felt_to_usize(first(&result)?)
    }

    pub async fn threshold(&self) -> RelayResult<usize> {
        let result = self.view(*selectors::GET_THRESHOLD, vec![]).await?;
        felt_to_usize(first(&result)?)
    }

    pub async fn transactions_len(&self) -> RelayResult<usize> {
        let result = self.view(*selectors::GET_TRANSACTIONS_LEN, vec![]).await?;
        felt_to_usize(first(&result)?)
    }

    pub async fn transaction(&self, tx_id: FieldElement) -> RelayResult<TransactionView> {
        let result = self.view(*selectors::GET_TRANSACTION, vec![tx_id]).await?;
        let mut reader = CalldataReader::new(&result);

        let to = reader.next()?;
        let selector = reader.next()?;
        let state_field = reader.next()?;
        let state = TransactionState::from_field_element(state_field)
            .ok_or_else(|| RelayError::MalformedCalldata(format!("unknown transaction state {:#x}", state_field)))?;
        let confirmations = reader.next_len()?;
        let calldata = reader.next_array()?.to_vec();
        reader.finish()?;

        Ok(TransactionView {
            to,
            selector,
            state,
            confirmations,
            calldata,
        })
    }

    fn entry_point(&self, selector: FieldElement, calldata: Vec<FieldElement>) -> Call {
        Call {
            to: self.address,
            selector,
            calldata,
        }
    }

    async fn view(&self, selector: FieldElement, calldata: Vec<FieldElement>) -> RelayResult<Vec<FieldElement>> {
        self.client.call(self.address, selector, calldata).await
    }
}

/// Decoded `get_invocation` view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    pub caller: FieldElement,
    pub args: Vec<FieldElement>,
}

/// Read access to the evaluator's invocation log
pub struct EvaluatorContract {
    client: Arc<dyn ChainClient>,
    address: FieldElement,
}

impl EvaluatorContract {
    pub fn new(client: Arc<dyn ChainClient>, address: FieldElement) -> Self {
        Self { client, address }
    }

    /// Handle for the evaluator the chain reports
    pub async fn from_client(client: Arc<dyn ChainClient>) -> RelayResult<Self> {
        let address = client.evaluator().await?;
        Ok(Self::new(client, address))
    }

    pub fn address(&self) -> FieldElement {
        self.address
    }

    /// Call to `validate_multicall(reward_account)`
    pub fn validate_multicall_call(&self, reward_account: FieldElement) -> Call {
        Call {
            to: self.address,
            selector: *selectors::VALIDATE_MULTICALL,
            calldata: vec![reward_account],
        }
    }

    /// Call to `validate_multisig(accounts_len, accounts*)`
    pub fn validate_multisig_call(&self, reward_accounts: &[FieldElement]) -> Call {
        let mut calldata = vec![FieldElement::from(reward_accounts.len() as u64)];
        calldata.extend_from_slice(reward_accounts);
        Call {
            to: self.address,
            selector: *selectors::VALIDATE_MULTISIG,
            calldata,
        }
    }

    pub async fn invocation_count(&self, selector: FieldElement) -> RelayResult<usize> {
        let result = self
            .client
            .call(self.address, *selectors::GET_INVOCATION_COUNT, vec![selector])
            .await?;
        felt_to_usize(first(&result)?)
    }

    pub async fn invocation(&self, selector: FieldElement, index: usize) -> RelayResult<InvocationRecord> {
        let result = self
            .client
            .call(
                self.address,
                *selectors::GET_INVOCATION,
                vec![selector, FieldElement::from(index as u64)],
            )
            .await?;

        let mut reader = CalldataReader::new(&result);
        let caller = reader.next()?;
        let args = reader.next_array()?.to_vec();
        reader.finish()?;

        Ok(InvocationRecord { caller, args })
    }

    /// Every recorded invocation of `selector`, oldest first
    pub async fn invocations(&self, selector: FieldElement) -> RelayResult<Vec<InvocationRecord>> {
        let count = self.invocation_count(selector).await?;
        let mut records = Vec::with_capacity(count);
        for index in 0..count {
            records.push(self.invocation(selector, index).await?);
        }
        Ok(records)
    }
}

fn first(result: &[FieldElement]) -> RelayResult<FieldElement> {
    result
        .first()
        .copied()
        .ok_or_else(|| RelayError::MalformedCalldata("empty view result".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::{ContractKind, Devnet, DevnetConfig};

    const MULTICALL_PATH: &str = "multicall.json";
    const SIGNER_PATH: &str = "signature_basic.json";
    const MULTISIG_PATH: &str = "multisig.json";

    fn client() -> Arc<dyn ChainClient> {
        Arc::new(
            Devnet::new(DevnetConfig::default())
                .declare(MULTICALL_PATH, ContractKind::MulticallAccount)
                .declare(SIGNER_PATH, ContractKind::SignerAccount)
                .declare(MULTISIG_PATH, ContractKind::Multisig),
        )
    }

    fn max_fee() -> FieldElement {
        FieldElement::from(DevnetConfig::default().fee_per_invoke)
    }

    #[tokio::test]
    async fn test_multicall_account_execute() {
        let client = client();
        let signer = StarkSigner::new(FieldElement::from(0xabcu64));
        let account = MulticallAccount::deploy(client.clone(), Path::new(MULTICALL_PATH), signer, max_fee())
            .await
            .unwrap();
        client.fund_account(account.address()).await.unwrap();

        let evaluator = EvaluatorContract::from_client(client.clone()).await.unwrap();
        let inclusion = account
            .execute_calls(vec![
                evaluator.validate_multicall_call(account.address()),
                evaluator.validate_multicall_call(account.address()),
            ])
            .await
            .unwrap();

        assert_eq!(inclusion.retdata, vec![FieldElement::from(2u64), FieldElement::ONE, FieldElement::ONE]);
        assert_eq!(account.nonce().await.unwrap(), FieldElement::ONE);

        let records = evaluator.invocations(*selectors::VALIDATE_MULTICALL).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.caller == account.address() && r.args == vec![account.address()]));
    }

    #[tokio::test]
    async fn test_multisig_views() {
        let client = client();
        let mut owners = Vec::new();
        for i in 1..=3u64 {
            let signer = StarkSigner::new(FieldElement::from(0x100 + i));
            let owner = SignerAccount::deploy(client.clone(), Path::new(SIGNER_PATH), signer, max_fee())
                .await
                .unwrap();
            client.fund_account(owner.address()).await.unwrap();
            owners.push(owner);
        }
        let addresses: Vec<_> = owners.iter().map(SignerAccount::address).collect();

        let multisig = MultisigContract::deploy(client.clone(), Path::new(MULTISIG_PATH), &addresses, 2)
            .await
            .unwrap();
        assert_eq!(multisig.owners().await.unwrap(), addresses);
        assert_eq!(multisig.num_owners().await.unwrap(), 3);
        assert_eq!(multisig.threshold().await.unwrap(), 2);

        let evaluator = EvaluatorContract::from_client(client.clone()).await.unwrap();
        let call = evaluator.validate_multisig_call(&[addresses[0]]);
        let (tx_id, _) = multisig.submit(&owners[0], &call).await.unwrap();
        multisig.confirm(&owners[1], tx_id).await.unwrap();

        let view = multisig.transaction(tx_id).await.unwrap();
        assert_eq!(view.to, evaluator.address());
        assert_eq!(view.state, TransactionState::PartiallyConfirmed);
        assert_eq!(view.confirmations, 1);
        assert_eq!(view.calldata, vec![FieldElement::ONE, addresses[0]]);

        assert!(multisig.has_confirmed(tx_id, addresses[1]).await.unwrap());
        assert!(!multisig.has_confirmed(tx_id, addresses[0]).await.unwrap());
        assert_eq!(multisig.transactions_len().await.unwrap(), 1);
    }
}

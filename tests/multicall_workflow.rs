// Multicall Workflow Integration Tests
// One signed transaction fanning out to several evaluator calls

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use account_relay::blockchain::types::selectors;
use account_relay::{
    run_multicall, CallArrayEntry, CallBatch, ChainClient, ContractKind, Devnet, DevnetConfig, EvaluatorContract,
    MulticallAccount, RelayConfig, RelayError, StarkSigner,
};
use starknet::accounts::Call;
use starknet::core::types::FieldElement;
use tempfile::NamedTempFile;

// =============================================================================
// Test Helpers
// =============================================================================

const MULTICALL_PATH: &str = "contracts/multicall.json";

fn hints_file(private_key: u64) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "PRIVATE_KEY": {},
            "MAX_FEE": "0x2386f26fc10000",
            "MULTICALL": "{}",
            "MULTISIG": "contracts/multisig.json",
            "SIGNATURE_BASIC": "contracts/signature_basic.json"
        }}"#,
        private_key, MULTICALL_PATH
    )
    .unwrap();
    file
}

fn devnet_for(config: &RelayConfig) -> Arc<dyn ChainClient> {
    Arc::new(Devnet::with_contracts(DevnetConfig::default(), &config.contracts))
}

async fn funded_account(client: &Arc<dyn ChainClient>, private_key: u64) -> MulticallAccount {
    let max_fee = FieldElement::from(DevnetConfig::default().fee_per_invoke);
    let account = MulticallAccount::deploy(
        client.clone(),
        Path::new(MULTICALL_PATH),
        StarkSigner::new(FieldElement::from(private_key)),
        max_fee,
    )
    .await
    .unwrap();
    client.fund_account(account.address()).await.unwrap();
    account
}

fn test_client() -> Arc<dyn ChainClient> {
    Arc::new(Devnet::new(DevnetConfig::default()).declare(MULTICALL_PATH, ContractKind::MulticallAccount))
}

// =============================================================================
// End-to-end Workflow
// =============================================================================

#[tokio::test]
async fn test_multicall_workflow_calls_evaluator_three_times() {
    let hints = hints_file(0x5eed);
    let config = RelayConfig::load(hints.path()).unwrap();
    let client = devnet_for(&config);

    let report = run_multicall(client.clone(), &config).await.unwrap();

    assert_eq!(report.calls, 3);
    assert_eq!(report.nonce_before, "0x0");
    assert_eq!(report.nonce_after, "0x1");
    assert_eq!(report.evaluator_invocations, 3);
    assert_eq!(report.execution.events, 3);

    let evaluator = EvaluatorContract::from_client(client.clone()).await.unwrap();
    let records = evaluator.invocations(*selectors::VALIDATE_MULTICALL).await.unwrap();
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(format!("{:#x}", record.caller), report.account);
        assert_eq!(record.args.len(), 1);
        assert_eq!(format!("{:#x}", record.args[0]), report.reward_account);
    }
}

#[tokio::test]
async fn test_multicall_workflow_fails_when_faucet_is_empty() {
    let hints = hints_file(0x5eed);
    let config = RelayConfig::load(hints.path()).unwrap();
    let devnet_config = DevnetConfig {
        faucet_balance: 0,
        ..DevnetConfig::default()
    };
    let client: Arc<dyn ChainClient> = Arc::new(Devnet::with_contracts(devnet_config, &config.contracts));

    let err = run_multicall(client, &config).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<RelayError>(), Some(RelayError::Funding(_))));
}

// =============================================================================
// Batch Semantics
// =============================================================================

#[tokio::test]
async fn test_calls_execute_in_submitted_order_with_their_own_slices() {
    let client = test_client();
    let account = funded_account(&client, 0x77).await;
    let evaluator = EvaluatorContract::from_client(client.clone()).await.unwrap();

    let args: Vec<FieldElement> = (10..15u64).map(FieldElement::from).collect();
    let calls = args.iter().map(|arg| evaluator.validate_multicall_call(*arg)).collect();
    account.execute_calls(calls).await.unwrap();

    let records = evaluator.invocations(*selectors::VALIDATE_MULTICALL).await.unwrap();
    let seen: Vec<FieldElement> = records.iter().map(|r| r.args[0]).collect();
    assert_eq!(seen, args);
}

#[tokio::test]
async fn test_calls_can_share_calldata_slices() {
    let client = test_client();
    let account = funded_account(&client, 0x78).await;
    let evaluator = EvaluatorContract::from_client(client.clone()).await.unwrap();
    let selector = *selectors::VALIDATE_MULTICALL;

    // both calls read the same single-value slice
    let batch = CallBatch::new(
        vec![
            CallArrayEntry { to: evaluator.address(), selector, data_offset: 0, data_len: 1 },
            CallArrayEntry { to: evaluator.address(), selector, data_offset: 0, data_len: 1 },
        ],
        vec![FieldElement::from(42u64)],
    );
    account.execute(&batch).await.unwrap();

    let records = evaluator.invocations(selector).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.args == vec![FieldElement::from(42u64)]));
}

#[tokio::test]
async fn test_out_of_bounds_slice_is_rejected() {
    let client = test_client();
    let account = funded_account(&client, 0x79).await;
    let evaluator = EvaluatorContract::from_client(client.clone()).await.unwrap();

    let batch = CallBatch::new(
        vec![CallArrayEntry {
            to: evaluator.address(),
            selector: *selectors::VALIDATE_MULTICALL,
            data_offset: 1,
            data_len: 1,
        }],
        vec![FieldElement::ONE],
    );
    let err = account.execute(&batch).await.unwrap_err();

    assert!(matches!(err, RelayError::CallOutOfBounds { .. }));
    assert_eq!(account.nonce().await.unwrap(), FieldElement::ZERO);
}

#[tokio::test]
async fn test_failing_call_reverts_whole_batch() {
    let client = test_client();
    let account = funded_account(&client, 0x7a).await;
    let evaluator = EvaluatorContract::from_client(client.clone()).await.unwrap();

    let calls = vec![
        evaluator.validate_multicall_call(FieldElement::ONE),
        Call {
            to: evaluator.address(),
            selector: *selectors::VALIDATE_MULTICALL,
            calldata: vec![FieldElement::ONE, FieldElement::ONE],
        },
    ];
    let err = account.execute_calls(calls).await.unwrap_err();

    assert!(matches!(err, RelayError::EvaluatorRejected(_)));
    assert_eq!(evaluator.invocation_count(*selectors::VALIDATE_MULTICALL).await.unwrap(), 0);
    assert_eq!(account.nonce().await.unwrap(), FieldElement::ZERO);
}

#[tokio::test]
async fn test_wrong_signer_is_rejected() {
    let client = test_client();
    let account = funded_account(&client, 0x7b).await;
    let evaluator = EvaluatorContract::from_client(client.clone()).await.unwrap();

    let impostor = MulticallAccount::new(
        client.clone(),
        account.address(),
        StarkSigner::new(FieldElement::from(0x7cu64)),
        FieldElement::from(DevnetConfig::default().fee_per_invoke),
    );
    let err = impostor
        .execute_calls(vec![evaluator.validate_multicall_call(FieldElement::ONE)])
        .await
        .unwrap_err();

    assert_eq!(err, RelayError::InvalidSignature(account.address()));
    assert_eq!(account.nonce().await.unwrap(), FieldElement::ZERO);
}

//! Unit tests for the transaction executor

#[path = "helpers.rs"]
mod test_helpers;

use payment_sequencer::service::TransactionExecutor;
use payment_sequencer::types::{FlowStage, RouteTransaction};
use payment_sequencer::{FlowError, WalletError};
use std::sync::Arc;
use test_helpers::*;
use tokio::sync::watch;

fn create_transactions(count: usize) -> Vec<RouteTransaction> {
    (0..count)
        .map(|i| RouteTransaction {
            to: DUMMY_ROUTER_ADDR.to_string(),
            data: format!("0x{:02x}", i),
            value: "0".to_string(),
        })
        .collect()
}

/// What is tested: execute() submits transactions in order and returns the last receipt
/// Why: Approvals must be confirmed before the swap that spends them
#[tokio::test]
async fn test_executes_in_order() {
    let wallet = Arc::new(FakeWallet::custodial());
    let executor = TransactionExecutor::new(wallet.clone(), 1);

    let receipt = executor
        .execute(&create_transactions(2), DUMMY_CHAIN_ARB)
        .await
        .unwrap();

    let sent = wallet.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0.data, "0x00");
    assert_eq!(sent[1].0.data, "0x01");
    assert_eq!(receipt.transaction_hash, dummy_tx_hash(2));
    assert!(receipt.confirmations >= 1);
}

/// What is tested: a failed confirmation stops the sequence and lists confirmed steps
/// Why: Later transactions must not be sent, and the user must learn what already executed
#[tokio::test]
async fn test_failure_aborts_remaining_transactions() {
    let wallet = FakeWallet::custodial();
    *wallet.revert_step.lock().unwrap() = Some(2);
    let wallet = Arc::new(wallet);
    let executor = TransactionExecutor::new(wallet.clone(), 1);

    let err = executor
        .execute(&create_transactions(3), DUMMY_CHAIN_ARB)
        .await
        .unwrap_err();

    match &err {
        FlowError::TransactionFailed {
            step,
            total,
            confirmed,
            source,
        } => {
            assert_eq!(*step, 2);
            assert_eq!(*total, 3);
            assert_eq!(confirmed, &vec![dummy_tx_hash(1)]);
            assert!(matches!(source, WalletError::Reverted(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.after_execution());
    assert_eq!(wallet.sent().len(), 2);
}

/// What is tested: an external wallet on another chain is switched before signing
/// Why: Signing on the wrong chain would send funds to the wrong network
#[tokio::test]
async fn test_external_wallet_switches_chain() {
    let wallet = Arc::new(FakeWallet::external(DUMMY_CHAIN_OP));
    let (stage, mut stages) = watch::channel(FlowStage::Idle);
    let executor = TransactionExecutor::new(wallet.clone(), 1).with_stage(Arc::new(stage));

    executor.execute(&create_transactions(1), DUMMY_CHAIN_ARB).await.unwrap();

    assert_eq!(*wallet.switches.lock().unwrap(), vec![DUMMY_CHAIN_ARB.to_string()]);
    assert_eq!(*stages.borrow_and_update(), FlowStage::Executing);
}

/// What is tested: a wallet that stays on the wrong chain fails with NetworkSwitch
/// Why: Nothing may be signed unless the switch took effect
#[tokio::test]
async fn test_failed_switch_aborts() {
    let mut wallet = FakeWallet::external(DUMMY_CHAIN_OP);
    wallet.switch_succeeds = false;
    let wallet = Arc::new(wallet);
    let executor = TransactionExecutor::new(wallet.clone(), 1);

    let err = executor
        .execute(&create_transactions(1), DUMMY_CHAIN_ARB)
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::NetworkSwitch { .. }));
    assert!(wallet.sent().is_empty());
}

/// What is tested: custodial wallets are never asked to switch
/// Why: Embedded wallets sign for any chain
#[tokio::test]
async fn test_custodial_wallet_not_switched() {
    let wallet = Arc::new(FakeWallet::new(
        payment_sequencer::clients::WalletKind::Custodial,
        DUMMY_CHAIN_OP,
    ));
    let executor = TransactionExecutor::new(wallet.clone(), 1);

    executor.execute(&create_transactions(1), DUMMY_CHAIN_ARB).await.unwrap();

    assert!(wallet.switches.lock().unwrap().is_empty());
}

/// What is tested: execute() refuses an empty list and a disconnected wallet
/// Why: Both are programming or session errors, not payments
#[tokio::test]
async fn test_rejects_empty_and_disconnected() {
    let wallet = Arc::new(FakeWallet::custodial());
    let executor = TransactionExecutor::new(wallet, 1);
    let err = executor.execute(&[], DUMMY_CHAIN_ARB).await.unwrap_err();
    assert!(matches!(err, FlowError::InvalidIntent(_)));

    let mut wallet = FakeWallet::custodial();
    wallet.address = None;
    let executor = TransactionExecutor::new(Arc::new(wallet), 1);
    let err = executor
        .execute(&create_transactions(1), DUMMY_CHAIN_ARB)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::WalletNotConnected));
    assert_eq!(err.user_message(), "Please make sure your wallet is connected.");
}

/// What is tested: execute_transfer() sends the amount to the recipient in one step
/// Why: Same-asset payments are a single token transfer
#[tokio::test]
async fn test_execute_transfer() {
    let wallet = Arc::new(FakeWallet::custodial());
    let executor = TransactionExecutor::new(wallet.clone(), 1);

    let receipt = executor
        .execute_transfer(&usdc_arb(), DUMMY_RECIPIENT_ADDR, 2_500_000)
        .await
        .unwrap();

    assert_eq!(receipt.transaction_hash, dummy_tx_hash(1));
    assert_eq!(
        wallet.transfers(),
        vec![(usdc_arb(), DUMMY_RECIPIENT_ADDR.to_string(), 2_500_000)]
    );
}

//! Transaction Executor
//!
//! Signs and submits transactions through the wallet, strictly in order.
//!
//! Flow:
//! 1. **Switch network**: external wallets on the wrong chain are asked to switch
//! 2. **Submit**: each transaction is signed and sent
//! 3. **Confirm**: the next transaction is only sent once the previous one is confirmed
//!
//! A failure aborts the remaining transactions. Confirmed transactions stay
//! confirmed; the error lists them so the user knows what already happened.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::clients::wallet::{Wallet, WalletKind};
use crate::error::FlowError;
use crate::types::{FlowStage, RouteTransaction, TokenLocation, TransactionReceipt};

/// Executes transactions through a wallet.
#[derive(Debug, Clone)]
pub struct TransactionExecutor {
    wallet: Arc<dyn Wallet>,
    /// Confirmations required per transaction (at least 1)
    confirmations: u64,
    stage: Option<Arc<watch::Sender<FlowStage>>>,
}

impl TransactionExecutor {
    pub fn new(wallet: Arc<dyn Wallet>, confirmations: u64) -> Self {
        Self {
            wallet,
            confirmations: confirmations.max(1),
            stage: None,
        }
    }

    /// Publishes stage changes on `stage`.
    pub fn with_stage(mut self, stage: Arc<watch::Sender<FlowStage>>) -> Self {
        self.stage = Some(stage);
        self
    }

    fn set_stage(&self, stage: FlowStage) {
        if let Some(sender) = &self.stage {
            sender.send_replace(stage);
        }
    }

    /// Switches an external wallet to `chain_id` if it is elsewhere.
    ///
    /// Custodial wallets sign for any chain and are never switched.
    pub async fn ensure_chain(&self, chain_id: &str) -> Result<(), FlowError> {
        if self.wallet.kind() != WalletKind::External {
            return Ok(());
        }

        let current = self
            .wallet
            .connected_chain()
            .await
            .map_err(|e| FlowError::NetworkSwitch {
                from: "unknown".to_string(),
                to: chain_id.to_string(),
                reason: e.to_string(),
            })?;
        if current == chain_id {
            return Ok(());
        }

        info!("Switching wallet network from chain {} to chain {}", current, chain_id);
        self.set_stage(FlowStage::SwitchingNetwork);
        let switch_error = |reason: String| FlowError::NetworkSwitch {
            from: current.clone(),
            to: chain_id.to_string(),
            reason,
        };

        self.wallet
            .switch_chain(chain_id)
            .await
            .map_err(|e| switch_error(e.to_string()))?;

        let switched = self
            .wallet
            .connected_chain()
            .await
            .map_err(|e| switch_error(e.to_string()))?;
        if switched != chain_id {
            return Err(switch_error(format!("wallet is still on chain {}", switched)));
        }
        Ok(())
    }

    /// Executes `transactions` on `chain_id` in order.
    ///
    /// Transaction *i+1* is only submitted after transaction *i* is confirmed.
    ///
    /// # Returns
    ///
    /// * `Ok(TransactionReceipt)` - Receipt of the final transaction
    /// * `Err(FlowError::NetworkSwitch)` - External wallet could not switch chains
    /// * `Err(FlowError::TransactionFailed)` - A submission or confirmation failed
    pub async fn execute(
        &self,
        transactions: &[RouteTransaction],
        chain_id: &str,
    ) -> Result<TransactionReceipt, FlowError> {
        if transactions.is_empty() {
            return Err(FlowError::InvalidIntent("No transactions to execute".to_string()));
        }
        if self.wallet.address().is_none() {
            return Err(FlowError::WalletNotConnected);
        }
        self.ensure_chain(chain_id).await?;

        let total = transactions.len();
        let mut confirmed: Vec<String> = Vec::with_capacity(total);
        let mut last_receipt = None;

        for (index, tx) in transactions.iter().enumerate() {
            let step = index + 1;
            self.set_stage(FlowStage::SignInWallet);
            let hash = match self.wallet.send_transaction(tx, chain_id).await {
                Ok(hash) => hash,
                Err(source) => {
                    error!("Transaction {}/{} to {} failed to submit: {}", step, total, tx.to, source);
                    return Err(FlowError::TransactionFailed {
                        step,
                        total,
                        confirmed,
                        source,
                    });
                }
            };

            self.set_stage(FlowStage::Executing);
            let receipt = match self
                .wallet
                .wait_for_receipt(&hash, chain_id, self.confirmations)
                .await
            {
                Ok(receipt) => receipt,
                Err(source) => {
                    error!("Transaction {}/{} ({}) failed to confirm: {}", step, total, hash, source);
                    return Err(FlowError::TransactionFailed {
                        step,
                        total,
                        confirmed,
                        source,
                    });
                }
            };

            info!(
                "Transaction {}/{} confirmed: {} ({} confirmation(s))",
                step, total, receipt.transaction_hash, receipt.confirmations
            );
            confirmed.push(receipt.transaction_hash.clone());
            last_receipt = Some(receipt);
        }

        last_receipt.ok_or_else(|| FlowError::InvalidIntent("No transactions to execute".to_string()))
    }

    /// Sends `amount` base units of `token` to `to` and waits for confirmation.
    pub async fn execute_transfer(
        &self,
        token: &TokenLocation,
        to: &str,
        amount: u128,
    ) -> Result<TransactionReceipt, FlowError> {
        if self.wallet.address().is_none() {
            return Err(FlowError::WalletNotConnected);
        }
        self.ensure_chain(&token.chain_id).await?;

        let failed = |source| FlowError::TransactionFailed {
            step: 1,
            total: 1,
            confirmed: Vec::new(),
            source,
        };

        self.set_stage(FlowStage::SignInWallet);
        let hash = self.wallet.send_money(token, to, amount).await.map_err(failed)?;

        self.set_stage(FlowStage::Executing);
        let receipt = self
            .wallet
            .wait_for_receipt(&hash, &token.chain_id, self.confirmations)
            .await
            .map_err(failed)?;

        info!("Transfer of {} to {} confirmed: {}", amount, to, receipt.transaction_hash);
        Ok(receipt)
    }
}

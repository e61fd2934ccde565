//! EVM JSON-RPC Wallet
//!
//! Wallet implementation backed by a JSON-RPC endpoint that holds the payer's
//! key (a node with an unlocked account, or a wallet provider exposing
//! EIP-1193 methods over HTTP).

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::http_client;
use super::wallet::{balance_of_calldata, transfer_transaction, Wallet, WalletKind};
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::types::{RouteTransaction, TokenLocation, TransactionReceipt};

/// EIP-1193 "User rejected the request" error code.
const USER_REJECTED_CODE: i64 = 4001;

/// EVM JSON-RPC request wrapper
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<serde_json::Value>,
    id: u64,
}

/// EVM JSON-RPC response wrapper
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Subset of `eth_getTransactionReceipt` we rely on
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    /// "0x1" success, "0x0" reverted
    status: Option<String>,
}

/// Wallet that signs through a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcWallet {
    client: Client,
    rpc_url: String,
    address: String,
    kind: WalletKind,
    receipt_poll_interval: Duration,
    receipt_max_attempts: u32,
}

impl JsonRpcWallet {
    /// Creates a wallet for `address` behind `rpc_url`.
    ///
    /// # Arguments
    ///
    /// * `rpc_url` - JSON-RPC endpoint
    /// * `address` - Payer address managed by the endpoint
    /// * `kind` - Custodial or external
    /// * `timeout` - Per-request timeout
    ///
    /// # Returns
    ///
    /// * `Ok(JsonRpcWallet)` - Successfully created wallet
    /// * `Err(anyhow::Error)` - Failed to build the HTTP client
    pub fn new(
        rpc_url: impl Into<String>,
        address: impl Into<String>,
        kind: WalletKind,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            rpc_url: rpc_url.into(),
            address: address.into(),
            kind,
            receipt_poll_interval: Duration::from_millis(1000),
            receipt_max_attempts: 120,
        })
    }

    /// Creates a wallet from the `[wallet]` config section.
    pub fn from_config(config: &WalletConfig, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self::new(&config.rpc_url, &config.address, config.kind, timeout)?
            .with_receipt_polling(
                Duration::from_millis(config.receipt_poll_interval_ms),
                config.receipt_max_attempts,
            ))
    }

    /// Overrides how receipts are polled.
    pub fn with_receipt_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_max_attempts = max_attempts;
        self
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<T>, WalletError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::Transport(format!("{} request failed: {}", method, e)))?
            .json()
            .await
            .map_err(|e| WalletError::InvalidResponse(format!("{} response: {}", method, e)))?;

        if let Some(error) = response.error {
            warn!("JSON-RPC {} error: {} ({})", method, error.message, error.code);
            return Err(classify_rpc_error(error));
        }
        Ok(response.result)
    }

    async fn block_number(&self) -> Result<u64, WalletError> {
        let block_hex: String = self
            .rpc("eth_blockNumber", vec![])
            .await?
            .ok_or_else(|| WalletError::InvalidResponse("eth_blockNumber returned null".into()))?;
        Ok(parse_hex_u128(&block_hex)? as u64)
    }
}

#[async_trait]
impl Wallet for JsonRpcWallet {
    fn kind(&self) -> WalletKind {
        self.kind
    }

    fn address(&self) -> Option<String> {
        if self.address.is_empty() {
            None
        } else {
            Some(self.address.clone())
        }
    }

    async fn connected_chain(&self) -> Result<String, WalletError> {
        let chain_hex: String = self
            .rpc("eth_chainId", vec![])
            .await?
            .ok_or_else(|| WalletError::InvalidResponse("eth_chainId returned null".into()))?;
        Ok(parse_hex_u128(&chain_hex)?.to_string())
    }

    async fn switch_chain(&self, chain_id: &str) -> Result<(), WalletError> {
        let chain: u64 = chain_id
            .parse()
            .map_err(|_| WalletError::InvalidResponse(format!("invalid chain ID '{}'", chain_id)))?;
        info!("Requesting network switch to chain {}", chain);
        let _: Option<serde_json::Value> = self
            .rpc(
                "wallet_switchEthereumChain",
                vec![serde_json::json!({ "chainId": format!("0x{:x}", chain) })],
            )
            .await?;
        Ok(())
    }

    async fn send_transaction(
        &self,
        tx: &RouteTransaction,
        chain_id: &str,
    ) -> Result<String, WalletError> {
        let from = self.address().ok_or(WalletError::NotConnected)?;
        let value: u128 = if tx.value.is_empty() {
            0
        } else {
            tx.value
                .parse()
                .map_err(|_| WalletError::InvalidResponse(format!("invalid value '{}'", tx.value)))?
        };
        let chain: u64 = chain_id
            .parse()
            .map_err(|_| WalletError::InvalidResponse(format!("invalid chain ID '{}'", chain_id)))?;

        let params = serde_json::json!({
            "from": from,
            "to": tx.to,
            "data": tx.data,
            "value": format!("0x{:x}", value),
            "chainId": format!("0x{:x}", chain),
        });

        let hash: String = self
            .rpc("eth_sendTransaction", vec![params])
            .await
            .map_err(|e| match e {
                // Rejecting a signature prompt is a transaction rejection
                WalletError::RequestRejected => WalletError::TransactionRejected,
                other => other,
            })?
            .ok_or_else(|| WalletError::InvalidResponse("eth_sendTransaction returned null".into()))?;

        info!("Submitted transaction {} to {} on chain {}", hash, tx.to, chain_id);
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        _chain_id: &str,
        confirmations: u64,
    ) -> Result<TransactionReceipt, WalletError> {
        for attempt in 1..=self.receipt_max_attempts {
            let receipt: Option<RpcReceipt> = self
                .rpc("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
                .await?;

            if let Some(receipt) = receipt {
                if receipt.status.as_deref() == Some("0x0") {
                    return Err(WalletError::Reverted(receipt.transaction_hash));
                }
                let block_number = match receipt.block_number.as_deref() {
                    Some(block) => Some(parse_hex_u128(block)? as u64),
                    None => None,
                };

                if let Some(block) = block_number {
                    let confirmed = if confirmations <= 1 {
                        1
                    } else {
                        self.block_number().await?.saturating_sub(block) + 1
                    };
                    if confirmed >= confirmations {
                        return Ok(TransactionReceipt {
                            transaction_hash: receipt.transaction_hash,
                            confirmations: confirmed,
                            block_number,
                        });
                    }
                }
            }

            debug!(
                "Receipt for {} not final yet (attempt {}/{})",
                tx_hash, attempt, self.receipt_max_attempts
            );
            if attempt < self.receipt_max_attempts {
                tokio::time::sleep(self.receipt_poll_interval).await;
            }
        }

        Err(WalletError::ReceiptTimeout(tx_hash.to_string()))
    }

    async fn send_money(
        &self,
        token: &TokenLocation,
        to: &str,
        amount: u128,
    ) -> Result<String, WalletError> {
        let tx = transfer_transaction(token, to, amount)?;
        self.send_transaction(&tx, &token.chain_id).await
    }

    async fn token_balance(&self, token: &TokenLocation) -> Result<u128, WalletError> {
        let owner = self.address().ok_or(WalletError::NotConnected)?;
        let balance_hex: Option<String> = if token.is_native() {
            self.rpc("eth_getBalance", vec![serde_json::json!(owner), serde_json::json!("latest")])
                .await?
        } else {
            let call = serde_json::json!({
                "to": token.token_address,
                "data": balance_of_calldata(&owner)?,
            });
            self.rpc("eth_call", vec![call, serde_json::json!("latest")]).await?
        };
        parse_hex_u128(&balance_hex.unwrap_or_else(|| "0x0".to_string()))
    }
}

/// Maps a JSON-RPC error onto the wallet error taxonomy.
fn classify_rpc_error(error: JsonRpcError) -> WalletError {
    let lower = error.message.to_lowercase();
    if error.code == USER_REJECTED_CODE {
        WalletError::RequestRejected
    } else if lower.contains("insufficient funds") {
        WalletError::InsufficientFunds(error.message)
    } else {
        WalletError::Rpc {
            code: error.code,
            message: error.message,
        }
    }
}

/// Parses a 0x-prefixed hex quantity, ignoring leading zero padding.
fn parse_hex_u128(value: &str) -> Result<u128, WalletError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let trimmed = stripped.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(trimmed, 16)
        .map_err(|_| WalletError::InvalidResponse(format!("invalid hex quantity '{}'", value)))
}

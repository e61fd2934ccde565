//! Wallet abstraction
//!
//! A wallet signs and submits transactions on behalf of the payer. Custodial
//! (embedded) wallets live on a fixed chain; external wallets can be asked to
//! switch networks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::types::{RouteTransaction, TokenLocation, TransactionReceipt};

/// ERC20 `transfer(address,uint256)` selector.
pub const ERC20_TRANSFER_SELECTOR: &str = "a9059cbb";
/// ERC20 `balanceOf(address)` selector.
pub const ERC20_BALANCE_OF_SELECTOR: &str = "70a08231";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    /// Embedded wallet holding user funds; only guaranteed-rate routes allowed
    Custodial,
    /// User-connected wallet
    External,
}

#[async_trait]
pub trait Wallet: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> WalletKind;

    /// Payer address, `None` while no wallet is connected.
    fn address(&self) -> Option<String>;

    /// Chain the wallet is currently connected to.
    async fn connected_chain(&self) -> Result<String, WalletError>;

    /// Asks the wallet to switch to `chain_id`.
    async fn switch_chain(&self, chain_id: &str) -> Result<(), WalletError>;

    /// Signs and submits one transaction, returning its hash.
    async fn send_transaction(
        &self,
        tx: &RouteTransaction,
        chain_id: &str,
    ) -> Result<String, WalletError>;

    /// Waits until `tx_hash` has at least `confirmations` confirmations.
    async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        chain_id: &str,
        confirmations: u64,
    ) -> Result<TransactionReceipt, WalletError>;

    /// Transfers `amount` base units of `token` to `to`, returning the hash.
    async fn send_money(
        &self,
        token: &TokenLocation,
        to: &str,
        amount: u128,
    ) -> Result<String, WalletError>;

    /// Balance of `token` held by the wallet, in base units.
    async fn token_balance(&self, token: &TokenLocation) -> Result<u128, WalletError>;
}

/// Left-pads a 0x address into a 32-byte ABI word.
fn address_word(address: &str) -> Result<String, WalletError> {
    let stripped = address.strip_prefix("0x").unwrap_or(address);
    if stripped.len() != 40 || hex::decode(stripped).is_err() {
        return Err(WalletError::InvalidResponse(format!("invalid address '{}'", address)));
    }
    Ok(format!("{:0>64}", stripped.to_lowercase()))
}

/// Builds the transaction moving `amount` of `token` to `to`.
///
/// Native tokens move as value; ERC20 tokens as a `transfer` call.
pub fn transfer_transaction(
    token: &TokenLocation,
    to: &str,
    amount: u128,
) -> Result<RouteTransaction, WalletError> {
    if token.is_native() {
        address_word(to)?;
        return Ok(RouteTransaction {
            to: to.to_string(),
            data: "0x".to_string(),
            value: amount.to_string(),
        });
    }
    Ok(RouteTransaction {
        to: token.token_address.clone(),
        data: format!("0x{}{}{:064x}", ERC20_TRANSFER_SELECTOR, address_word(to)?, amount),
        value: "0".to_string(),
    })
}

/// Calldata for `balanceOf(owner)`.
pub fn balance_of_calldata(owner: &str) -> Result<String, WalletError> {
    Ok(format!("0x{}{}", ERC20_BALANCE_OF_SELECTOR, address_word(owner)?))
}

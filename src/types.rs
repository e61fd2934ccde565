//! Payment Data Model
//!
//! Intents, charges, routes, receipts and payments exchanged between the
//! sequencer stages and the external services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::format_units;
use crate::error::FlowError;

/// Address used by the charge API to mark a chain's native token.
pub const NATIVE_TOKEN_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// ============================================================================
// INTENT
// ============================================================================

/// A token on a specific chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLocation {
    /// Chain ID as a decimal string (e.g. "42161")
    pub chain_id: String,
    /// Token contract address (0x-prefixed hex)
    pub token_address: String,
}

impl TokenLocation {
    pub fn new(chain_id: impl Into<String>, token_address: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            token_address: token_address.into(),
        }
    }

    /// True if both locations name the same token on the same chain.
    ///
    /// Addresses are compared case-insensitively (checksummed vs lowercase).
    pub fn same_asset(&self, other: &TokenLocation) -> bool {
        self.chain_id == other.chain_id
            && self.token_address.eq_ignore_ascii_case(&other.token_address)
    }

    pub fn same_chain(&self, other: &TokenLocation) -> bool {
        self.chain_id == other.chain_id
    }

    pub fn is_native(&self) -> bool {
        self.token_address.eq_ignore_ascii_case(NATIVE_TOKEN_ADDRESS)
    }
}

impl fmt::Display for TokenLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.token_address)
    }
}

/// Kind of payment recorded on the charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    DirectSend,
    Withdraw,
    Deposit,
    Request,
}

/// File attached to a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Optional note and/or file sent along with a charge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    pub message: Option<String>,
    pub file: Option<AttachmentFile>,
}

/// The logical unit of work handed to a sequencer.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    /// Human-readable amount (e.g. "10.00")
    pub amount: String,
    /// Fiat currency of the local price (e.g. "USD")
    pub currency: String,
    /// Where the funds leave from
    pub source: TokenLocation,
    /// Where the funds must arrive
    pub destination: TokenLocation,
    /// Address receiving the funds on the destination chain
    pub recipient_address: String,
    /// Destination token symbol (e.g. "USDC")
    pub token_symbol: String,
    /// Destination token decimals
    pub token_decimals: u8,
    pub transaction_type: TransactionType,
    /// Request this charge fulfills, if any
    pub request_id: Option<String>,
    pub attachment: Option<Attachment>,
}

impl PaymentIntent {
    /// Checks the fields every flow relies on.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.amount.trim().is_empty() {
            return Err(FlowError::InvalidIntent("Amount is required".to_string()));
        }
        if !is_hex_address(&self.recipient_address) {
            return Err(FlowError::InvalidIntent(format!(
                "Invalid recipient address '{}'",
                self.recipient_address
            )));
        }
        for location in [&self.source, &self.destination] {
            if location.chain_id.parse::<u64>().is_err() {
                return Err(FlowError::InvalidIntent(format!(
                    "Invalid chain ID '{}'",
                    location.chain_id
                )));
            }
            if !is_hex_address(&location.token_address) {
                return Err(FlowError::InvalidIntent(format!(
                    "Invalid token address '{}'",
                    location.token_address
                )));
            }
        }
        Ok(())
    }

    /// True when no route is needed to move the funds.
    pub fn is_same_asset(&self) -> bool {
        self.source.same_asset(&self.destination)
    }
}

/// True for a 0x-prefixed 20-byte hex address.
pub fn is_hex_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(stripped) => stripped.len() == 40 && hex::decode(stripped).is_ok(),
        None => false,
    }
}

// ============================================================================
// CHARGE
// ============================================================================

/// Lifecycle status of a charge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Request link a charge belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLink {
    pub recipient_address: String,
}

/// Server-side record of a payment intent's canonical terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub uuid: String,
    pub chain_id: String,
    pub token_address: String,
    pub token_amount: String,
    pub token_decimals: u8,
    #[serde(default)]
    pub token_symbol: String,
    #[serde(default)]
    pub request_link: RequestLink,
    #[serde(default)]
    pub status: ChargeStatus,
}

impl Charge {
    pub fn location(&self) -> TokenLocation {
        TokenLocation::new(self.chain_id.clone(), self.token_address.clone())
    }
}

// ============================================================================
// ROUTE
// ============================================================================

/// Quote type returned by the routing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    /// Request-for-quote route with a guaranteed rate
    Rfq,
    /// Swap route subject to slippage
    Swap,
}

/// A single transaction to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTransaction {
    pub to: String,
    /// 0x-prefixed calldata
    pub data: String,
    /// Native value in wei, decimal string
    pub value: String,
}

/// An ephemeral quote for a cross-chain or cross-token transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_type: RouteType,
    pub transactions: Vec<RouteTransaction>,
    pub fee_costs_usd: f64,
    pub expiry: DateTime<Utc>,
    /// Minimum destination amount in base units, when quoted
    pub to_amount_min: Option<String>,
    pub raw_response: serde_json::Value,
}

impl Route {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry < now
    }

    /// Rejects a route whose expiry has passed.
    pub fn ensure_not_expired(&self, now: DateTime<Utc>) -> Result<(), FlowError> {
        if self.is_expired(now) {
            return Err(FlowError::RouteExpired {
                expiry: self.expiry,
            });
        }
        Ok(())
    }

    /// Minimum amount the recipient receives, formatted with `decimals`.
    ///
    /// `None` when the quote carries no (or an unparseable) minimum.
    pub fn min_received(&self, decimals: u8) -> Option<String> {
        let units = self.to_amount_min.as_deref()?.trim().parse::<u128>().ok()?;
        Some(format_units(units, decimals))
    }
}

// ============================================================================
// RECEIPTS AND PAYMENTS
// ============================================================================

/// On-chain confirmation of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub confirmations: u64,
    pub block_number: Option<u64>,
}

/// Terminal record linking a confirmed transaction to its charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Payment {
    pub uuid: String,
    pub charge_id: String,
    pub chain_id: String,
    pub hash: String,
    pub token_address: String,
    pub payer_address: String,
    pub status: String,
}

// ============================================================================
// FLOW STATE
// ============================================================================

/// Stage a flow is currently in. The label is shown as the loading text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowStage {
    #[default]
    Idle,
    Preparing,
    FetchingRoute,
    SwitchingNetwork,
    SignInWallet,
    Executing,
    AwaitingFulfillment,
    Recording,
}

impl FlowStage {
    pub fn label(&self) -> &'static str {
        match self {
            FlowStage::Idle => "Idle",
            FlowStage::Preparing => "Preparing transaction",
            FlowStage::FetchingRoute => "Fetching route",
            FlowStage::SwitchingNetwork => "Switching network",
            FlowStage::SignInWallet => "Sign in wallet",
            FlowStage::Executing => "Executing transaction",
            FlowStage::AwaitingFulfillment => "Awaiting route fulfillment",
            FlowStage::Recording => "Recording payment",
        }
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Settlement poll state for cross-chain flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    AwaitingFulfillment,
    Resolved,
    TimedOut,
}

/// Structured result of one payment attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowResult {
    pub success: bool,
    pub charge: Option<Charge>,
    pub payment: Option<Payment>,
    /// Source-chain hash of the final executed transaction
    pub tx_hash: Option<String>,
    /// Destination-chain hash; the source hash when settlement timed out
    pub destination_tx_hash: Option<String>,
    pub settlement: Option<SettlementState>,
    /// Raw error text (e.g. "ROUTE_NOT_FOUND")
    pub error: Option<String>,
    /// Error code, see `FlowError::code`
    pub error_code: Option<String>,
    /// Message to show the user
    pub user_message: Option<String>,
}

impl FlowResult {
    pub fn failure(err: &FlowError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_code: Some(err.code().to_string()),
            user_message: Some(err.user_message()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC_ARB: &str = "0xaf88d065e77c8cC2239327C5EDb3A432268e5831";

    #[test]
    fn test_same_asset_ignores_address_case() {
        let a = TokenLocation::new("42161", USDC_ARB);
        let b = TokenLocation::new("42161", USDC_ARB.to_lowercase());
        assert!(a.same_asset(&b));
        assert!(!a.same_asset(&TokenLocation::new("10", USDC_ARB)));
    }

    #[test]
    fn test_charge_deserializes_api_shape() {
        let charge: Charge = serde_json::from_value(serde_json::json!({
            "uuid": "c-1",
            "chainId": "42161",
            "tokenAddress": USDC_ARB,
            "tokenAmount": "10.00",
            "tokenDecimals": 6,
            "requestLink": { "recipientAddress": "0x1111111111111111111111111111111111111111" }
        }))
        .unwrap();
        assert_eq!(charge.status, ChargeStatus::Pending);
        assert_eq!(charge.token_symbol, "");
        assert_eq!(
            charge.request_link.recipient_address,
            "0x1111111111111111111111111111111111111111"
        );
    }

    #[test]
    fn test_transaction_type_wire_names() {
        assert_eq!(
            serde_json::to_value(TransactionType::DirectSend).unwrap(),
            serde_json::json!("DIRECT_SEND")
        );
        assert_eq!(
            serde_json::to_value(TransactionType::Withdraw).unwrap(),
            serde_json::json!("WITHDRAW")
        );
    }

    #[test]
    fn test_is_hex_address() {
        assert!(is_hex_address(USDC_ARB));
        assert!(!is_hex_address("af88d065e77c8cC2239327C5EDb3A432268e5831"));
        assert!(!is_hex_address("0x1234"));
    }

    #[test]
    fn test_min_received() {
        let mut route = Route {
            route_type: RouteType::Rfq,
            transactions: vec![],
            fee_costs_usd: 0.0,
            expiry: Utc::now(),
            to_amount_min: Some("9940050".to_string()),
            raw_response: serde_json::Value::Null,
        };
        assert_eq!(route.min_received(6).as_deref(), Some("9.94005"));

        route.to_amount_min = Some("n/a".to_string());
        assert_eq!(route.min_received(6), None);
        route.to_amount_min = None;
        assert_eq!(route.min_received(6), None);
    }
}

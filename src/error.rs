//! Error Types
//!
//! Typed errors for the payment flows and their external collaborators,
//! plus the mapping from raw wallet/SDK failures to user-facing messages.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::amount::AmountError;

/// Error string reported when only a non-guaranteed route exists.
pub const ROUTE_NOT_FOUND_ERROR: &str = "ROUTE_NOT_FOUND";

/// Shown when value already moved on-chain but bookkeeping failed.
pub const SUPPORT_MESSAGE: &str =
    "Your funds were sent but we could not record the payment. Please contact support with your transaction hash.";

const DEFAULT_USER_MESSAGE: &str = "Something went wrong. Please try again later.";

// ============================================================================
// COLLABORATOR ERRORS
// ============================================================================

/// Errors raised by the HTTP API clients (charges, routing, prices, status, claims).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to send {endpoint} request: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("Failed to parse {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },
    #[error("{endpoint} response missing field '{field}'")]
    MissingField { endpoint: String, field: String },
    #[error("API error: {0}")]
    Rejected(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Errors raised by a wallet while signing, submitting or confirming.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Failed to get wallet client")]
    NotConnected,
    #[error("user rejected transaction")]
    TransactionRejected,
    #[error("User rejected the request")]
    RequestRejected,
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("JSON-RPC error: {message} ({code})")]
    Rpc { code: i64, message: String },
    #[error("Wallet NETWORK_ERROR: {0}")]
    Transport(String),
    #[error("Transaction {0} reverted")]
    Reverted(String),
    #[error("Timed out waiting for receipt of {0}")]
    ReceiptTimeout(String),
    #[error("Invalid wallet response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// FLOW ERRORS
// ============================================================================

/// Errors surfaced by the payment flows.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Failed to get wallet client")]
    WalletNotConnected,
    #[error("A payment is already being processed")]
    AlreadyProcessing,
    #[error("Invalid payment intent: {0}")]
    InvalidIntent(String),
    #[error("Charge creation failed: {0}")]
    ChargeCreation(String),
    #[error("ROUTE_NOT_FOUND")]
    RouteNotFound,
    #[error("Route unavailable: {0}")]
    RouteUnavailable(String),
    #[error("Cross-chain route not prepared")]
    RouteNotPrepared,
    #[error("Route expired at {expiry}")]
    RouteExpired { expiry: DateTime<Utc> },
    #[error("Failed to switch network from chain {from} to chain {to}: {reason}")]
    NetworkSwitch {
        from: String,
        to: String,
        reason: String,
    },
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: u128 },
    #[error("Transaction {step} of {total} failed: {source}")]
    TransactionFailed {
        step: usize,
        total: usize,
        confirmed: Vec<String>,
        #[source]
        source: WalletError,
    },
    #[error("Payment recording failed for transaction {tx_hash}: {reason}")]
    PaymentRecording { tx_hash: String, reason: String },
    #[error("{0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl FlowError {
    /// Stable machine-readable code, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::WalletNotConnected => "WALLET_NOT_CONNECTED",
            FlowError::AlreadyProcessing => "ALREADY_PROCESSING",
            FlowError::InvalidIntent(_) | FlowError::Amount(_) => "INVALID_INTENT",
            FlowError::ChargeCreation(_) => "CHARGE_CREATION_ERROR",
            FlowError::RouteNotFound => ROUTE_NOT_FOUND_ERROR,
            FlowError::RouteUnavailable(_) => "ROUTE_UNAVAILABLE",
            FlowError::RouteNotPrepared => "ROUTE_NOT_PREPARED",
            FlowError::RouteExpired { .. } => "ROUTE_EXPIRED",
            FlowError::NetworkSwitch { .. } => "NETWORK_SWITCH_ERROR",
            FlowError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            FlowError::TransactionFailed { .. } => "TRANSACTION_FAILED",
            FlowError::PaymentRecording { .. } => "PAYMENT_RECORDING_ERROR",
            FlowError::Unsupported(_) => "UNSUPPORTED",
            FlowError::Api(_) => "API_ERROR",
            FlowError::Wallet(_) => "WALLET_ERROR",
        }
    }

    /// Returns true once value may already have moved on-chain.
    pub fn after_execution(&self) -> bool {
        match self {
            FlowError::PaymentRecording { .. } => true,
            FlowError::TransactionFailed { confirmed, .. } => !confirmed.is_empty(),
            _ => false,
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::WalletNotConnected => "Please make sure your wallet is connected.".to_string(),
            FlowError::AlreadyProcessing => "A payment is already in progress.".to_string(),
            FlowError::InvalidIntent(reason) => reason.clone(),
            FlowError::Amount(err) => err.to_string(),
            FlowError::RouteNotFound | FlowError::RouteUnavailable(_) => {
                "No route is available for this transfer. Please try a different token or network."
                    .to_string()
            }
            FlowError::RouteNotPrepared | FlowError::RouteExpired { .. } => {
                "Route has expired. Please refresh and try again.".to_string()
            }
            FlowError::NetworkSwitch { .. } => {
                "Please switch your wallet to the required network and try again.".to_string()
            }
            FlowError::InsufficientBalance { .. } => "You don't have enough funds.".to_string(),
            FlowError::TransactionFailed {
                step,
                total,
                confirmed,
                source,
            } => {
                let base = wallet_error_message(&source.to_string());
                if confirmed.is_empty() {
                    base.to_string()
                } else {
                    format!(
                        "{} Step {} of {} failed after {} already confirmed ({}). Please contact support.",
                        base,
                        step,
                        total,
                        confirmed.len(),
                        confirmed.join(", ")
                    )
                }
            }
            FlowError::PaymentRecording { .. } => SUPPORT_MESSAGE.to_string(),
            FlowError::Unsupported(reason) => reason.to_string(),
            FlowError::Api(ApiError::Request { .. }) => {
                "A network error occured. Please refresh and try again.".to_string()
            }
            _ => wallet_error_message(&self.to_string()).to_string(),
        }
    }
}

/// Maps a raw wallet/SDK error string to a user-facing message.
///
/// # Arguments
///
/// * `raw` - Error text as reported by the wallet or node
///
/// # Returns
///
/// * `&'static str` - Matching user message, or a generic fallback
pub fn wallet_error_message(raw: &str) -> &'static str {
    let lower = raw.to_lowercase();
    if lower.contains("insufficient funds") {
        "You don't have enough funds."
    } else if lower.contains("user rejected transaction") {
        "Please confirm the transaction in your wallet."
    } else if lower.contains("user rejected the request") {
        "Please confirm the request in your wallet."
    } else if lower.contains("network_error") {
        "A network error occured. Please refresh and try again."
    } else if lower.contains("nonce_expired") || lower.contains("nonce expired") {
        "Nonce expired, please try again."
    } else if lower.contains("failed to get wallet client") {
        "Please make sure your wallet is connected."
    } else if lower.contains("gas required exceeds allowance") {
        "Gas required exceeds balance. Please confirm you have enough funds."
    } else {
        DEFAULT_USER_MESSAGE
    }
}

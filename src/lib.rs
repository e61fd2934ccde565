//! Payment settlement sequencer
//!
//! Creates charges, resolves cross-chain routes, executes transactions through
//! a wallet, polls cross-chain settlement and records payments.

pub mod amount;
pub mod clients;
pub mod clock;
pub mod config;
pub mod error;
pub mod service;
pub mod store;
pub mod types;

// Re-export public types for convenience
pub use amount::{format_units, parse_units};
pub use clock::{Clock, SystemClock};
pub use config::SequencerConfig;
pub use error::{ApiError, FlowError, WalletError, ROUTE_NOT_FOUND_ERROR};
pub use service::{
    ClaimOutcome, LinkClaimer, PaymentSequencer, SequencerServices, SequencerSettings,
    SettlementPoller,
};
pub use store::{PendingClaim, PendingClaimStore};
pub use types::{
    Charge, ChargeStatus, FlowResult, FlowStage, Payment, PaymentIntent, Route, RouteType,
    SettlementState, TokenLocation, TransactionReceipt, TransactionType,
};

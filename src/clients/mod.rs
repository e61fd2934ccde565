//! External service clients
//!
//! Async traits for the services a payment flow talks to, plus their HTTP
//! (charges, routing, prices, status, claims) and JSON-RPC (wallet) implementations.

pub mod charges;
pub mod claims;
pub mod evm_wallet;
pub mod prices;
pub mod routing;
pub mod status;
pub mod wallet;

use anyhow::Context;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::ApiError;

pub use charges::{ChargeService, HttpChargeClient};
pub use claims::{ClaimService, HttpClaimClient};
pub use evm_wallet::JsonRpcWallet;
pub use prices::{HttpPriceClient, PriceService, TokenPrice};
pub use routing::{HttpRoutingClient, RouteAmount, RouteEndpoint, RouteRequest, RoutingService};
pub use status::{HttpStatusClient, StatusResponse, StatusService, TransactionStatus};
pub use wallet::{Wallet, WalletKind};

/// Header carrying the routing/status integrator ID.
pub const INTEGRATOR_ID_HEADER: &str = "x-integrator-id";

/// Builds the shared async HTTP client.
pub(crate) fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .no_proxy() // Avoid macOS system-configuration issues in tests
        .build()
        .context("Failed to create HTTP client")
}

/// Decodes a JSON body, turning non-2xx responses into `ApiError::Status`.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    response.json::<T>().await.map_err(|e| ApiError::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

/// Wraps a transport failure with the endpoint it was sent to.
pub(crate) fn request_error(endpoint: &str) -> impl FnOnce(reqwest::Error) -> ApiError + '_ {
    move |source| ApiError::Request {
        endpoint: endpoint.to_string(),
        source,
    }
}

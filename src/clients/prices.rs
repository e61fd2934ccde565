//! Token Price Client
//!
//! Looks up USD prices of tokens from a Mobula-compatible market data API
//! (`GET /api/1/market/data?asset=&blockchain=`). Prices convert USD route
//! amounts into token base units and pick the destination-amount search
//! tolerance.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{decode_response, http_client, request_error};
use crate::amount::parse_units;
use crate::error::ApiError;
use crate::types::TokenLocation;

/// Address the price API uses for a chain's native token.
pub const NATIVE_PRICE_ADDRESS: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// USD price of one whole token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenPrice {
    pub price: f64,
    pub decimals: u8,
}

impl TokenPrice {
    /// USD value of `units` base units.
    pub fn usd_value(&self, units: u128) -> f64 {
        units as f64 / 10f64.powi(self.decimals as i32) * self.price
    }

    /// Base units worth `usd` dollars.
    ///
    /// # Arguments
    ///
    /// * `usd` - Positive decimal USD amount (e.g. "25.50")
    ///
    /// # Returns
    ///
    /// * `Ok(u128)` - Token amount in base units, rounded to the token's decimals
    /// * `Err(ApiError::InvalidAmount)` - Malformed amount or unusable price
    pub fn units_for_usd(&self, usd: &str) -> Result<u128, ApiError> {
        let dollars: f64 = usd
            .trim()
            .parse()
            .map_err(|_| ApiError::InvalidAmount(format!("invalid USD amount '{}'", usd)))?;
        if !dollars.is_finite() || dollars <= 0.0 {
            return Err(ApiError::InvalidAmount(format!("invalid USD amount '{}'", usd)));
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ApiError::InvalidAmount(format!("unusable token price {}", self.price)));
        }
        let tokens = format!("{:.*}", self.decimals as usize, dollars / self.price);
        parse_units(&tokens, self.decimals).map_err(|e| ApiError::InvalidAmount(e.to_string()))
    }
}

#[async_trait]
pub trait PriceService: Send + Sync + std::fmt::Debug {
    /// Current USD price and decimals of `token`.
    async fn token_price(&self, token: &TokenLocation) -> Result<TokenPrice, ApiError>;
}

// ============================================================================
// MOBULA WIRE FORMAT
// ============================================================================

#[derive(Debug, Deserialize)]
struct MarketDataResponse {
    data: MarketData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketData {
    price: Option<f64>,
    #[serde(default)]
    contracts: Vec<MarketContract>,
    #[serde(default)]
    decimals: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketContract {
    blockchain_id: String,
    decimals: u8,
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// HTTP client for the market data API.
#[derive(Debug, Clone)]
pub struct HttpPriceClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpPriceClient {
    /// Creates a new price client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Market data API base URL
    /// * `api_key` - Value of the `authorization` header
    /// * `timeout` - Per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl PriceService for HttpPriceClient {
    async fn token_price(&self, token: &TokenLocation) -> Result<TokenPrice, ApiError> {
        let endpoint = "GET /api/1/market/data";
        let asset = if token.is_native() {
            NATIVE_PRICE_ADDRESS
        } else {
            token.token_address.as_str()
        };

        let response = self
            .client
            .get(format!("{}/api/1/market/data", self.base_url))
            .query(&[("asset", asset), ("blockchain", token.chain_id.as_str())])
            .header("authorization", &self.api_key)
            .send()
            .await
            .map_err(request_error(endpoint))?;
        let body: MarketDataResponse = decode_response(endpoint, response).await?;

        let price = body
            .data
            .price
            .filter(|price| price.is_finite() && *price > 0.0)
            .ok_or_else(|| ApiError::MissingField {
                endpoint: endpoint.to_string(),
                field: "data.price".to_string(),
            })?;
        let decimals = body
            .data
            .contracts
            .iter()
            .find(|contract| contract.blockchain_id == token.chain_id)
            .map(|contract| contract.decimals)
            .or(body.data.decimals)
            .ok_or_else(|| ApiError::MissingField {
                endpoint: endpoint.to_string(),
                field: "data.contracts[].decimals".to_string(),
            })?;

        debug!("Price of {}: ${} ({} decimals)", token, price, decimals);
        Ok(TokenPrice { price, decimals })
    }
}

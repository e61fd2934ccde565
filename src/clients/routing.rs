//! Routing Service Client
//!
//! Fetches cross-chain/cross-token quotes from a Squid-compatible routing API.
//!
//! Flow:
//! 1. USD amounts are converted to token base units at the token's current price
//! 2. Source-amount requests are quoted directly
//! 3. Destination-amount requests search for the smallest source amount whose
//!    quoted output lands within a tolerance band of the target, the band
//!    chosen by the target's USD value
//! 4. The raw quote is reduced to a `Route` (type, transactions, fees, expiry)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::prices::PriceService;
use super::{decode_response, http_client, request_error, INTEGRATOR_ID_HEADER};
use crate::error::ApiError;
use crate::types::{Route, RouteTransaction, RouteType, TokenLocation};

// ============================================================================
// REQUEST STRUCTURES
// ============================================================================

/// One side of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEndpoint {
    pub address: String,
    pub token_address: String,
    pub chain_id: String,
}

impl RouteEndpoint {
    pub fn location(&self) -> TokenLocation {
        TokenLocation::new(self.chain_id.clone(), self.token_address.clone())
    }
}

/// How much to move, fixed on either side of the route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteAmount {
    /// Exact source amount in base units
    FromAmount(u128),
    /// Target destination amount in base units
    ToAmount(u128),
    /// Source amount worth this many USD, as a decimal string
    FromUsd(String),
    /// Destination amount worth this many USD, as a decimal string
    ToUsd(String),
}

/// A route query. Its serialized form is also the route cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub from: RouteEndpoint,
    pub to: RouteEndpoint,
    pub amount: RouteAmount,
}

impl RouteRequest {
    pub fn cache_key(&self) -> String {
        // Derived Serialize on plain strings and numbers cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

#[async_trait]
pub trait RoutingService: Send + Sync + std::fmt::Debug {
    /// Quotes a route for the request.
    async fn get_route(&self, request: &RouteRequest) -> Result<Route, ApiError>;
}

// ============================================================================
// SQUID WIRE FORMAT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SquidRouteParams {
    from_chain: String,
    from_token: String,
    from_amount: String,
    from_address: String,
    to_address: String,
    to_chain: String,
    to_token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SquidRouteResponse {
    route: SquidRoute,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquidRoute {
    estimate: SquidEstimate,
    transaction_request: SquidTransactionRequest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquidEstimate {
    #[serde(default)]
    actions: Vec<SquidAction>,
    to_amount: String,
    #[serde(default)]
    to_amount_min: Option<String>,
    #[serde(default)]
    fee_costs: Vec<SquidCost>,
    #[serde(default)]
    gas_costs: Vec<SquidCost>,
}

#[derive(Debug, Clone, Deserialize)]
struct SquidAction {
    #[serde(rename = "type")]
    action_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquidCost {
    #[serde(default)]
    amount_usd: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SquidTransactionRequest {
    target: String,
    data: String,
    value: String,
    /// Unix timestamp in seconds
    expiry: String,
}

/// A parsed quote plus its raw JSON.
struct Quote {
    parsed: SquidRouteResponse,
    raw: serde_json::Value,
}

impl Quote {
    fn to_amount(&self) -> Option<u128> {
        self.parsed.route.estimate.to_amount.parse().ok()
    }
}

// ============================================================================
// SOURCE AMOUNT SEARCH
// ============================================================================

/// Search band for a destination-amount request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchTolerance {
    /// Maximum accepted overshoot of the target, as a fraction
    pub max_overage: f64,
    /// Lower bound of the search range, in basis points of the target
    pub low_bps: u128,
    /// Upper bound of the search range, in basis points of the target
    pub high_bps: u128,
}

impl SearchTolerance {
    /// Tolerance tier for a target worth `usd_value` dollars.
    ///
    /// Small transfers tolerate a larger relative overshoot.
    pub fn for_usd_value(usd_value: f64) -> Self {
        if usd_value < 10.0 {
            Self {
                max_overage: 0.005,
                low_bps: 9925,
                high_bps: 10150,
            }
        } else if usd_value < 1000.0 {
            Self {
                max_overage: 0.003,
                low_bps: 9950,
                high_bps: 10090,
            }
        } else {
            Self {
                max_overage: 0.001,
                low_bps: 9950,
                high_bps: 10100,
            }
        }
    }

    fn bounds(&self, target: u128) -> (u128, u128) {
        (
            target.saturating_mul(self.low_bps) / 10_000,
            target.saturating_mul(self.high_bps) / 10_000,
        )
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// HTTP client for a Squid-compatible routing API (`POST /v2/route`).
#[derive(Debug, Clone)]
pub struct HttpRoutingClient {
    base_url: String,
    integrator_id: String,
    client: Client,
    /// Token prices for USD amounts and search tolerances
    prices: Arc<dyn PriceService>,
    /// Maximum quotes fetched while searching a source amount
    max_search_iterations: u32,
}

impl HttpRoutingClient {
    /// Creates a new routing client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Routing API base URL
    /// * `integrator_id` - Value of the `x-integrator-id` header
    /// * `prices` - Token price lookup
    /// * `timeout` - Per-request timeout
    /// * `max_search_iterations` - Quote budget for destination-amount searches
    ///
    /// # Returns
    ///
    /// * `Ok(HttpRoutingClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to build the HTTP client
    pub fn new(
        base_url: impl Into<String>,
        integrator_id: impl Into<String>,
        prices: Arc<dyn PriceService>,
        timeout: Duration,
        max_search_iterations: u32,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            integrator_id: integrator_id.into(),
            client: http_client(timeout)?,
            prices,
            max_search_iterations,
        })
    }

    fn params(&self, request: &RouteRequest, from_amount: u128) -> SquidRouteParams {
        SquidRouteParams {
            from_chain: request.from.chain_id.clone(),
            from_token: request.from.token_address.clone(),
            from_amount: from_amount.to_string(),
            from_address: request.from.address.clone(),
            to_address: request.to.address.clone(),
            to_chain: request.to.chain_id.clone(),
            to_token: request.to.token_address.clone(),
        }
    }

    /// Fetches one raw quote.
    async fn fetch_quote(&self, params: &SquidRouteParams) -> Result<Quote, ApiError> {
        let endpoint = "POST /v2/route";
        debug!(
            "Requesting route {}:{} -> {}:{} fromAmount={}",
            params.from_chain, params.from_token, params.to_chain, params.to_token, params.from_amount
        );

        let response = self
            .client
            .post(format!("{}/v2/route", self.base_url))
            .header(INTEGRATOR_ID_HEADER, &self.integrator_id)
            .json(params)
            .send()
            .await
            .map_err(request_error(endpoint))?;

        let raw: serde_json::Value = decode_response(endpoint, response).await?;
        let parsed: SquidRouteResponse =
            serde_json::from_value(raw.clone()).map_err(|e| ApiError::Decode {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Quote { parsed, raw })
    }

    /// Searches for the smallest source amount that delivers `target`.
    ///
    /// Each step quotes the midpoint of the current range. A quote within the
    /// tolerance is returned immediately; an overshooting quote is kept as the
    /// best candidate and lowers the upper bound; an undershooting or failed
    /// step raises the lower bound. Without any overshooting quote, a final
    /// quote at the upper bound is returned.
    async fn search_from_amount(
        &self,
        request: &RouteRequest,
        target: u128,
        usd_value: f64,
    ) -> Result<Quote, ApiError> {
        let tolerance = SearchTolerance::for_usd_value(usd_value);
        let (mut low, mut high) = tolerance.bounds(target);
        let mut best: Option<Quote> = None;
        let mut iterations = 0;

        while iterations < self.max_search_iterations && high > low {
            let mid = low + (high - low) / 2;
            iterations += 1;

            let quote = match self.fetch_quote(&self.params(request, mid)).await {
                Ok(quote) => quote,
                Err(e) => {
                    warn!("Route search quote at fromAmount={} failed: {}", mid, e);
                    low = mid + 1;
                    continue;
                }
            };

            let received = quote.to_amount().unwrap_or(0);
            if received >= target {
                let overage = (received - target) as f64 / target.max(1) as f64;
                if overage <= tolerance.max_overage {
                    info!(
                        "Route search converged after {} quotes: fromAmount={}, toAmount={}",
                        iterations, mid, received
                    );
                    return Ok(quote);
                }
                best = Some(quote);
                high = mid.saturating_sub(1);
            } else {
                low = mid + 1;
            }
        }

        match best {
            Some(quote) => Ok(quote),
            None => {
                info!("Route search exhausted, quoting upper bound fromAmount={}", high);
                self.fetch_quote(&self.params(request, high)).await
            }
        }
    }
}

#[async_trait]
impl RoutingService for HttpRoutingClient {
    async fn get_route(&self, request: &RouteRequest) -> Result<Route, ApiError> {
        let quote = match &request.amount {
            RouteAmount::FromAmount(amount) => self.fetch_quote(&self.params(request, *amount)).await?,
            RouteAmount::FromUsd(usd) => {
                let price = self.prices.token_price(&request.from.location()).await?;
                let amount = price.units_for_usd(usd)?;
                debug!("${} of {} is fromAmount={}", usd, request.from.location(), amount);
                self.fetch_quote(&self.params(request, amount)).await?
            }
            RouteAmount::ToAmount(amount) => {
                let price = self.prices.token_price(&request.to.location()).await?;
                self.search_from_amount(request, *amount, price.usd_value(*amount))
                    .await?
            }
            RouteAmount::ToUsd(usd) => {
                let price = self.prices.token_price(&request.to.location()).await?;
                let target = price.units_for_usd(usd)?;
                debug!("${} of {} is toAmount={}", usd, request.to.location(), target);
                self.search_from_amount(request, target, price.usd_value(target))
                    .await?
            }
        };
        parse_route(quote)
    }
}

/// Reduces a raw quote to a `Route`.
fn parse_route(quote: Quote) -> Result<Route, ApiError> {
    let endpoint = "POST /v2/route";
    let route = quote.parsed.route;

    let action = route.estimate.actions.first().ok_or_else(|| ApiError::MissingField {
        endpoint: endpoint.to_string(),
        field: "route.estimate.actions[0].type".to_string(),
    })?;
    let route_type = match action.action_type.as_str() {
        "rfq" => RouteType::Rfq,
        // Anything not quoted with a guaranteed rate carries slippage
        _ => RouteType::Swap,
    };

    let expiry = parse_expiry(&route.transaction_request.expiry).ok_or_else(|| ApiError::Decode {
        endpoint: endpoint.to_string(),
        reason: format!("invalid expiry '{}'", route.transaction_request.expiry),
    })?;

    let fee_costs_usd = route
        .estimate
        .fee_costs
        .iter()
        .chain(route.estimate.gas_costs.iter())
        .map(|cost| cost.amount_usd.parse::<f64>().unwrap_or(0.0))
        .sum();

    Ok(Route {
        route_type,
        transactions: vec![RouteTransaction {
            to: route.transaction_request.target,
            data: route.transaction_request.data,
            value: route.transaction_request.value,
        }],
        fee_costs_usd,
        expiry,
        to_amount_min: route.estimate.to_amount_min,
        raw_response: quote.raw,
    })
}

/// Parses a unix-seconds expiry.
fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    let secs = value.trim().parse::<i64>().ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0)
}

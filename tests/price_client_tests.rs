//! Unit tests for the token price HTTP client

#[path = "helpers.rs"]
mod test_helpers;

use payment_sequencer::clients::prices::NATIVE_PRICE_ADDRESS;
use payment_sequencer::clients::{HttpPriceClient, PriceService};
use payment_sequencer::types::{TokenLocation, NATIVE_TOKEN_ADDRESS};
use payment_sequencer::ApiError;
use serde_json::{json, Value};
use std::time::Duration;
use test_helpers::*;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);
const API_KEY: &str = "mobula-test";

/// Market data response listing the token on Arbitrum and Optimism
fn market_data_body(price: f64) -> Value {
    json!({
        "data": {
            "price": price,
            "name": "USD Coin",
            "symbol": "USDC",
            "contracts": [
                { "address": DUMMY_USDC_ARB, "blockchain": "Arbitrum", "blockchainId": DUMMY_CHAIN_ARB, "decimals": 6 },
                { "address": DUMMY_USDC_OP, "blockchain": "Optimistic", "blockchainId": DUMMY_CHAIN_OP, "decimals": 6 }
            ]
        }
    })
}

fn client(server: &MockServer) -> HttpPriceClient {
    HttpPriceClient::new(server.uri(), API_KEY, TIMEOUT).unwrap()
}

/// What is tested: token_price() queries by asset and chain and reads the chain's decimals
/// Why: Decimals differ per deployment and drive every USD conversion
#[tokio::test]
async fn test_token_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/1/market/data"))
        .and(query_param("asset", DUMMY_USDC_ARB))
        .and(query_param("blockchain", DUMMY_CHAIN_ARB))
        .and(header("authorization", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(market_data_body(0.9998)))
        .expect(1)
        .mount(&server)
        .await;

    let price = client(&server).token_price(&usdc_arb()).await.unwrap();
    assert!((price.price - 0.9998).abs() < 1e-9);
    assert_eq!(price.decimals, 6);
}

/// What is tested: native tokens are priced under the 0xeee... placeholder address
/// Why: The market data API does not know the zero address
#[tokio::test]
async fn test_native_token_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/1/market/data"))
        .and(query_param("asset", NATIVE_PRICE_ADDRESS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "price": 3000.0, "contracts": [], "decimals": 18 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let native = TokenLocation::new(DUMMY_CHAIN_ARB, NATIVE_TOKEN_ADDRESS);
    let price = client(&server).token_price(&native).await.unwrap();
    assert_eq!(price.decimals, 18);
    assert!((price.price - 3000.0).abs() < 1e-9);
}

/// What is tested: a response without decimals for the chain is rejected
/// Why: Guessing decimals would misprice the amount by orders of magnitude
#[tokio::test]
async fn test_missing_decimals_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/1/market/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(market_data_body(1.0)))
        .mount(&server)
        .await;

    let unlisted = TokenLocation::new("8453", DUMMY_USDC_ARB);
    let err = client(&server).token_price(&unlisted).await.unwrap_err();
    assert!(matches!(err, ApiError::MissingField { .. }));
}

/// What is tested: a non-2xx response surfaces as ApiError::Status
/// Why: Unknown assets and bad keys must fail the lookup, not price at zero
#[tokio::test]
async fn test_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/1/market/data"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = client(&server).token_price(&usdc_op()).await.unwrap_err();
    match err {
        ApiError::Status { status, .. } => assert_eq!(status, 401),
        other => panic!("unexpected error: {:?}", other),
    }
}

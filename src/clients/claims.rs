//! Link Claim Client
//!
//! Claims a payment link to a recipient, either on the link's own chain or
//! bridged to another chain/token.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{decode_response, http_client, request_error};
use crate::error::ApiError;
use crate::types::TokenLocation;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimRequest<'a> {
    link: &'a str,
    recipient_address: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimXChainRequest<'a> {
    link: &'a str,
    recipient_address: &'a str,
    destination_chain_id: &'a str,
    destination_token: &'a str,
}

/// Claim response. Different API versions name the hash differently.
#[derive(Debug, Clone, Default, Deserialize)]
struct ClaimResponse {
    #[serde(default, rename = "transactionHash")]
    transaction_hash: Option<String>,
    #[serde(default, rename = "txHash")]
    tx_hash: Option<String>,
    #[serde(default)]
    hash: Option<String>,
}

impl ClaimResponse {
    fn into_hash(self) -> Option<String> {
        self.transaction_hash
            .or(self.tx_hash)
            .or(self.hash)
            .filter(|h| !h.is_empty())
    }
}

#[async_trait]
pub trait ClaimService: Send + Sync + std::fmt::Debug {
    /// Claims `link` to `recipient` on the link's chain. Returns the claim hash.
    async fn claim_link(&self, link: &str, recipient: &str) -> Result<String, ApiError>;

    /// Claims `link` to `recipient`, bridging to `destination`. Returns the
    /// source-chain hash.
    async fn claim_link_xchain(
        &self,
        link: &str,
        recipient: &str,
        destination: &TokenLocation,
    ) -> Result<String, ApiError>;
}

/// HTTP client for the claim endpoints (`/claim-v3`, `/claim-x-chain`).
#[derive(Debug, Clone)]
pub struct HttpClaimClient {
    base_url: String,
    client: Client,
}

impl HttpClaimClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    async fn post_claim<B: Serialize + Sync>(
        &self,
        endpoint: &str,
        path: &str,
        body: &B,
    ) -> Result<String, ApiError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(request_error(endpoint))?;
        let claim: ClaimResponse = decode_response(endpoint, response).await?;
        claim.into_hash().ok_or_else(|| ApiError::MissingField {
            endpoint: endpoint.to_string(),
            field: "txHash".to_string(),
        })
    }
}

#[async_trait]
impl ClaimService for HttpClaimClient {
    async fn claim_link(&self, link: &str, recipient: &str) -> Result<String, ApiError> {
        let body = ClaimRequest {
            link,
            recipient_address: recipient,
        };
        self.post_claim("POST /claim-v3", "/claim-v3", &body).await
    }

    async fn claim_link_xchain(
        &self,
        link: &str,
        recipient: &str,
        destination: &TokenLocation,
    ) -> Result<String, ApiError> {
        let body = ClaimXChainRequest {
            link,
            recipient_address: recipient,
            destination_chain_id: &destination.chain_id,
            destination_token: &destination.token_address,
        };
        self.post_claim("POST /claim-x-chain", "/claim-x-chain", &body).await
    }
}

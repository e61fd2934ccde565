//! Cross-chain Status Client
//!
//! Queries the routing provider for the destination-side state of a bridged
//! transaction (`GET /v2/status?transactionId=`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{decode_response, http_client, request_error, INTEGRATOR_ID_HEADER};
use crate::error::ApiError;

/// Settlement status reported for a source transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Success,
    PartialSuccess,
    NeedsGas,
    Ongoing,
    NotFound,
    Unknown,
}

impl TransactionStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "success" => TransactionStatus::Success,
            "partial_success" => TransactionStatus::PartialSuccess,
            "needs_gas" => TransactionStatus::NeedsGas,
            "ongoing" => TransactionStatus::Ongoing,
            "not_found" => TransactionStatus::NotFound,
            _ => TransactionStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationChainData {
    /// Chain ID, reported as either a string or a number
    #[serde(default)]
    pub chain_id: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationStatus {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub transaction_url: Option<String>,
    #[serde(default)]
    pub chain_data: Option<DestinationChainData>,
}

/// Response of the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub squid_transaction_status: String,
    #[serde(default)]
    pub to_chain: Option<DestinationStatus>,
}

impl StatusResponse {
    pub fn status(&self) -> TransactionStatus {
        TransactionStatus::parse(&self.squid_transaction_status)
    }

    /// Destination transaction hash, only once settlement succeeded.
    pub fn destination_tx_hash(&self) -> Option<&str> {
        if self.status() != TransactionStatus::Success {
            return None;
        }
        self.to_chain
            .as_ref()
            .and_then(|c| c.transaction_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[async_trait]
pub trait StatusService: Send + Sync + std::fmt::Debug {
    async fn check_transaction_status(&self, source_tx_hash: &str) -> Result<StatusResponse, ApiError>;
}

/// HTTP client for the status endpoint.
#[derive(Debug, Clone)]
pub struct HttpStatusClient {
    base_url: String,
    integrator_id: String,
    client: Client,
}

impl HttpStatusClient {
    pub fn new(
        base_url: impl Into<String>,
        integrator_id: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            integrator_id: integrator_id.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl StatusService for HttpStatusClient {
    async fn check_transaction_status(&self, source_tx_hash: &str) -> Result<StatusResponse, ApiError> {
        let endpoint = "GET /v2/status";
        let response = self
            .client
            .get(format!("{}/v2/status", self.base_url))
            .query(&[("transactionId", source_tx_hash)])
            .header(INTEGRATOR_ID_HEADER, &self.integrator_id)
            .send()
            .await
            .map_err(request_error(endpoint))?;
        decode_response(endpoint, response).await
    }
}

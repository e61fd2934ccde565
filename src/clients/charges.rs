//! Charge API Client
//!
//! Creates charges, reads them back, and records payments against them.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{decode_response, http_client, request_error};
use crate::error::ApiError;
use crate::types::{Charge, Payment, PaymentIntent, TransactionType};

// ============================================================================
// REQUEST / RESPONSE STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Native,
    Erc20,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPrice {
    pub amount: String,
    pub currency: String,
}

/// Token terms of the charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestProps {
    pub chain_id: String,
    pub token_amount: String,
    pub token_address: String,
    pub token_type: TokenType,
    pub token_symbol: String,
    pub token_decimals: u8,
    pub recipient_address: String,
}

/// Body of `POST /charges`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChargeRequest {
    pub pricing_type: String,
    pub local_price: LocalPrice,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub request_props: RequestProps,
    pub transaction_type: TransactionType,
    /// Base64-encoded file contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Free-text message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl CreateChargeRequest {
    /// Builds the charge payload for an intent.
    ///
    /// The charge carries the destination terms: where the funds must land.
    pub fn from_intent(intent: &PaymentIntent, base_url: &str) -> Self {
        let token_type = if intent.destination.is_native() {
            TokenType::Native
        } else {
            TokenType::Erc20
        };

        let attachment = intent.attachment.as_ref();
        let file = attachment.and_then(|a| a.file.as_ref());

        Self {
            pricing_type: "fixed_price".to_string(),
            local_price: LocalPrice {
                amount: intent.amount.clone(),
                currency: intent.currency.clone(),
            },
            base_url: base_url.to_string(),
            request_id: intent.request_id.clone(),
            request_props: RequestProps {
                chain_id: intent.destination.chain_id.clone(),
                token_amount: intent.amount.clone(),
                token_address: intent.destination.token_address.clone(),
                token_type,
                token_symbol: intent.token_symbol.clone(),
                token_decimals: intent.token_decimals,
                recipient_address: intent.recipient_address.clone(),
            },
            transaction_type: intent.transaction_type,
            attachment: file.map(|f| BASE64.encode(&f.bytes)),
            filename: file.map(|f| f.filename.clone()),
            mime_type: file.map(|f| f.mime_type.clone()),
            reference: attachment.and_then(|a| a.message.clone()),
        }
    }
}

/// Partial response of `POST /charges`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargeCreated {
    #[serde(default)]
    pub data: Option<ChargeCreatedData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargeCreatedData {
    #[serde(default)]
    pub id: Option<String>,
}

impl ChargeCreated {
    /// Charge ID, if the response carried a non-empty one.
    pub fn id(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Body of `POST /charges/{id}/payments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub charge_id: String,
    pub chain_id: String,
    pub hash: String,
    pub token_address: String,
    pub payer_address: String,
}

// ============================================================================
// SERVICE TRAIT
// ============================================================================

#[async_trait]
pub trait ChargeService: Send + Sync + std::fmt::Debug {
    /// Creates a charge. The response only carries the new ID.
    async fn create(&self, request: &CreateChargeRequest) -> Result<ChargeCreated, ApiError>;

    /// Fetches the full charge record.
    async fn get(&self, charge_id: &str) -> Result<Charge, ApiError>;

    /// Records a payment against a charge.
    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<Payment, ApiError>;
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// HTTP client for the charge API.
#[derive(Debug, Clone)]
pub struct HttpChargeClient {
    /// Base URL of the charge API, e.g. "https://api.peanut.me"
    base_url: String,
    client: Client,
}

impl HttpChargeClient {
    /// Creates a new charge API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the charge API
    /// * `timeout` - Per-request timeout
    ///
    /// # Returns
    ///
    /// * `Ok(HttpChargeClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to build the HTTP client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl ChargeService for HttpChargeClient {
    async fn create(&self, request: &CreateChargeRequest) -> Result<ChargeCreated, ApiError> {
        let endpoint = "POST /charges";
        let response = self
            .client
            .post(format!("{}/charges", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(request_error(endpoint))?;
        decode_response(endpoint, response).await
    }

    async fn get(&self, charge_id: &str) -> Result<Charge, ApiError> {
        let endpoint = "GET /charges/:id";
        let response = self
            .client
            .get(format!("{}/charges/{}", self.base_url, charge_id))
            .send()
            .await
            .map_err(request_error(endpoint))?;
        decode_response(endpoint, response).await
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<Payment, ApiError> {
        let endpoint = "POST /charges/:id/payments";
        let response = self
            .client
            .post(format!("{}/charges/{}/payments", self.base_url, request.charge_id))
            .json(request)
            .send()
            .await
            .map_err(request_error(endpoint))?;
        decode_response(endpoint, response).await
    }
}

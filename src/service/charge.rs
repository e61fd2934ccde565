//! Charge Creator
//!
//! Turns a payment intent into a persisted charge.
//!
//! Flow:
//! 1. **Create**: `POST /charges` with the intent's destination terms
//! 2. **Re-fetch**: the creation response is partial, so the full charge is read back by ID

use std::sync::Arc;
use tracing::{error, info};

use crate::clients::charges::{ChargeService, CreateChargeRequest};
use crate::error::FlowError;
use crate::types::{Charge, PaymentIntent};

/// Creates charges and reads them back in full.
#[derive(Debug, Clone)]
pub struct ChargeCreator {
    charges: Arc<dyn ChargeService>,
    /// App URL stored on each charge
    base_url: String,
}

impl ChargeCreator {
    pub fn new(charges: Arc<dyn ChargeService>, base_url: impl Into<String>) -> Self {
        Self {
            charges,
            base_url: base_url.into(),
        }
    }

    /// Creates one charge for `intent` and returns the full record.
    ///
    /// Every call creates a new server-side charge; callers must not call this
    /// twice for the same attempt.
    ///
    /// # Returns
    ///
    /// * `Ok(Charge)` - Charge created and re-fetched
    /// * `Err(FlowError::ChargeCreation)` - Creation failed, returned no ID, or the re-fetch failed
    pub async fn create(&self, intent: &PaymentIntent) -> Result<Charge, FlowError> {
        let request = CreateChargeRequest::from_intent(intent, &self.base_url);

        let created = self.charges.create(&request).await.map_err(|e| {
            error!("Failed to create charge: {}", e);
            FlowError::ChargeCreation(e.to_string())
        })?;

        let charge_id = created.id().ok_or_else(|| {
            error!("Charge creation response carried no ID");
            FlowError::ChargeCreation("Charge created but UUID is missing".to_string())
        })?;

        let charge = self.fetch(charge_id).await?;
        info!(
            "Created charge {} for {} {} on chain {}",
            charge.uuid, charge.token_amount, charge.token_symbol, charge.chain_id
        );
        Ok(charge)
    }

    /// Reads an existing charge.
    pub async fn fetch(&self, charge_id: &str) -> Result<Charge, FlowError> {
        self.charges.get(charge_id).await.map_err(|e| {
            error!("Failed to fetch charge {}: {}", charge_id, e);
            FlowError::ChargeCreation(format!("Failed to fetch charge {}: {}", charge_id, e))
        })
    }
}

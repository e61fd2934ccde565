//! Payment Recorder
//!
//! Records the final transaction hash against its charge. Called exactly once
//! per executed intent and never retried: by the time it runs, value has
//! already moved on-chain.

use std::sync::Arc;
use tracing::{error, info};

use crate::clients::charges::{ChargeService, CreatePaymentRequest};
use crate::error::FlowError;
use crate::types::Payment;

#[derive(Debug, Clone)]
pub struct PaymentRecorder {
    charges: Arc<dyn ChargeService>,
}

impl PaymentRecorder {
    pub fn new(charges: Arc<dyn ChargeService>) -> Self {
        Self { charges }
    }

    /// Records a payment for `charge_id`.
    ///
    /// # Arguments
    ///
    /// * `charge_id` - Charge UUID
    /// * `chain_id` - Chain the payment transaction executed on
    /// * `hash` - Transaction hash
    /// * `token_address` - Token the payer spent
    /// * `payer_address` - Payer wallet address
    ///
    /// # Returns
    ///
    /// * `Ok(Payment)` - Payment recorded
    /// * `Err(FlowError::PaymentRecording)` - The API call failed; funds have moved regardless
    pub async fn record(
        &self,
        charge_id: &str,
        chain_id: &str,
        hash: &str,
        token_address: &str,
        payer_address: &str,
    ) -> Result<Payment, FlowError> {
        let request = CreatePaymentRequest {
            charge_id: charge_id.to_string(),
            chain_id: chain_id.to_string(),
            hash: hash.to_string(),
            token_address: token_address.to_string(),
            payer_address: payer_address.to_string(),
        };

        match self.charges.create_payment(&request).await {
            Ok(payment) => {
                info!("Recorded payment for charge {}: tx_hash={}", charge_id, hash);
                Ok(payment)
            }
            Err(e) => {
                error!(
                    "Failed to record payment for charge {} after on-chain execution (tx_hash={}): {}",
                    charge_id, hash, e
                );
                Err(FlowError::PaymentRecording {
                    tx_hash: hash.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

//! Link Claimer
//!
//! Cashes out a payment link to a recipient address.
//!
//! Flow:
//! 1. **Save**: the link is saved to the pending-claim store so it can be recovered
//! 2. **Claim**: same-chain claim, or cross-chain claim bridging to the destination token
//! 3. **Settle**: cross-chain claims wait for the destination transaction
//! 4. **Forget**: the saved link is removed once the claim went through
//!
//! A failed claim keeps the saved link; the user can reclaim it later.

use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::claims::ClaimService;
use crate::clock::Clock;
use crate::error::FlowError;
use crate::service::poller::SettlementPoller;
use crate::store::PendingClaimStore;
use crate::types::{SettlementState, TokenLocation};

/// Result of a claimed link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub source_tx_hash: String,
    /// Destination hash; equals the source hash for same-chain claims and
    /// for timed-out settlement
    pub destination_tx_hash: String,
    /// Settlement state, for cross-chain claims only
    pub settlement: Option<SettlementState>,
}

#[derive(Debug, Clone)]
pub struct LinkClaimer {
    claims: Arc<dyn ClaimService>,
    poller: SettlementPoller,
    store: Option<Arc<PendingClaimStore>>,
    clock: Arc<dyn Clock>,
}

impl LinkClaimer {
    pub fn new(claims: Arc<dyn ClaimService>, poller: SettlementPoller, clock: Arc<dyn Clock>) -> Self {
        Self {
            claims,
            poller,
            store: None,
            clock,
        }
    }

    /// Saves links to `store` while their claim is in flight.
    pub fn with_store(mut self, store: Arc<PendingClaimStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Claims `link` to `recipient`.
    ///
    /// # Arguments
    ///
    /// * `link` - Payment link
    /// * `recipient` - Address receiving the funds
    /// * `link_chain_id` - Chain the link's deposit lives on
    /// * `destination` - Token/chain to bridge to; `None` claims the deposit as is
    ///
    /// # Returns
    ///
    /// * `Ok(ClaimOutcome)` - Claim submitted (and settled, or timed out, when cross-chain)
    /// * `Err(FlowError)` - Claim request failed
    pub async fn claim(
        &self,
        link: &str,
        recipient: &str,
        link_chain_id: &str,
        destination: Option<&TokenLocation>,
    ) -> Result<ClaimOutcome, FlowError> {
        let saved_key = match &self.store {
            Some(store) => match store.save(link, self.clock.now()).await {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Could not save link before claiming: {}", e);
                    None
                }
            },
            None => None,
        };

        let outcome = match destination {
            Some(destination) => {
                let source_tx_hash = self.claims.claim_link_xchain(link, recipient, destination).await?;
                info!(
                    "Submitted cross-chain claim to {} on chain {}: {}",
                    recipient, destination.chain_id, source_tx_hash
                );
                if destination.chain_id == link_chain_id {
                    // Same-chain swap is atomic
                    ClaimOutcome {
                        destination_tx_hash: source_tx_hash.clone(),
                        source_tx_hash,
                        settlement: None,
                    }
                } else {
                    let settled = self.poller.wait_for_settlement(&source_tx_hash).await;
                    ClaimOutcome {
                        source_tx_hash: settled.source_tx_hash,
                        destination_tx_hash: settled.destination_tx_hash,
                        settlement: Some(settled.state),
                    }
                }
            }
            None => {
                let tx_hash = self.claims.claim_link(link, recipient).await?;
                info!("Claimed link to {}: {}", recipient, tx_hash);
                ClaimOutcome {
                    destination_tx_hash: tx_hash.clone(),
                    source_tx_hash: tx_hash,
                    settlement: None,
                }
            }
        };

        if let (Some(store), Some(key)) = (&self.store, saved_key) {
            if let Err(e) = store.remove(&key).await {
                warn!("Could not remove saved link {}: {}", key, e);
            }
        }
        Ok(outcome)
    }
}

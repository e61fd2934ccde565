//! Settlement Poller
//!
//! Waits for the destination side of a cross-chain transfer.
//!
//! The poller asks the status service about the source transaction on a fixed
//! interval, with a fixed attempt budget. Poll errors are logged and count as
//! a used attempt. When the budget runs out the source hash is reported as
//! the destination hash and the outcome is marked `TimedOut`; consumers must
//! not treat the two hashes as equivalent in that case.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clients::status::StatusService;
use crate::clock::Clock;
use crate::types::SettlementState;

/// Result of polling one source transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub state: SettlementState,
    pub source_tx_hash: String,
    /// Destination hash, or the source hash when `state` is `TimedOut`
    pub destination_tx_hash: String,
    /// Status checks made
    pub attempts: u32,
}

/// Bounded-retry settlement poller.
#[derive(Debug, Clone)]
pub struct SettlementPoller {
    status: Arc<dyn StatusService>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    max_attempts: u32,
}

impl SettlementPoller {
    /// Default spacing between status checks.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2000);
    /// Default attempt budget.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;

    pub fn new(
        status: Arc<dyn StatusService>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            status,
            clock,
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Polls until `source_tx_hash` settles or the attempt budget is spent.
    ///
    /// Sleeps between attempts only, never after the last one.
    ///
    /// # Returns
    ///
    /// * `SettlementOutcome` - `Resolved` with the destination hash, or `TimedOut`
    ///   with the source hash standing in for it
    pub async fn wait_for_settlement(&self, source_tx_hash: &str) -> SettlementOutcome {
        let mut attempts = 0;

        while attempts < self.max_attempts {
            attempts += 1;
            match self.status.check_transaction_status(source_tx_hash).await {
                Ok(status) => {
                    if let Some(destination) = status.destination_tx_hash() {
                        info!(
                            "Cross-chain transfer {} settled on destination as {} after {} attempt(s)",
                            source_tx_hash, destination, attempts
                        );
                        return SettlementOutcome {
                            state: SettlementState::Resolved,
                            source_tx_hash: source_tx_hash.to_string(),
                            destination_tx_hash: destination.to_string(),
                            attempts,
                        };
                    }
                    debug!(
                        "Transfer {} status '{}' (attempt {}/{})",
                        source_tx_hash, status.squid_transaction_status, attempts, self.max_attempts
                    );
                }
                Err(e) => {
                    warn!(
                        "Error checking transaction status for {} (attempt {}/{}): {}",
                        source_tx_hash, attempts, self.max_attempts, e
                    );
                }
            }

            if attempts < self.max_attempts {
                self.clock.sleep(self.interval).await;
            }
        }

        warn!(
            "Transaction status check timed out after {} attempts, using source hash {} as destination hash",
            attempts, source_tx_hash
        );
        SettlementOutcome {
            state: SettlementState::TimedOut,
            source_tx_hash: source_tx_hash.to_string(),
            destination_tx_hash: source_tx_hash.to_string(),
            attempts,
        }
    }
}

//! Payment Sequencer
//!
//! Orchestrates one payment attempt at a time.
//!
//! Flow:
//! 1. **Charge**: create the charge (or fetch an existing one for request payments)
//! 2. **Route**: resolve a route when source and destination assets differ
//! 3. **Execute**: submit the route's transactions, or a plain transfer, through the wallet
//! 4. **Settle**: poll cross-chain settlement status (cross-chain routes only)
//! 5. **Record**: record the payment against the charge
//!
//! Every public flow resolves to a `FlowResult`; errors never escape as panics.
//! A second call while a flow is running fails fast with `AlreadyProcessing`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use crate::amount::parse_units;
use crate::clients::charges::ChargeService;
use crate::clients::routing::{RouteAmount, RouteEndpoint, RouteRequest, RoutingService};
use crate::clients::status::StatusService;
use crate::clients::wallet::{Wallet, WalletKind};
use crate::clock::Clock;
use crate::config::SequencerConfig;
use crate::error::FlowError;
use crate::service::charge::ChargeCreator;
use crate::service::executor::TransactionExecutor;
use crate::service::poller::SettlementPoller;
use crate::service::recorder::PaymentRecorder;
use crate::service::route::{needs_route, RoutePolicy, RouteResolver};
use crate::types::{Charge, FlowResult, FlowStage, PaymentIntent, Route, TokenLocation};

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// External collaborators of a sequencer.
#[derive(Debug, Clone)]
pub struct SequencerServices {
    pub charges: Arc<dyn ChargeService>,
    pub routing: Arc<dyn RoutingService>,
    pub status: Arc<dyn StatusService>,
    pub wallet: Arc<dyn Wallet>,
    pub clock: Arc<dyn Clock>,
}

/// Tunables of a sequencer.
#[derive(Debug, Clone)]
pub struct SequencerSettings {
    /// App URL stored on charges
    pub base_url: String,
    /// Token the wallet pays from (custodial flows)
    pub wallet_token: TokenLocation,
    /// Decimals of `wallet_token`
    pub wallet_token_decimals: u8,
    pub route_freshness_secs: u64,
    pub route_cache_ttl_secs: u64,
    pub route_retries: u32,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub confirmations: u64,
}

impl SequencerSettings {
    pub fn from_config(config: &SequencerConfig) -> Self {
        Self {
            base_url: config.service.base_url.clone(),
            wallet_token: TokenLocation::new(
                config.wallet.chain_id.to_string(),
                config.wallet.token_address.clone(),
            ),
            wallet_token_decimals: config.wallet.token_decimals,
            route_freshness_secs: config.routing.route_freshness_secs,
            route_cache_ttl_secs: config.routing.route_cache_ttl_secs,
            route_retries: config.routing.max_retries,
            poll_interval: Duration::from_millis(config.status.poll_interval_ms),
            poll_max_attempts: config.status.max_attempts,
            confirmations: config.wallet.confirmations,
        }
    }
}

/// How the amount of a settlement is fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SettleAmount {
    /// Exact amount leaving the source, in source base units
    Source(u128),
    /// Exact amount arriving at the destination, in destination base units
    Destination(u128),
}

/// Everything needed after the charge exists.
#[derive(Debug, Clone)]
struct Settlement {
    source: TokenLocation,
    destination: TokenLocation,
    recipient: String,
    amount: SettleAmount,
    policy: RoutePolicy,
    /// Route quoted ahead of time; used instead of resolving a new one
    prepared_route: Option<Route>,
}

/// Route quoted ahead of a custodial withdrawal.
#[derive(Debug, Clone)]
struct PreparedWithdraw {
    request: RouteRequest,
}

/// Clears the processing flag and stage when a flow ends, however it ends.
struct ProcessingGuard<'a> {
    processing: &'a AtomicBool,
    stage: &'a watch::Sender<FlowStage>,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.stage.send_replace(FlowStage::Idle);
        self.processing.store(false, Ordering::SeqCst);
    }
}

/// Sequences charge creation, routing, execution, settlement and recording.
#[derive(Debug)]
pub struct PaymentSequencer {
    wallet: Arc<dyn Wallet>,
    clock: Arc<dyn Clock>,
    charges: ChargeCreator,
    routes: RouteResolver,
    executor: TransactionExecutor,
    poller: SettlementPoller,
    recorder: PaymentRecorder,
    settings: SequencerSettings,
    processing: AtomicBool,
    stage: Arc<watch::Sender<FlowStage>>,
    last_result: RwLock<Option<FlowResult>>,
    prepared: RwLock<Option<PreparedWithdraw>>,
}

impl PaymentSequencer {
    /// Creates a sequencer from its services and settings.
    pub fn new(services: SequencerServices, settings: SequencerSettings) -> Self {
        let (stage, _) = watch::channel(FlowStage::Idle);
        let stage = Arc::new(stage);

        Self {
            charges: ChargeCreator::new(services.charges.clone(), settings.base_url.clone()),
            routes: RouteResolver::new(
                services.routing,
                services.clock.clone(),
                settings.route_freshness_secs,
                settings.route_cache_ttl_secs,
                settings.route_retries,
            ),
            executor: TransactionExecutor::new(services.wallet.clone(), settings.confirmations)
                .with_stage(stage.clone()),
            poller: SettlementPoller::new(
                services.status,
                services.clock.clone(),
                settings.poll_interval,
                settings.poll_max_attempts,
            ),
            recorder: PaymentRecorder::new(services.charges),
            wallet: services.wallet,
            clock: services.clock,
            settings,
            processing: AtomicBool::new(false),
            stage,
            last_result: RwLock::new(None),
            prepared: RwLock::new(None),
        }
    }

    // ========================================================================
    // STATE
    // ========================================================================

    /// True while a flow is running.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Current stage.
    pub fn stage(&self) -> FlowStage {
        *self.stage.borrow()
    }

    /// Receiver notified on every stage change.
    pub fn subscribe(&self) -> watch::Receiver<FlowStage> {
        self.stage.subscribe()
    }

    /// Result of the most recent flow.
    pub async fn last_result(&self) -> Option<FlowResult> {
        self.last_result.read().await.clone()
    }

    /// Forgets the last result, the prepared route and all cached routes.
    pub async fn reset(&self) {
        *self.last_result.write().await = None;
        *self.prepared.write().await = None;
        self.routes.clear().await;
        if !self.is_processing() {
            self.stage.send_replace(FlowStage::Idle);
        }
    }

    fn begin(&self) -> Result<ProcessingGuard<'_>, FlowError> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Rejecting payment: another payment is already being processed");
            return Err(FlowError::AlreadyProcessing);
        }
        self.stage.send_replace(FlowStage::Preparing);
        Ok(ProcessingGuard {
            processing: &self.processing,
            stage: self.stage.as_ref(),
        })
    }

    async fn finish(&self, flow: &str, mut progress: FlowResult, outcome: Result<(), FlowError>) -> FlowResult {
        match outcome {
            Ok(()) => {
                progress.success = true;
                info!(
                    "{} completed: tx_hash={:?}, destination_tx_hash={:?}",
                    flow, progress.tx_hash, progress.destination_tx_hash
                );
            }
            Err(e) => {
                if e.after_execution() {
                    error!("{} failed after funds moved on-chain [{}]: {}", flow, e.code(), e);
                } else {
                    error!("{} failed [{}]: {}", flow, e.code(), e);
                }
                let failure = FlowResult::failure(&e);
                progress.success = false;
                progress.error = failure.error;
                progress.error_code = failure.error_code;
                progress.user_message = failure.user_message;
            }
        }
        *self.last_result.write().await = Some(progress.clone());
        progress
    }

    fn payer(&self) -> Result<String, FlowError> {
        self.wallet.address().ok_or(FlowError::WalletNotConnected)
    }

    // ========================================================================
    // FLOWS
    // ========================================================================

    /// Sends `intent.amount` of the source token to the recipient.
    ///
    /// The amount is fixed on the source side. Same-asset sends are a plain
    /// transfer; anything else goes through a route.
    pub async fn direct_send(&self, intent: PaymentIntent) -> FlowResult {
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => return FlowResult::failure(&e),
        };
        let mut progress = FlowResult::default();
        let outcome = self.direct_send_inner(&intent, &mut progress).await;
        self.finish("Direct send", progress, outcome).await
    }

    async fn direct_send_inner(&self, intent: &PaymentIntent, progress: &mut FlowResult) -> Result<(), FlowError> {
        intent.validate()?;
        let units = parse_units(&intent.amount, intent.token_decimals)?;
        let charge = self.charges.create(intent).await?;
        progress.charge = Some(charge.clone());

        let settlement = Settlement {
            source: intent.source.clone(),
            destination: intent.destination.clone(),
            recipient: intent.recipient_address.clone(),
            amount: SettleAmount::Source(units),
            policy: RoutePolicy::for_wallet(self.wallet.kind()),
            prepared_route: None,
        };
        self.settle(&charge, settlement, progress).await
    }

    /// Withdraws from the custodial wallet to an address on any chain/token.
    ///
    /// The amount leaves the wallet exactly; only guaranteed-rate routes are
    /// accepted.
    pub async fn withdraw(&self, intent: PaymentIntent) -> FlowResult {
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => return FlowResult::failure(&e),
        };
        let mut progress = FlowResult::default();
        let outcome = self.withdraw_inner(&intent, None, &mut progress).await;
        self.finish("Withdraw", progress, outcome).await
    }

    async fn withdraw_inner(
        &self,
        intent: &PaymentIntent,
        prepared_route: Option<Route>,
        progress: &mut FlowResult,
    ) -> Result<(), FlowError> {
        intent.validate()?;
        let amount = self.withdraw_amount(intent)?;
        let charge = self.charges.create(intent).await?;
        progress.charge = Some(charge.clone());

        let settlement = Settlement {
            source: intent.source.clone(),
            destination: intent.destination.clone(),
            recipient: intent.recipient_address.clone(),
            amount,
            policy: RoutePolicy::RfqOnly,
            prepared_route,
        };
        self.settle(&charge, settlement, progress).await
    }

    /// Source-side amount of a withdrawal.
    fn withdraw_amount(&self, intent: &PaymentIntent) -> Result<SettleAmount, FlowError> {
        let decimals = if intent.is_same_asset() {
            intent.token_decimals
        } else {
            self.settings.wallet_token_decimals
        };
        Ok(SettleAmount::Source(parse_units(&intent.amount, decimals)?))
    }

    fn withdraw_route_request(&self, intent: &PaymentIntent) -> Result<RouteRequest, FlowError> {
        let units = parse_units(&intent.amount, self.settings.wallet_token_decimals)?;
        Ok(RouteRequest {
            from: RouteEndpoint {
                address: self.payer()?,
                token_address: intent.source.token_address.clone(),
                chain_id: intent.source.chain_id.clone(),
            },
            to: RouteEndpoint {
                address: intent.recipient_address.clone(),
                token_address: intent.destination.token_address.clone(),
                chain_id: intent.destination.chain_id.clone(),
            },
            amount: RouteAmount::FromAmount(units),
        })
    }

    /// Quotes the route for a later `withdraw_prepared`.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Same asset, no route needed
    /// * `Ok(Some(Route))` - Route quoted and remembered
    /// * `Err(FlowError)` - Invalid intent or no acceptable route
    pub async fn prepare_route(&self, intent: &PaymentIntent) -> Result<Option<Route>, FlowError> {
        intent.validate()?;
        if !needs_route(&intent.source, &intent.destination) {
            *self.prepared.write().await = None;
            return Ok(None);
        }
        let request = self.withdraw_route_request(intent)?;
        let route = self.routes.resolve(&request, RoutePolicy::RfqOnly).await?;
        info!(
            "Prepared {:?} route, min received {} {}, expiry {}",
            route.route_type,
            route
                .min_received(intent.token_decimals)
                .unwrap_or_else(|| "unknown".to_string()),
            intent.token_symbol,
            route.expiry
        );
        *self.prepared.write().await = Some(PreparedWithdraw { request });
        Ok(Some(route))
    }

    /// Refetches the prepared route, bypassing the cache.
    pub async fn refresh_route(&self) -> Result<Option<Route>, FlowError> {
        let prepared = self.prepared.read().await.clone();
        match prepared {
            Some(prepared) => Ok(Some(
                self.routes.refresh(&prepared.request, RoutePolicy::RfqOnly).await?,
            )),
            None => Ok(None),
        }
    }

    /// True when the prepared route exists and has expired.
    pub async fn is_route_expired(&self) -> bool {
        let prepared = self.prepared.read().await.clone();
        let Some(prepared) = prepared else {
            return false;
        };
        match self.routes.cached(&prepared.request).await {
            Some(route) => route.is_expired(self.clock.now()),
            None => false,
        }
    }

    /// Withdraws using the route from `prepare_route`.
    ///
    /// Cross-chain withdrawals fail with `RouteNotPrepared` without a prepared
    /// route and with `RouteExpired` once it has expired; no charge is created
    /// in either case.
    pub async fn withdraw_prepared(&self, intent: PaymentIntent) -> FlowResult {
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => return FlowResult::failure(&e),
        };
        let mut progress = FlowResult::default();
        let outcome = async {
            intent.validate()?;
            let route = if needs_route(&intent.source, &intent.destination) {
                let request = self.withdraw_route_request(&intent)?;
                let route = self
                    .routes
                    .cached(&request)
                    .await
                    .ok_or(FlowError::RouteNotPrepared)?;
                route.ensure_not_expired(self.clock.now())?;
                Some(route)
            } else {
                None
            };
            self.withdraw_inner(&intent, route, &mut progress).await
        }
        .await;
        self.finish("Prepared withdraw", progress, outcome).await
    }

    /// Adds money from an external wallet to the recipient.
    ///
    /// The amount is fixed on the destination side; the route decides how much
    /// leaves the external wallet.
    pub async fn add_money(&self, intent: PaymentIntent) -> FlowResult {
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => return FlowResult::failure(&e),
        };
        let mut progress = FlowResult::default();
        let outcome = self.add_money_inner(&intent, &mut progress).await;
        self.finish("Add money", progress, outcome).await
    }

    async fn add_money_inner(&self, intent: &PaymentIntent, progress: &mut FlowResult) -> Result<(), FlowError> {
        if self.wallet.kind() != WalletKind::External {
            return Err(FlowError::InvalidIntent(
                "Adding money requires an external wallet".to_string(),
            ));
        }
        intent.validate()?;
        let units = parse_units(&intent.amount, intent.token_decimals)?;
        let charge = self.charges.create(intent).await?;
        progress.charge = Some(charge.clone());

        let settlement = Settlement {
            source: intent.source.clone(),
            destination: intent.destination.clone(),
            recipient: intent.recipient_address.clone(),
            amount: SettleAmount::Destination(units),
            policy: RoutePolicy::AnyRoute,
            prepared_route: None,
        };
        self.settle(&charge, settlement, progress).await
    }

    /// Pays an existing request charge.
    ///
    /// Custodial wallets pay from their configured token. External wallets pay
    /// from the configured token when connected to its chain, otherwise from
    /// the charge's token on their connected chain.
    pub async fn pay_request(&self, charge_id: &str) -> FlowResult {
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => return FlowResult::failure(&e),
        };
        let mut progress = FlowResult::default();
        let outcome = self.pay_request_inner(charge_id, &mut progress).await;
        self.finish("Request payment", progress, outcome).await
    }

    async fn pay_request_inner(&self, charge_id: &str, progress: &mut FlowResult) -> Result<(), FlowError> {
        if charge_id.trim().is_empty() {
            return Err(FlowError::InvalidIntent(
                "Request payment requires a charge ID".to_string(),
            ));
        }
        let charge = self.charges.fetch(charge_id).await?;
        progress.charge = Some(charge.clone());

        let destination = charge.location();
        let source = match self.wallet.kind() {
            WalletKind::Custodial => self.settings.wallet_token.clone(),
            WalletKind::External => {
                // Pay from the configured token when connected to its chain
                let chain = self.wallet.connected_chain().await?;
                if chain == self.settings.wallet_token.chain_id {
                    self.settings.wallet_token.clone()
                } else {
                    TokenLocation::new(chain, charge.token_address.clone())
                }
            }
        };
        if self.wallet.kind() == WalletKind::External
            && source.same_chain(&destination)
            && !source.same_asset(&destination)
        {
            return Err(FlowError::Unsupported(
                "Same-chain external wallet payments not yet implemented",
            ));
        }

        let units = parse_units(&charge.token_amount, charge.token_decimals)?;
        let settlement = Settlement {
            source,
            destination,
            recipient: charge.request_link.recipient_address.clone(),
            amount: SettleAmount::Destination(units),
            policy: RoutePolicy::for_wallet(self.wallet.kind()),
            prepared_route: None,
        };
        self.settle(&charge, settlement, progress).await
    }

    // ========================================================================
    // SHARED STAGES
    // ========================================================================

    /// Runs route, execution, settlement and recording for an existing charge.
    async fn settle(
        &self,
        charge: &Charge,
        settlement: Settlement,
        progress: &mut FlowResult,
    ) -> Result<(), FlowError> {
        let payer = self.payer()?;
        let Settlement {
            source,
            destination,
            recipient,
            amount,
            policy,
            prepared_route,
        } = settlement;

        let (tx_hash, destination_tx_hash) = if needs_route(&source, &destination) {
            let route = match prepared_route {
                Some(route) => route,
                None => {
                    self.stage.send_replace(FlowStage::FetchingRoute);
                    let request = RouteRequest {
                        from: RouteEndpoint {
                            address: payer.clone(),
                            token_address: source.token_address.clone(),
                            chain_id: source.chain_id.clone(),
                        },
                        to: RouteEndpoint {
                            address: recipient.clone(),
                            token_address: destination.token_address.clone(),
                            chain_id: destination.chain_id.clone(),
                        },
                        amount: match amount {
                            SettleAmount::Source(units) => RouteAmount::FromAmount(units),
                            SettleAmount::Destination(units) => RouteAmount::ToAmount(units),
                        },
                    };
                    self.routes.resolve(&request, policy).await?
                }
            };
            route.ensure_not_expired(self.clock.now())?;
            if let SettleAmount::Source(units) = amount {
                self.check_balance(&source, units).await?;
            }

            let receipt = self.executor.execute(&route.transactions, &source.chain_id).await?;
            let source_hash = receipt.transaction_hash;
            progress.tx_hash = Some(source_hash.clone());

            if source.same_chain(&destination) {
                // Same-chain swaps settle atomically
                (source_hash.clone(), source_hash)
            } else {
                self.stage.send_replace(FlowStage::AwaitingFulfillment);
                let outcome = self.poller.wait_for_settlement(&source_hash).await;
                progress.settlement = Some(outcome.state);
                (source_hash, outcome.destination_tx_hash)
            }
        } else {
            let units = match amount {
                SettleAmount::Source(units) => units,
                SettleAmount::Destination(units) => units,
            };
            self.check_balance(&source, units).await?;
            let receipt = self.executor.execute_transfer(&source, &recipient, units).await?;
            progress.tx_hash = Some(receipt.transaction_hash.clone());
            (receipt.transaction_hash.clone(), receipt.transaction_hash)
        };
        progress.destination_tx_hash = Some(destination_tx_hash);

        self.stage.send_replace(FlowStage::Recording);
        let payment = self
            .recorder
            .record(&charge.uuid, &source.chain_id, &tx_hash, &source.token_address, &payer)
            .await?;
        progress.payment = Some(payment);
        Ok(())
    }

    /// Fails early when the wallet visibly lacks `required` units.
    ///
    /// A failed balance lookup is not fatal; the wallet will reject an
    /// underfunded transaction anyway.
    async fn check_balance(&self, token: &TokenLocation, required: u128) -> Result<(), FlowError> {
        match self.wallet.token_balance(token).await {
            Ok(available) if available < required => {
                warn!(
                    "Insufficient balance on {}: required {}, available {}",
                    token, required, available
                );
                Err(FlowError::InsufficientBalance { required, available })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Skipping balance pre-check on {}: {}", token, e);
                Ok(())
            }
        }
    }
}

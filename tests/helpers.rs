//! Shared test helpers for sequencer tests
//!
//! This module provides constants, in-memory fakes of the external services
//! and builders used across the test files.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use payment_sequencer::clients::charges::{
    ChargeCreated, ChargeCreatedData, ChargeService, CreateChargeRequest, CreatePaymentRequest,
};
use payment_sequencer::clients::status::{DestinationStatus, StatusResponse, StatusService};
use payment_sequencer::clients::{
    ClaimService, PriceService, RouteRequest, RoutingService, TokenPrice, Wallet, WalletKind,
};
use payment_sequencer::service::{SequencerServices, SequencerSettings};
use payment_sequencer::types::{
    Charge, ChargeStatus, Payment, PaymentIntent, RequestLink, Route, RouteTransaction, RouteType,
    TokenLocation, TransactionReceipt, TransactionType,
};
use payment_sequencer::{ApiError, Clock, WalletError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// CONSTANTS
// ============================================================================

// --------------------------------- IDs ----------------------------------

/// Dummy charge ID (UUID format)
pub const DUMMY_CHARGE_ID: &str = "11111111-1111-1111-1111-111111111111";

/// Dummy payment ID (UUID format)
pub const DUMMY_PAYMENT_ID: &str = "22222222-2222-2222-2222-222222222222";

/// Dummy payment link
pub const DUMMY_LINK: &str = "https://peanut.me/claim?c=42161&v=v4.3&i=7#p=secret";

// ------------------------------ ADDRESSES -------------------------------

/// Dummy payer wallet address
pub const DUMMY_PAYER_ADDR: &str = "0x0000000000000000000000000000000000000001";

/// Dummy recipient address
pub const DUMMY_RECIPIENT_ADDR: &str = "0x0000000000000000000000000000000000000002";

/// Dummy routing contract address
pub const DUMMY_ROUTER_ADDR: &str = "0x0000000000000000000000000000000000000003";

// ------------------------------- TOKENS ---------------------------------

/// Arbitrum One chain ID
pub const DUMMY_CHAIN_ARB: &str = "42161";

/// Optimism chain ID
pub const DUMMY_CHAIN_OP: &str = "10";

/// USDC on Arbitrum One
pub const DUMMY_USDC_ARB: &str = "0xaf88d065e77c8cC2239327C5EDb3A432268e5831";

/// USDC on Optimism
pub const DUMMY_USDC_OP: &str = "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85";

/// USDT on Arbitrum One
pub const DUMMY_USDT_ARB: &str = "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9";

/// Fixed start time of the manual clock
pub fn dummy_start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Deterministic transaction hash for index `n`
pub fn dummy_tx_hash(n: u64) -> String {
    format!("0x{:064x}", n)
}

// ============================================================================
// CLOCK
// ============================================================================

/// Clock whose time only moves on `advance` or `sleep`.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, duration: ChronoDuration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + duration;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(ChronoDuration::from_std(duration).unwrap());
    }
}

// ============================================================================
// CHARGE SERVICE
// ============================================================================

/// In-memory charge API.
#[derive(Debug, Default)]
pub struct FakeChargeService {
    pub charges: Mutex<HashMap<String, Charge>>,
    /// ID returned by the next `create`; `None` answers with an empty body
    pub next_id: Mutex<Option<String>>,
    pub fail_create: Mutex<bool>,
    pub fail_payment: Mutex<bool>,
    pub created: Mutex<Vec<CreateChargeRequest>>,
    pub fetched: Mutex<Vec<String>>,
    pub payments: Mutex<Vec<CreatePaymentRequest>>,
}

impl FakeChargeService {
    /// Charge API that hands out `charge` on create.
    pub fn with_charge(charge: Charge) -> Self {
        let service = Self::default();
        *service.next_id.lock().unwrap() = Some(charge.uuid.clone());
        service.charges.lock().unwrap().insert(charge.uuid.clone(), charge);
        service
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn payments(&self) -> Vec<CreatePaymentRequest> {
        self.payments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChargeService for FakeChargeService {
    async fn create(&self, request: &CreateChargeRequest) -> Result<ChargeCreated, ApiError> {
        self.created.lock().unwrap().push(request.clone());
        if *self.fail_create.lock().unwrap() {
            return Err(ApiError::Rejected("charge creation refused".to_string()));
        }
        let id = self.next_id.lock().unwrap().clone();
        Ok(ChargeCreated {
            data: Some(ChargeCreatedData { id }),
        })
    }

    async fn get(&self, charge_id: &str) -> Result<Charge, ApiError> {
        self.fetched.lock().unwrap().push(charge_id.to_string());
        self.charges
            .lock()
            .unwrap()
            .get(charge_id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                endpoint: "GET /charges/:id".to_string(),
                status: 404,
                body: "not found".to_string(),
            })
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<Payment, ApiError> {
        self.payments.lock().unwrap().push(request.clone());
        if *self.fail_payment.lock().unwrap() {
            return Err(ApiError::Status {
                endpoint: "POST /charges/:id/payments".to_string(),
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(Payment {
            uuid: DUMMY_PAYMENT_ID.to_string(),
            charge_id: request.charge_id.clone(),
            chain_id: request.chain_id.clone(),
            hash: request.hash.clone(),
            token_address: request.token_address.clone(),
            payer_address: request.payer_address.clone(),
            status: "NEW".to_string(),
        })
    }
}

// ============================================================================
// ROUTING SERVICE
// ============================================================================

/// Routing service answering from a script; the last answer repeats.
#[derive(Debug, Default)]
pub struct FakeRoutingService {
    pub script: Mutex<VecDeque<Result<Route, String>>>,
    pub requests: Mutex<Vec<RouteRequest>>,
}

impl FakeRoutingService {
    pub fn returning(route: Route) -> Self {
        let service = Self::default();
        service.script.lock().unwrap().push_back(Ok(route));
        service
    }

    pub fn push(&self, answer: Result<Route, String>) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl RoutingService for FakeRoutingService {
    async fn get_route(&self, request: &RouteRequest) -> Result<Route, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut script = self.script.lock().unwrap();
        let answer = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match answer {
            Some(Ok(route)) => Ok(route),
            Some(Err(reason)) => Err(ApiError::Rejected(reason)),
            None => Err(ApiError::Rejected("no route scripted".to_string())),
        }
    }
}

// ============================================================================
// PRICE SERVICE
// ============================================================================

/// Price service answering from a fixed table keyed by lowercase token address.
#[derive(Debug, Default)]
pub struct FakePriceService {
    pub prices: Mutex<HashMap<String, TokenPrice>>,
    pub lookups: Mutex<Vec<TokenLocation>>,
}

impl FakePriceService {
    /// USDC on Arbitrum and Optimism at $1.
    pub fn usdc() -> Self {
        let service = Self::default();
        service.set(DUMMY_USDC_ARB, 1.0, 6);
        service.set(DUMMY_USDC_OP, 1.0, 6);
        service
    }

    pub fn set(&self, token_address: &str, price: f64, decimals: u8) {
        self.prices
            .lock()
            .unwrap()
            .insert(token_address.to_lowercase(), TokenPrice { price, decimals });
    }

    pub fn lookups(&self) -> Vec<TokenLocation> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceService for FakePriceService {
    async fn token_price(&self, token: &TokenLocation) -> Result<TokenPrice, ApiError> {
        self.lookups.lock().unwrap().push(token.clone());
        self.prices
            .lock()
            .unwrap()
            .get(&token.token_address.to_lowercase())
            .copied()
            .ok_or_else(|| ApiError::Status {
                endpoint: "GET /api/1/market/data".to_string(),
                status: 404,
                body: "asset not found".to_string(),
            })
    }
}

// ============================================================================
// STATUS SERVICE
// ============================================================================

/// Status service answering from a script; "ongoing" once it runs out.
#[derive(Debug, Default)]
pub struct FakeStatusService {
    pub script: Mutex<VecDeque<Result<StatusResponse, String>>>,
    pub checked: Mutex<Vec<String>>,
}

impl FakeStatusService {
    pub fn push(&self, answer: Result<StatusResponse, String>) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn calls(&self) -> usize {
        self.checked.lock().unwrap().len()
    }
}

#[async_trait]
impl StatusService for FakeStatusService {
    async fn check_transaction_status(&self, source_tx_hash: &str) -> Result<StatusResponse, ApiError> {
        self.checked.lock().unwrap().push(source_tx_hash.to_string());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(reason)) => Err(ApiError::Rejected(reason)),
            None => Ok(status_response("ongoing", None)),
        }
    }
}

/// Builds a status response.
pub fn status_response(status: &str, destination_hash: Option<&str>) -> StatusResponse {
    StatusResponse {
        squid_transaction_status: status.to_string(),
        to_chain: destination_hash.map(|hash| DestinationStatus {
            transaction_id: Some(hash.to_string()),
            transaction_url: None,
            chain_data: None,
        }),
    }
}

// ============================================================================
// WALLET
// ============================================================================

/// Wallet that records what it signs.
#[derive(Debug)]
pub struct FakeWallet {
    pub kind: WalletKind,
    pub address: Option<String>,
    pub chain: Mutex<String>,
    /// Whether `switch_chain` actually moves the wallet
    pub switch_succeeds: bool,
    pub switches: Mutex<Vec<String>>,
    pub balance: Mutex<Result<u128, String>>,
    pub sent: Mutex<Vec<(RouteTransaction, String)>>,
    pub transfers: Mutex<Vec<(TokenLocation, String, u128)>>,
    /// 1-based submission index that is rejected
    pub reject_step: Mutex<Option<usize>>,
    /// 1-based submission index whose receipt reverts
    pub revert_step: Mutex<Option<usize>>,
    /// When set, submissions wait for a notification first
    pub gate: Option<Arc<Notify>>,
    submissions: Mutex<u64>,
}

impl FakeWallet {
    pub fn new(kind: WalletKind, chain: &str) -> Self {
        Self {
            kind,
            address: Some(DUMMY_PAYER_ADDR.to_string()),
            chain: Mutex::new(chain.to_string()),
            switch_succeeds: true,
            switches: Mutex::new(Vec::new()),
            balance: Mutex::new(Ok(u128::MAX)),
            sent: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            reject_step: Mutex::new(None),
            revert_step: Mutex::new(None),
            gate: None,
            submissions: Mutex::new(0),
        }
    }

    pub fn custodial() -> Self {
        Self::new(WalletKind::Custodial, DUMMY_CHAIN_ARB)
    }

    pub fn external(chain: &str) -> Self {
        Self::new(WalletKind::External, chain)
    }

    pub fn sent(&self) -> Vec<(RouteTransaction, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn transfers(&self) -> Vec<(TokenLocation, String, u128)> {
        self.transfers.lock().unwrap().clone()
    }

    async fn submit(&self) -> Result<String, WalletError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let step = {
            let mut submissions = self.submissions.lock().unwrap();
            *submissions += 1;
            *submissions
        };
        if *self.reject_step.lock().unwrap() == Some(step as usize) {
            return Err(WalletError::TransactionRejected);
        }
        Ok(dummy_tx_hash(step))
    }
}

#[async_trait]
impl Wallet for FakeWallet {
    fn kind(&self) -> WalletKind {
        self.kind
    }

    fn address(&self) -> Option<String> {
        self.address.clone()
    }

    async fn connected_chain(&self) -> Result<String, WalletError> {
        Ok(self.chain.lock().unwrap().clone())
    }

    async fn switch_chain(&self, chain_id: &str) -> Result<(), WalletError> {
        self.switches.lock().unwrap().push(chain_id.to_string());
        if self.switch_succeeds {
            *self.chain.lock().unwrap() = chain_id.to_string();
        }
        Ok(())
    }

    async fn send_transaction(&self, tx: &RouteTransaction, chain_id: &str) -> Result<String, WalletError> {
        let hash = self.submit().await?;
        self.sent.lock().unwrap().push((tx.clone(), chain_id.to_string()));
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        _chain_id: &str,
        confirmations: u64,
    ) -> Result<TransactionReceipt, WalletError> {
        if *self.revert_step.lock().unwrap() == Some(*self.submissions.lock().unwrap() as usize) {
            return Err(WalletError::Reverted(tx_hash.to_string()));
        }
        Ok(TransactionReceipt {
            transaction_hash: tx_hash.to_string(),
            confirmations,
            block_number: Some(100),
        })
    }

    async fn send_money(&self, token: &TokenLocation, to: &str, amount: u128) -> Result<String, WalletError> {
        let hash = self.submit().await?;
        self.transfers
            .lock()
            .unwrap()
            .push((token.clone(), to.to_string(), amount));
        Ok(hash)
    }

    async fn token_balance(&self, _token: &TokenLocation) -> Result<u128, WalletError> {
        self.balance
            .lock()
            .unwrap()
            .clone()
            .map_err(WalletError::Transport)
    }
}

// ============================================================================
// CLAIM SERVICE
// ============================================================================

/// Claim API that returns fixed hashes.
#[derive(Debug, Default)]
pub struct FakeClaimService {
    pub fail: Mutex<bool>,
    pub claims: Mutex<Vec<(String, String, Option<TokenLocation>)>>,
}

#[async_trait]
impl ClaimService for FakeClaimService {
    async fn claim_link(&self, link: &str, recipient: &str) -> Result<String, ApiError> {
        self.claims
            .lock()
            .unwrap()
            .push((link.to_string(), recipient.to_string(), None));
        if *self.fail.lock().unwrap() {
            return Err(ApiError::Rejected("link already claimed".to_string()));
        }
        Ok(dummy_tx_hash(0xc1))
    }

    async fn claim_link_xchain(
        &self,
        link: &str,
        recipient: &str,
        destination: &TokenLocation,
    ) -> Result<String, ApiError> {
        self.claims
            .lock()
            .unwrap()
            .push((link.to_string(), recipient.to_string(), Some(destination.clone())));
        if *self.fail.lock().unwrap() {
            return Err(ApiError::Rejected("link already claimed".to_string()));
        }
        Ok(dummy_tx_hash(0xc2))
    }
}

// ============================================================================
// BUILDERS
// ============================================================================

/// Create a route with one transaction, expiring `expires_in` after `now`
pub fn create_default_route(route_type: RouteType, now: DateTime<Utc>, expires_in: ChronoDuration) -> Route {
    Route {
        route_type,
        transactions: vec![RouteTransaction {
            to: DUMMY_ROUTER_ADDR.to_string(),
            data: "0xdeadbeef".to_string(),
            value: "0".to_string(),
        }],
        fee_costs_usd: 0.12,
        expiry: now + expires_in,
        to_amount_min: Some("9950000".to_string()),
        raw_response: serde_json::json!({}),
    }
}

/// Create a charge for 10.00 USDC on `location`
pub fn create_default_charge(location: &TokenLocation) -> Charge {
    Charge {
        uuid: DUMMY_CHARGE_ID.to_string(),
        chain_id: location.chain_id.clone(),
        token_address: location.token_address.clone(),
        token_amount: "10.00".to_string(),
        token_decimals: 6,
        token_symbol: "USDC".to_string(),
        request_link: RequestLink {
            recipient_address: DUMMY_RECIPIENT_ADDR.to_string(),
        },
        status: ChargeStatus::Pending,
    }
}

/// Create an intent moving 10.00 USDC from `source` to `destination`
pub fn create_default_intent(
    source: TokenLocation,
    destination: TokenLocation,
    transaction_type: TransactionType,
) -> PaymentIntent {
    PaymentIntent {
        amount: "10.00".to_string(),
        currency: "USD".to_string(),
        source,
        destination,
        recipient_address: DUMMY_RECIPIENT_ADDR.to_string(),
        token_symbol: "USDC".to_string(),
        token_decimals: 6,
        transaction_type,
        request_id: None,
        attachment: None,
    }
}

pub fn usdc_arb() -> TokenLocation {
    TokenLocation::new(DUMMY_CHAIN_ARB, DUMMY_USDC_ARB)
}

pub fn usdc_op() -> TokenLocation {
    TokenLocation::new(DUMMY_CHAIN_OP, DUMMY_USDC_OP)
}

pub fn usdt_arb() -> TokenLocation {
    TokenLocation::new(DUMMY_CHAIN_ARB, DUMMY_USDT_ARB)
}

/// Settings with the custodial wallet holding USDC on Arbitrum
pub fn create_default_settings() -> SequencerSettings {
    SequencerSettings {
        base_url: "https://peanut.me".to_string(),
        wallet_token: usdc_arb(),
        wallet_token_decimals: 6,
        route_freshness_secs: 30,
        route_cache_ttl_secs: 60,
        route_retries: 2,
        poll_interval: Duration::from_millis(2000),
        poll_max_attempts: 15,
        confirmations: 1,
    }
}

/// Fakes behind one sequencer, kept for assertions.
pub struct TestServices {
    pub charges: Arc<FakeChargeService>,
    pub routing: Arc<FakeRoutingService>,
    pub status: Arc<FakeStatusService>,
    pub wallet: Arc<FakeWallet>,
    pub clock: Arc<ManualClock>,
}

impl TestServices {
    pub fn new(charges: FakeChargeService, routing: FakeRoutingService, wallet: FakeWallet) -> Self {
        Self {
            charges: Arc::new(charges),
            routing: Arc::new(routing),
            status: Arc::new(FakeStatusService::default()),
            wallet: Arc::new(wallet),
            clock: Arc::new(ManualClock::new(dummy_start_time())),
        }
    }

    pub fn services(&self) -> SequencerServices {
        SequencerServices {
            charges: self.charges.clone(),
            routing: self.routing.clone(),
            status: self.status.clone(),
            wallet: self.wallet.clone(),
            clock: self.clock.clone(),
        }
    }
}

//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the payment sequencer.
//! Configuration includes the charge API, routing, price and status services,
//! wallet settings and the pending-claim store location.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::clients::wallet::WalletKind;

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all sequencer settings.
///
/// This structure holds configuration for:
/// - Charge/payment API connection
/// - Routing service (quotes) and its cache windows
/// - Token price service used for USD amounts and search tolerances
/// - Cross-chain status service and the settlement poll budget
/// - Wallet used to sign and submit transactions
/// - Pending-claim store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Charge API configuration
    pub service: ServiceConfig,
    /// Routing service configuration
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Token price service configuration
    #[serde(default)]
    pub prices: PriceConfig,
    /// Cross-chain status service configuration
    #[serde(default)]
    pub status: StatusConfig,
    /// Wallet configuration
    pub wallet: WalletConfig,
    /// Local storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Charge API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Charge/payment API base URL (e.g., "https://api.peanut.me")
    pub api_url: String,
    /// Public app URL stored on charges (used to build request links)
    pub base_url: String,
    /// HTTP request timeout in seconds for all API clients
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Routing service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Routing API base URL
    #[serde(default = "default_squid_api_url")]
    pub api_url: String,
    /// Environment variable name containing the integrator ID
    #[serde(default = "default_integrator_id_env")]
    pub integrator_id_env: String,
    /// Cached routes younger than this are reused
    #[serde(default = "default_route_freshness_secs")]
    pub route_freshness_secs: u64,
    /// Cached routes older than this are evicted
    #[serde(default = "default_route_cache_ttl_secs")]
    pub route_cache_ttl_secs: u64,
    /// Binary search quotes when searching for a source amount
    #[serde(default = "default_max_search_iterations")]
    pub max_search_iterations: u32,
    /// Extra attempts after a failed route lookup
    #[serde(default = "default_route_retries")]
    pub max_retries: u32,
}

/// Token price service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Market data API base URL
    #[serde(default = "default_price_api_url")]
    pub api_url: String,
    /// Environment variable name containing the market data API key
    #[serde(default = "default_price_api_key_env")]
    pub api_key_env: String,
}

/// Cross-chain status service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Status API base URL
    #[serde(default = "default_squid_api_url")]
    pub api_url: String,
    /// Interval between settlement polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of settlement polls
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Wallet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// "custodial" (embedded wallet, RFQ-only routes) or "external" (connected wallet)
    pub kind: WalletKind,
    /// JSON-RPC endpoint of the wallet/node
    pub rpc_url: String,
    /// Wallet address (0x-prefixed hex)
    pub address: String,
    /// Chain the wallet holds funds on
    pub chain_id: u64,
    /// Token the wallet holds funds in
    pub token_address: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
    /// Confirmations required per transaction
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Interval between receipt polls in milliseconds
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    /// Receipt polls before giving up on a transaction
    #[serde(default = "default_receipt_max_attempts")]
    pub receipt_max_attempts: u32,
}

/// Local storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding links saved before a claim is submitted
    #[serde(default = "default_pending_claims_path")]
    pub pending_claims_path: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_url: default_squid_api_url(),
            integrator_id_env: default_integrator_id_env(),
            route_freshness_secs: default_route_freshness_secs(),
            route_cache_ttl_secs: default_route_cache_ttl_secs(),
            max_search_iterations: default_max_search_iterations(),
            max_retries: default_route_retries(),
        }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            api_url: default_price_api_url(),
            api_key_env: default_price_api_key_env(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            api_url: default_squid_api_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pending_claims_path: default_pending_claims_path(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_squid_api_url() -> String {
    "https://apiplus.squidrouter.com".to_string()
}

fn default_integrator_id_env() -> String {
    "SQUID_INTEGRATOR_ID".to_string()
}

fn default_price_api_url() -> String {
    "https://api.mobula.io".to_string()
}

fn default_price_api_key_env() -> String {
    "MOBULA_API_KEY".to_string()
}

fn default_route_freshness_secs() -> u64 {
    30
}

fn default_route_cache_ttl_secs() -> u64 {
    60
}

fn default_max_search_iterations() -> u32 {
    3
}

fn default_route_retries() -> u32 {
    2
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    15
}

fn default_token_decimals() -> u8 {
    6
}

fn default_token_symbol() -> String {
    "USDC".to_string()
}

fn default_confirmations() -> u64 {
    1
}

fn default_receipt_poll_interval_ms() -> u64 {
    1000
}

fn default_receipt_max_attempts() -> u32 {
    120
}

fn default_pending_claims_path() -> String {
    "data/pending_claims.json".to_string()
}

impl SequencerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// This function:
    /// 1. Checks if config/sequencer.toml exists (or uses SEQUENCER_CONFIG_PATH env var or provided path)
    /// 2. If it exists, loads and parses the configuration
    /// 3. Validates the configuration
    /// 4. If it doesn't exist, returns an error asking user to copy template
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file. If None, uses SEQUENCER_CONFIG_PATH env var or default.
    ///
    /// # Returns
    ///
    /// * `Ok(SequencerConfig)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - Failed to load configuration, file doesn't exist, or validation failed
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("SEQUENCER_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/sequencer.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read configuration file '{}'", config_path))?;
            let config: SequencerConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse configuration file '{}'", config_path))?;
            config.validate()?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/sequencer.template.toml config/sequencer.toml\n\
                Then edit config/sequencer.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Loads configuration from the default location.
    ///
    /// This is equivalent to calling `load_from_path(None)`.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks:
    /// - All service URLs parse as http(s) URLs
    /// - Wallet address and token address are 20-byte hex
    /// - Poll intervals, attempt caps and confirmations are positive
    /// - Route freshness window does not exceed the cache lifetime
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Configuration is valid
    /// * `Err(anyhow::Error)` - Validation failed with error message
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_url("service.api_url", &self.service.api_url)?;
        validate_url("service.base_url", &self.service.base_url)?;
        validate_url("routing.api_url", &self.routing.api_url)?;
        validate_url("prices.api_url", &self.prices.api_url)?;
        validate_url("status.api_url", &self.status.api_url)?;
        validate_url("wallet.rpc_url", &self.wallet.rpc_url)?;

        validate_evm_address(&self.wallet.address)
            .map_err(|e| anyhow::anyhow!("Invalid wallet.address: {}", e))?;
        validate_evm_address(&self.wallet.token_address)
            .map_err(|e| anyhow::anyhow!("Invalid wallet.token_address: {}", e))?;

        if self.service.request_timeout_secs == 0 {
            anyhow::bail!("Configuration error: service.request_timeout_secs must be positive");
        }
        if self.status.poll_interval_ms == 0 {
            anyhow::bail!("Configuration error: status.poll_interval_ms must be positive");
        }
        if self.status.max_attempts == 0 {
            anyhow::bail!("Configuration error: status.max_attempts must be positive");
        }
        if self.wallet.confirmations == 0 {
            anyhow::bail!("Configuration error: wallet.confirmations must be at least 1");
        }
        if self.wallet.receipt_max_attempts == 0 {
            anyhow::bail!("Configuration error: wallet.receipt_max_attempts must be positive");
        }
        if self.routing.max_search_iterations == 0 {
            anyhow::bail!("Configuration error: routing.max_search_iterations must be positive");
        }
        if self.routing.route_freshness_secs > self.routing.route_cache_ttl_secs {
            anyhow::bail!(
                "Configuration error: routing.route_freshness_secs ({}) exceeds routing.route_cache_ttl_secs ({})",
                self.routing.route_freshness_secs,
                self.routing.route_cache_ttl_secs
            );
        }
        if self.storage.pending_claims_path.trim().is_empty() {
            anyhow::bail!("Configuration error: storage.pending_claims_path must not be empty");
        }
        Ok(())
    }

    /// Reads the routing integrator ID from the configured environment variable.
    pub fn integrator_id(&self) -> anyhow::Result<String> {
        std::env::var(&self.routing.integrator_id_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable {} is not set (routing integrator ID)",
                self.routing.integrator_id_env
            )
        })
    }

    /// Reads the market data API key from the configured environment variable.
    pub fn price_api_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.prices.api_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable {} is not set (token price API key)",
                self.prices.api_key_env
            )
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.service.request_timeout_secs)
    }
}

/// Validates that a value is an absolute http(s) URL.
fn validate_url(field: &str, value: &str) -> anyhow::Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", field, value, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => anyhow::bail!("Invalid {} '{}': unsupported scheme {}", field, value, other),
    }
}

/// Validates a `0x`-prefixed 20-byte EVM address.
///
/// # Arguments
///
/// * `address` - `0x`-prefixed hex string
///
/// # Returns
///
/// - `Ok(())` - Address has the expected length
/// - `Err(anyhow::Error)` - Address is malformed
pub fn validate_evm_address(address: &str) -> anyhow::Result<()> {
    let stripped = address
        .strip_prefix("0x")
        .ok_or_else(|| anyhow::anyhow!("Address must be 0x-prefixed hex string"))?;
    let bytes = hex::decode(stripped).map_err(|_| anyhow::anyhow!("Invalid hex address"))?;
    if bytes.len() != 20 {
        anyhow::bail!("Invalid address length: expected 20 bytes, got {}", bytes.len());
    }
    Ok(())
}

//! Unit tests for configuration module

use payment_sequencer::clients::WalletKind;
use payment_sequencer::config::{
    PriceConfig, RoutingConfig, SequencerConfig, ServiceConfig, StatusConfig, StorageConfig,
    WalletConfig,
};
use std::io::Write;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Create a minimal valid SequencerConfig for testing
fn create_test_config() -> SequencerConfig {
    SequencerConfig {
        service: ServiceConfig {
            api_url: "http://127.0.0.1:5000".to_string(),
            base_url: "https://peanut.me".to_string(),
            request_timeout_secs: 30,
        },
        routing: RoutingConfig::default(),
        prices: PriceConfig::default(),
        status: StatusConfig::default(),
        wallet: WalletConfig {
            kind: WalletKind::Custodial,
            rpc_url: "http://127.0.0.1:8545".to_string(),
            address: "0x0000000000000000000000000000000000000001".to_string(),
            chain_id: 42161,
            token_address: "0xaf88d065e77c8cC2239327C5EDb3A432268e5831".to_string(),
            token_decimals: 6,
            token_symbol: "USDC".to_string(),
            confirmations: 1,
            receipt_poll_interval_ms: 1000,
            receipt_max_attempts: 120,
        },
        storage: StorageConfig::default(),
    }
}

// ============================================================================
// VALIDATION TESTS
// ============================================================================

/// What is tested: SequencerConfig::validate() accepts valid configuration
/// Why: Ensure valid configs pass validation
#[test]
fn test_config_validation_success() {
    let config = create_test_config();
    assert!(config.validate().is_ok());
}

/// What is tested: SequencerConfig::validate() rejects a non-http URL
/// Why: Every service is reached over HTTP(S)
#[test]
fn test_config_validation_rejects_bad_url() {
    let mut config = create_test_config();
    config.status.api_url = "ftp://status.example".to_string();

    let result = config.validate();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("status.api_url"));
}

/// What is tested: SequencerConfig::validate() rejects a malformed wallet address
/// Why: Payments recorded with a bad payer address cannot be reconciled
#[test]
fn test_config_validation_rejects_bad_address() {
    let mut config = create_test_config();
    config.wallet.address = "0x1234".to_string();

    let result = config.validate();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("wallet.address"));
}

/// What is tested: SequencerConfig::validate() rejects a freshness window longer than the cache lifetime
/// Why: Routes would be evicted while still considered fresh
#[test]
fn test_config_validation_rejects_freshness_over_ttl() {
    let mut config = create_test_config();
    config.routing.route_freshness_secs = 120;
    config.routing.route_cache_ttl_secs = 60;

    let result = config.validate();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("route_freshness_secs"));
}

/// What is tested: SequencerConfig::validate() rejects a zero poll budget
/// Why: The settlement poller needs at least one attempt
#[test]
fn test_config_validation_rejects_zero_attempts() {
    let mut config = create_test_config();
    config.status.max_attempts = 0;
    assert!(config.validate().is_err());
}

// ============================================================================
// LOADING TESTS
// ============================================================================

/// What is tested: load_from_path() parses TOML and fills section defaults
/// Why: Operators only write the values they change
#[test]
fn test_load_from_path_applies_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[service]
api_url = "https://api.peanut.me"
base_url = "https://peanut.me"

[wallet]
kind = "external"
rpc_url = "http://127.0.0.1:8545"
address = "0x0000000000000000000000000000000000000001"
chain_id = 10
token_address = "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"
"#
    )
    .unwrap();

    let config = SequencerConfig::load_from_path(Some(file.path().to_str().unwrap())).unwrap();

    assert_eq!(config.wallet.kind, WalletKind::External);
    assert_eq!(config.wallet.token_decimals, 6);
    assert_eq!(config.service.request_timeout_secs, 30);
    assert_eq!(config.routing.api_url, "https://apiplus.squidrouter.com");
    assert_eq!(config.routing.integrator_id_env, "SQUID_INTEGRATOR_ID");
    assert_eq!(config.prices.api_url, "https://api.mobula.io");
    assert_eq!(config.prices.api_key_env, "MOBULA_API_KEY");
    assert_eq!(config.status.poll_interval_ms, 2000);
    assert_eq!(config.status.max_attempts, 15);
    assert_eq!(config.storage.pending_claims_path, "data/pending_claims.json");
}

/// What is tested: load_from_path() reports a missing file with the template hint
/// Why: First-time setup should say how to create the config
#[test]
fn test_load_from_path_missing_file() {
    let result = SequencerConfig::load_from_path(Some("/nonexistent/sequencer.toml"));
    let message = result.unwrap_err().to_string();
    assert!(message.contains("not found"));
    assert!(message.contains("sequencer.template.toml"));
}

/// What is tested: the shipped template parses and validates
/// Why: Copying the template must give a working starting point
#[test]
fn test_template_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/sequencer.template.toml");
    let config = SequencerConfig::load_from_path(Some(path)).unwrap();
    assert_eq!(config.wallet.kind, WalletKind::Custodial);
    assert_eq!(config.wallet.chain_id, 42161);
}

/// What is tested: integrator_id() reads the configured environment variable
/// Why: The routing key is a secret and never stored in the config file
#[test]
fn test_integrator_id_from_env() {
    let mut config = create_test_config();
    config.routing.integrator_id_env = "SEQUENCER_TEST_INTEGRATOR_ID".to_string();

    assert!(config.integrator_id().is_err());
    std::env::set_var("SEQUENCER_TEST_INTEGRATOR_ID", "peanut-test");
    assert_eq!(config.integrator_id().unwrap(), "peanut-test");
    std::env::remove_var("SEQUENCER_TEST_INTEGRATOR_ID");
}

/// What is tested: price_api_key() reads the configured environment variable
/// Why: The market data key is a secret and never stored in the config file
#[test]
fn test_price_api_key_from_env() {
    let mut config = create_test_config();
    config.prices.api_key_env = "SEQUENCER_TEST_PRICE_API_KEY".to_string();

    assert!(config.price_api_key().is_err());
    std::env::set_var("SEQUENCER_TEST_PRICE_API_KEY", "mobula-test");
    assert_eq!(config.price_api_key().unwrap(), "mobula-test");
    std::env::remove_var("SEQUENCER_TEST_PRICE_API_KEY");
}

//! Payment Sequencer CLI
//!
//! Runs single payment flows against the configured charge API, routing
//! service and wallet:
//! - send: direct send of the wallet token (routed if the destination differs)
//! - withdraw: custodial withdrawal with guaranteed-rate routes only
//! - add-money: deposit from an external wallet
//! - pay-request: pay an existing request charge
//! - route: quote a withdrawal route without executing it
//! - status: check cross-chain settlement of a source transaction
//! - claim: cash out a payment link
//! - pending-claims: list links saved by interrupted claims
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin sequencer -- --config config/sequencer.toml send --amount 10.00 --to 0x...
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! SEQUENCER_CONFIG_PATH=config/sequencer.toml cargo run --bin sequencer -- status --tx 0x...
//! ```

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use payment_sequencer::{
    clients::{
        ClaimService, HttpChargeClient, HttpClaimClient, HttpPriceClient, HttpRoutingClient,
        HttpStatusClient, JsonRpcWallet, PriceService, StatusService,
    },
    config::SequencerConfig,
    service::{LinkClaimer, PaymentSequencer, SequencerServices, SequencerSettings, SettlementPoller},
    store::PendingClaimStore,
    types::{FlowResult, PaymentIntent, TokenLocation, TransactionType},
    Clock, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sequencer")]
#[command(about = "Payment settlement sequencer - creates charges, routes, executes and records payments")]
struct Args {
    /// Path to configuration file (default: config/sequencer.toml or SEQUENCER_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send the wallet token to an address
    Send(TransferArgs),
    /// Withdraw from the custodial wallet
    Withdraw(TransferArgs),
    /// Add money from an external wallet
    AddMoney(TransferArgs),
    /// Pay an existing request charge
    PayRequest {
        /// Charge UUID
        #[arg(long)]
        charge_id: String,
    },
    /// Quote a withdrawal route
    Route(TransferArgs),
    /// Check cross-chain settlement of a source transaction
    Status {
        /// Source transaction hash
        #[arg(long)]
        tx: String,
        /// Poll until settled or the attempt budget is spent
        #[arg(long)]
        wait: bool,
    },
    /// Claim a payment link
    Claim {
        #[arg(long)]
        link: String,
        /// Recipient address
        #[arg(long)]
        to: String,
        /// Chain the link's deposit lives on
        #[arg(long)]
        link_chain: String,
        /// Destination chain for a cross-chain claim
        #[arg(long, requires = "dest_token")]
        dest_chain: Option<String>,
        /// Destination token for a cross-chain claim
        #[arg(long, requires = "dest_chain")]
        dest_token: Option<String>,
    },
    /// List links saved by interrupted claims
    PendingClaims,
}

#[derive(ClapArgs, Debug)]
struct TransferArgs {
    /// Amount, e.g. "10.00"
    #[arg(long)]
    amount: String,
    /// Recipient address
    #[arg(long)]
    to: String,
    /// Destination chain ID (default: wallet chain)
    #[arg(long)]
    dest_chain: Option<String>,
    /// Destination token address (default: wallet token)
    #[arg(long)]
    dest_token: Option<String>,
    /// Destination token symbol (default: wallet token symbol)
    #[arg(long)]
    symbol: Option<String>,
    /// Destination token decimals (default: wallet token decimals)
    #[arg(long)]
    decimals: Option<u8>,
    /// Message attached to the charge
    #[arg(long)]
    message: Option<String>,
}

impl TransferArgs {
    fn into_intent(self, config: &SequencerConfig, transaction_type: TransactionType) -> PaymentIntent {
        let source = TokenLocation::new(
            config.wallet.chain_id.to_string(),
            config.wallet.token_address.clone(),
        );
        let destination = TokenLocation::new(
            self.dest_chain.unwrap_or_else(|| source.chain_id.clone()),
            self.dest_token.unwrap_or_else(|| source.token_address.clone()),
        );
        PaymentIntent {
            amount: self.amount,
            currency: "USD".to_string(),
            source,
            destination,
            recipient_address: self.to,
            token_symbol: self.symbol.unwrap_or_else(|| config.wallet.token_symbol.clone()),
            token_decimals: self.decimals.unwrap_or(config.wallet.token_decimals),
            transaction_type,
            request_id: None,
            attachment: self.message.map(|message| payment_sequencer::types::Attachment {
                message: Some(message),
                file: None,
            }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first (before initializing logging)
    let args = Args::parse();

    // Initialize structured logging
    tracing_subscriber::fmt::init();

    // Priority: CLI arg > env var > default
    let config = if let Some(path) = &args.config {
        info!("Loading configuration from: {}", path);
        SequencerConfig::load_from_path(Some(path))?
    } else {
        if let Ok(path) = std::env::var("SEQUENCER_CONFIG_PATH") {
            info!("Loading configuration from SEQUENCER_CONFIG_PATH: {}", path);
        } else {
            info!("Loading configuration from default location");
        }
        SequencerConfig::load()?
    };

    info!("Configuration loaded successfully");
    info!("Charge API: {}", config.service.api_url);
    info!("Routing API: {}", config.routing.api_url);
    info!("Price API: {}", config.prices.api_url);
    info!(
        "Wallet: {} ({:?}) on chain {}",
        config.wallet.address, config.wallet.kind, config.wallet.chain_id
    );

    if let Command::PendingClaims = args.command {
        let store = PendingClaimStore::open(&config.storage.pending_claims_path).await?;
        for claim in store.list().await {
            println!("{}\t{}\t{}", claim.created_at.to_rfc3339(), claim.key, claim.link);
        }
        return Ok(());
    }

    let timeout = config.request_timeout();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let integrator_id = config.integrator_id()?;
    let status: Arc<dyn StatusService> = Arc::new(HttpStatusClient::new(
        &config.status.api_url,
        &integrator_id,
        timeout,
    )?);
    let poller = SettlementPoller::new(
        status.clone(),
        clock.clone(),
        Duration::from_millis(config.status.poll_interval_ms),
        config.status.max_attempts,
    );

    match args.command {
        Command::Status { tx, wait } => {
            if wait {
                let outcome = poller.wait_for_settlement(&tx).await;
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                    "state": outcome.state,
                    "sourceTxHash": outcome.source_tx_hash,
                    "destinationTxHash": outcome.destination_tx_hash,
                    "attempts": outcome.attempts,
                }))?);
            } else {
                let response = status
                    .check_transaction_status(&tx)
                    .await
                    .context("Failed to check transaction status")?;
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            return Ok(());
        }
        Command::Claim {
            link,
            to,
            link_chain,
            dest_chain,
            dest_token,
        } => {
            let claims: Arc<dyn ClaimService> =
                Arc::new(HttpClaimClient::new(&config.service.api_url, timeout)?);
            let store = Arc::new(PendingClaimStore::open(&config.storage.pending_claims_path).await?);
            let claimer = LinkClaimer::new(claims, poller, clock).with_store(store);
            let destination = match (dest_chain, dest_token) {
                (Some(chain), Some(token)) => Some(TokenLocation::new(chain, token)),
                _ => None,
            };
            match claimer.claim(&link, &to, &link_chain, destination.as_ref()).await {
                Ok(outcome) => {
                    info!(
                        "Claim complete: source={}, destination={}",
                        outcome.source_tx_hash, outcome.destination_tx_hash
                    );
                    return Ok(());
                }
                Err(e) => {
                    error!("Claim failed: {}", e);
                    anyhow::bail!("{}", e.user_message());
                }
            }
        }
        _ => {}
    }

    let wallet = Arc::new(JsonRpcWallet::from_config(&config.wallet, timeout)?);
    let prices: Arc<dyn PriceService> = Arc::new(HttpPriceClient::new(
        &config.prices.api_url,
        config.price_api_key()?,
        timeout,
    )?);
    let services = SequencerServices {
        charges: Arc::new(HttpChargeClient::new(&config.service.api_url, timeout)?),
        routing: Arc::new(HttpRoutingClient::new(
            &config.routing.api_url,
            &integrator_id,
            prices,
            timeout,
            config.routing.max_search_iterations,
        )?),
        status,
        wallet,
        clock,
    };
    let sequencer = PaymentSequencer::new(services, SequencerSettings::from_config(&config));

    let result = match args.command {
        Command::Send(transfer) => {
            sequencer
                .direct_send(transfer.into_intent(&config, TransactionType::DirectSend))
                .await
        }
        Command::Withdraw(transfer) => {
            sequencer
                .withdraw(transfer.into_intent(&config, TransactionType::Withdraw))
                .await
        }
        Command::AddMoney(transfer) => {
            sequencer
                .add_money(transfer.into_intent(&config, TransactionType::Deposit))
                .await
        }
        Command::PayRequest { charge_id } => sequencer.pay_request(&charge_id).await,
        Command::Route(transfer) => {
            let intent = transfer.into_intent(&config, TransactionType::Withdraw);
            match sequencer.prepare_route(&intent).await {
                Ok(Some(route)) => {
                    let min_received = route
                        .min_received(intent.token_decimals)
                        .map(|amount| format!("{} {}", amount, intent.token_symbol));
                    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                        "route": route,
                        "minReceived": min_received,
                    }))?);
                    return Ok(());
                }
                Ok(None) => {
                    info!("Same token and chain, no route needed");
                    return Ok(());
                }
                Err(e) => FlowResult::failure(&e),
            }
        }
        Command::Status { .. } | Command::Claim { .. } | Command::PendingClaims => return Ok(()),
    };

    report(&result)
}

/// Prints a flow result and turns failures into a non-zero exit.
fn report(result: &FlowResult) -> Result<()> {
    if result.success {
        info!(
            "Payment complete: tx_hash={}, destination_tx_hash={}",
            result.tx_hash.as_deref().unwrap_or("-"),
            result.destination_tx_hash.as_deref().unwrap_or("-")
        );
        if let Some(payment) = &result.payment {
            println!("{}", serde_json::to_string_pretty(payment)?);
        }
        return Ok(());
    }

    error!(
        "Payment failed [{}]: {}",
        result.error_code.as_deref().unwrap_or("UNKNOWN"),
        result.error.as_deref().unwrap_or("unknown error")
    );
    if let Some(tx_hash) = &result.tx_hash {
        error!("Funds already moved on-chain in transaction {}", tx_hash);
    }
    anyhow::bail!(
        "{}",
        result
            .user_message
            .as_deref()
            .unwrap_or("Something went wrong. Please try again later.")
    )
}

//! Portfolio risk manager - entry point.
//!
//! One subcommand per façade operation; the HTTP layer that would publish
//! these lives outside this binary.

use anyhow::Result;
use clap::{Parser, Subcommand};
use riskguard_app::{csv, logging, AppConfig, AppError, BackendKind, RiskService};
use riskguard_core::BrokerGateway;
use riskguard_fx::FxCache;
use riskguard_rest::{PortalClient, RestGateway};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Portfolio risk manager for broker accounts.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via RISKGUARD_CONFIG).
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Broker connection status.
    Status,
    /// Probe session liveness.
    Keepalive,
    /// All positions across configured accounts.
    Positions,
    /// All orders across configured accounts.
    Orders,
    /// Worst-case risk report.
    Risk {
        /// Only positions without an actual stop order.
        #[arg(long)]
        unprotected_only: bool,
        /// Render as CSV instead of JSON.
        #[arg(long)]
        csv: bool,
    },
    /// Create stops for every unprotected position.
    Protect {
        #[arg(long, default_value = "10")]
        loss_percentage: Decimal,
    },
    /// Create a stop for one contract id, in every account that holds it.
    ProtectConid {
        conid: i64,
        #[arg(long, default_value = "10")]
        loss_percentage: Decimal,
    },
    /// Create a stop for one ticker, in every account that holds it.
    ProtectTicker {
        ticker: String,
        #[arg(long, default_value = "10")]
        loss_percentage: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };
    config.validate()?;

    logging::init_logging(&config.telemetry.log_level);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.backend,
        accounts = config.risk.accounts.len(),
        "Starting riskguard"
    );

    let gateway = build_gateway(&config)?;

    let fx = Arc::new(FxCache::new(config.risk.base_currency.clone())?);
    fx.refresh().await;

    let service = RiskService::new(
        gateway.clone(),
        fx,
        config.risk.unprotected_loss_percentage,
    );

    // Startup probe: a dead session should be loud before any operation runs.
    if !matches!(args.command, Command::Status) {
        let status = gateway.connection_status().await;
        if status.authenticated {
            info!("broker session is authenticated and ready");
        } else {
            warn!(message = %status.message, "broker session is NOT authenticated");
        }
    }

    run_command(args.command, &service, &gateway).await
}

async fn run_command(
    command: Command,
    service: &RiskService,
    gateway: &Arc<dyn BrokerGateway>,
) -> Result<()> {
    match command {
        Command::Status => {
            let status = gateway.connection_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Keepalive => {
            println!("{}", gateway.keep_alive().await);
        }
        Command::Positions => {
            let positions = gateway.all_positions().await?;
            println!("{}", serde_json::to_string_pretty(&positions)?);
        }
        Command::Orders => {
            let orders = gateway.all_orders().await?;
            println!("{}", serde_json::to_string_pretty(&orders)?);
        }
        Command::Risk {
            unprotected_only,
            csv: as_csv,
        } => {
            let mut report = service.worst_case_report().await?;
            if unprotected_only {
                report = RiskService::unprotected_only(report);
            }
            if as_csv {
                print!("{}", csv::render_csv(&report));
            } else {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Command::Protect { loss_percentage } => {
            let mut results = Vec::new();
            for account_id in gateway.configured_accounts() {
                results.extend(
                    service
                        .create_missing_stop_losses(account_id, loss_percentage)
                        .await?,
                );
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::ProtectConid {
            conid,
            loss_percentage,
        } => {
            let results = service
                .protect_conid_across_accounts(conid, loss_percentage)
                .await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::ProtectTicker {
            ticker,
            loss_percentage,
        } => {
            let results = service
                .protect_ticker_across_accounts(&ticker, loss_percentage)
                .await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }
    Ok(())
}

fn build_gateway(config: &AppConfig) -> Result<Arc<dyn BrokerGateway>, AppError> {
    match config.backend {
        BackendKind::Rest => {
            let client = PortalClient::new(
                config.rest.base_url.clone(),
                config.rest.session_cookie.as_deref(),
                config.rest.accept_invalid_certs,
            )?;
            Ok(Arc::new(RestGateway::with_delays(
                client,
                config.risk.accounts.clone(),
                Duration::from_millis(config.rest.switch_delay_ms),
                Duration::from_millis(config.rest.refresh_delay_ms),
            )))
        }
        BackendKind::Tws => Err(AppError::Config(format!(
            "the tws backend ({}:{}, client id {}) needs a socket codec wired to \
             riskguard_tws::SocketGateway::start; this binary ships with the rest backend",
            config.tws.host, config.tws.port, config.tws.client_id
        ))),
    }
}

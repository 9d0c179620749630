//! Iron Condor - Main Entry Point
//!
//! Runs the Iron Condor control loop live against Kite Connect, replays it
//! over historical candles, or exchanges a Kite request token for an access
//! token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use iron_condor::backtest::candles::{filter_window, load_candles, parse_timestamp};
use iron_condor::backtest::{load_option_quotes, OptionQuotes};
use iron_condor::config::{load_config, AppConfig};
use iron_condor::strategy::journal::to_jsonl;
use iron_condor::{
    Clock, ExecutionSurface, KiteRestClient, LiveScheduler, LiveSurface, OrderGateway,
    ReplayDriver, StrategyController, SystemClock, TradeJournal,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides settings.log_level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Trade live through Kite Connect until an exit rule fires, Ctrl-C or SIGTERM
    Live {
        /// Enter as soon as the market is open, ignoring entry day and time
        #[arg(long)]
        enter_now: bool,
    },
    /// Replay historical candles through the strategy
    Backtest {
        /// CSV or JSON candle file; overrides backtest.data_file
        #[arg(long)]
        data: Option<String>,
        /// Inclusive window start (RFC 3339)
        #[arg(long, value_parser = parse_cli_timestamp)]
        start: Option<DateTime<Utc>>,
        /// Inclusive window end (RFC 3339)
        #[arg(long, value_parser = parse_cli_timestamp)]
        end: Option<DateTime<Utc>>,
        /// Mark open positions to market (option quotes, else the candle close)
        #[arg(long)]
        mark_to_market: bool,
        /// CSV of per-option quotes; overrides backtest.option_quotes
        #[arg(long)]
        option_quotes: Option<String>,
    },
    /// Exchange a login request token for an access token
    Session {
        #[arg(long, env = "KITE_REQUEST_TOKEN")]
        request_token: String,
    },
}

fn parse_cli_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_timestamp(value).map_err(|e| e.to_string())
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(Some(args.config.as_str()))?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_logging(&level, args.log_format)?;

    info!("Starting Iron Condor");
    info!("Configuration file: {}", args.config);
    config.validate()?;

    match args.command {
        Command::Live { enter_now } => run_live(config, enter_now).await,
        Command::Backtest {
            data,
            start,
            end,
            mark_to_market,
            option_quotes,
        } => {
            run_backtest(config, data, start, end, mark_to_market, option_quotes).await
        }
        Command::Session { request_token } => run_session(config, &request_token).await,
    }
}

fn open_journal(config: &AppConfig) -> Result<TradeJournal> {
    Ok(match &config.settings.journal_path {
        Some(path) => TradeJournal::with_file(path)
            .with_context(|| format!("opening trade journal {}", path))?,
        None => TradeJournal::new(),
    })
}

/// Resolves on the first SIGINT or SIGTERM
///
/// The handlers are registered before this returns, so a signal that arrives
/// while the future is not yet polled is still delivered.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT, cleaning up..."),
            _ = terminate.recv() => info!("Received SIGTERM, cleaning up..."),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    })
}

async fn run_live(config: AppConfig, enter_now: bool) -> Result<()> {
    let shutdown = shutdown_signal()?;
    let timeout = Duration::from_secs(config.settings.request_timeout_seconds);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateway = OrderGateway::new(config.orders.clone());

    let rest = LiveSurface::rest_client(&config.kite, timeout)?;
    let surface: Arc<dyn ExecutionSurface> = Arc::new(LiveSurface::new(
        rest,
        gateway.clone(),
        config.session.clone(),
        clock.clone(),
        config.strategy.product.clone(),
    ));

    let mut controller = StrategyController::new(
        surface.clone(),
        clock.clone(),
        config.strategy.clone(),
        config.session.clone(),
        gateway,
    )?
    .with_journal(open_journal(&config)?);
    let scheduler = LiveScheduler::new(surface.clone(), clock, config.session.clone());

    info!(
        underlying = %config.strategy.underlying,
        lots = config.strategy.lots,
        enter_now,
        "Live strategy initialized"
    );

    let task =
        tokio::spawn(async move { scheduler.run(&mut controller, enter_now, shutdown).await });

    match task.await {
        Ok(reason) => info!(reason = %reason, "Live run finished"),
        Err(e) => {
            error!(error = %e, "Strategy task failed, closing all positions");
            let outcomes = surface.close_all_positions().await;
            let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
            if failed > 0 {
                warn!(failed, "Some positions could not be closed");
            }
            anyhow::bail!("strategy task failed: {}", e);
        }
    }
    Ok(())
}

async fn run_backtest(
    config: AppConfig,
    data: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    mark_to_market: bool,
    option_quotes: Option<String>,
) -> Result<()> {
    let path = data
        .or_else(|| config.backtest.data_file.clone())
        .context("no candle file: pass --data or set backtest.data_file")?;
    let candles = filter_window(
        load_candles(&path)?,
        start.or(config.backtest.start),
        end.or(config.backtest.end),
    );

    let quotes = match option_quotes.or_else(|| config.backtest.option_quotes.clone()) {
        Some(path) => load_option_quotes(&path)
            .with_context(|| format!("loading option quotes {}", path))?,
        None => OptionQuotes::new(),
    };

    let report = ReplayDriver::from_config(&config)
        .with_mark_to_market(mark_to_market || config.backtest.mark_to_market)
        .with_option_quotes(quotes)
        .run(&candles)
        .await?;

    if let Some(journal_path) = &config.settings.journal_path {
        std::fs::write(journal_path, to_jsonl(&report.journal))
            .with_context(|| format!("writing trade journal {}", journal_path))?;
    }

    println!("=== Backtesting Summary ===");
    println!("Candles: {} (ticked {})", report.candles, report.ticks);
    println!("Entry: {:?}", report.entry);
    match report.outcome {
        Some(reason) => println!("Exit: {}", reason),
        None => println!("Exit: data ended with positions open"),
    }
    println!("\nTrade Log:");
    for fill in &report.fills {
        println!(
            "{} {} {} {} x{} @ {}",
            fill.timestamp, fill.order_id, fill.side, fill.instrument, fill.quantity, fill.price
        );
    }
    for position in report.open_positions.values() {
        println!("Open: {} {}", position.instrument, position.quantity);
    }
    println!("\nFinal simulated PNL: {}", report.final_pnl);
    Ok(())
}

async fn run_session(config: AppConfig, request_token: &str) -> Result<()> {
    let api_key = config
        .kite
        .api_key
        .as_deref()
        .context("kite.api_key (or KITE_API_KEY) is not set")?;
    let api_secret = config
        .kite
        .api_secret
        .as_deref()
        .context("kite.api_secret (or KITE_API_SECRET) is not set")?;

    let rest = KiteRestClient::with_timeout(
        &config.kite.base_url,
        Duration::from_secs(config.settings.request_timeout_seconds),
    )?;
    let session = rest
        .generate_session(api_key, request_token, api_secret)
        .await?;

    info!(user_id = %session.user_id, "Session generated");
    println!("KITE_ACCESS_TOKEN={}", session.access_token);
    Ok(())
}

//! Kursy CLI
//!
//! Prints exchange-rate snapshots, quotes and conversions as JSON.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kursy_common::{Currency, CurrencyPair, Money};
use kursy_fx::{
    ConversionRequest, FxError, QuoteBoard, QuoteConfig, RateService, RateServiceConfig, RateServiceStats,
    RateSide,
};

/// Kursy exchange-rate CLI
#[derive(Parser, Debug)]
#[command(name = "kursy")]
#[command(about = "Exchange rates against PLN from the central bank, with fallback")]
struct Args {
    /// Fail instead of serving placeholder rates when providers are down
    #[arg(long, global = true)]
    strict: bool,

    /// Total bid/ask spread in basis points
    #[arg(long, global = true, default_value = "50")]
    spread_bps: u32,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current rate snapshot
    Rates,

    /// Quote one currency in another
    Quote {
        /// Currency being priced
        base: String,
        /// Currency the price is expressed in
        #[arg(default_value = "PLN")]
        quote: String,
    },

    /// Convert an amount between currencies
    Convert {
        amount: Decimal,
        from: String,
        to: String,
        /// Side of the quote to apply: bid, ask or mid
        #[arg(long, default_value = "mid")]
        side: RateSide,
    },

    /// Poll the service and report cache behaviour
    Watch {
        /// Seconds between polls
        #[arg(long, default_value = "60")]
        interval: u64,
        /// Run duration in seconds (0 = infinite)
        #[arg(long, default_value = "0")]
        duration: u64,
    },
}

#[derive(Debug, Serialize)]
struct WatchReport<'a> {
    source: &'a str,
    fetched_at: &'a str,
    currencies: usize,
    stats: RateServiceStats,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries JSON output only.
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Fx(#[from] FxError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    fn error_code(&self) -> &'static str {
        match self {
            CliError::Fx(e) => e.error_code(),
            CliError::Output(_) => "OUTPUT_ERROR",
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    let config = RateServiceConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!(
        base = %config.base,
        ttl_secs = config.ttl.as_secs(),
        primary = %config.primary.base_url,
        fallback = %config.fallback.base_url,
        worst_case_ms = config.worst_case_latency().as_millis() as u64,
        "Starting Kursy"
    );

    let service = Arc::new(RateService::from_config(config)?);
    let board = QuoteBoard::new(
        service,
        QuoteConfig {
            spread_bps: args.spread_bps,
            placeholder_on_failure: !args.strict,
        },
    )?;

    if let Err(e) = run(&board, args.command).await {
        error!(code = e.error_code(), error = %e, "Command failed");
        return Err(e.into());
    }

    Ok(())
}

async fn run(board: &QuoteBoard, command: Command) -> Result<(), CliError> {
    match command {
        Command::Rates => {
            let snapshot = board.snapshot().await?;
            print_json(&*snapshot)?;
        }
        Command::Quote { base, quote } => {
            let pair = CurrencyPair::new(Currency::new(base), Currency::new(quote));
            let rate = board.quote(&pair).await?;
            print_json(&rate)?;
        }
        Command::Convert {
            amount,
            from,
            to,
            side,
        } => {
            let mut request =
                ConversionRequest::new(Money::new(amount, Currency::new(from)), Currency::new(to));
            request.rate_side = side;

            let conversion = board.convert(request).await?;
            print_json(&conversion)?;
        }
        Command::Watch { interval, duration } => {
            watch(board, Duration::from_secs(interval.max(1)), duration).await?;
        }
    }

    Ok(())
}

async fn watch(board: &QuoteBoard, interval: Duration, duration_secs: u64) -> Result<(), CliError> {
    let deadline = (duration_secs > 0)
        .then(|| tokio::time::Instant::now() + Duration::from_secs(duration_secs));
    let mut ticker = tokio::time::interval(interval);

    info!("Watching rates, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }

        let snapshot = board.snapshot().await?;
        print_json(&WatchReport {
            source: snapshot.source.as_str(),
            fetched_at: &snapshot.fetched_at,
            currencies: snapshot.foreign_count(),
            stats: board.service().stats(),
        })?;

        if deadline.is_some_and(|deadline| tokio::time::Instant::now() >= deadline) {
            break;
        }
    }

    info!(stats = ?board.service().stats(), "Watch finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert_with_side() {
        let args = Args::try_parse_from(["kursy", "convert", "100.50", "eur", "pln", "--side", "ask"])
            .unwrap();

        match args.command {
            Command::Convert { amount, from, to, side } => {
                assert_eq!(amount, Decimal::new(10050, 2));
                assert_eq!(from, "eur");
                assert_eq!(to, "pln");
                assert_eq!(side, RateSide::Ask);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_quote_defaults_to_pln() {
        let args = Args::try_parse_from(["kursy", "--strict", "quote", "USD"]).unwrap();

        assert!(args.strict);
        assert_eq!(args.spread_bps, 50);
        assert!(matches!(args.command, Command::Quote { ref quote, .. } if quote == "PLN"));
    }

    #[test]
    fn test_parse_rejects_unknown_side() {
        assert!(Args::try_parse_from(["kursy", "convert", "1", "EUR", "PLN", "--side", "spot"]).is_err());
    }
}

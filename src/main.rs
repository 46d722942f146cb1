// =============================================================================
// Risk Sentinel — command-line runner
// =============================================================================
//
// Runs one operation from the command line and prints the report as JSON.
// Configuration comes from `risk_config.json` (defaults when missing), with
// `SENTINEL_WATCHLIST` and `SENTINEL_CLASSIFIER_KEY` read from the
// environment or `.env`.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use risk_sentinel::{
    EngineConfig, HttpClassifier, MarketDataSource, ReportedFigures, RiskEngine, TextClassifier,
    YahooChartClient,
};

#[derive(Parser)]
#[command(name = "risk-sentinel")]
#[command(about = "Fraud and pump-and-dump risk scoring for stock symbols and announcements", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine configuration file.
    #[arg(short, long, default_value = "risk_config.json")]
    config: PathBuf,

    /// Skip the market-data collaborator (synthetic baseline only).
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one symbol from market data and tracked mentions
    Symbol { symbol: String },

    /// Score a message, recording it against an entity
    Message {
        #[arg(short, long)]
        entity: String,
        text: String,
    },

    /// Verify a corporate announcement
    Verify {
        #[arg(short, long)]
        symbol: String,

        /// DD-Mon-YYYY, YYYY-MM-DD or DD-MM-YYYY
        #[arg(short, long)]
        date: String,

        /// Daily bars and a ±30 day window instead of the configured mode
        #[arg(long)]
        full: bool,

        /// Reported revenue growth, percent
        #[arg(long)]
        revenue_growth: Option<f64>,

        /// Reported profit growth, percent
        #[arg(long)]
        profit_growth: Option<f64>,

        text: String,
    },

    /// Scan symbols (the watchlist when none given) and list flagged ones
    Scan { symbols: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });
    if let Ok(list) = std::env::var("SENTINEL_WATCHLIST") {
        config.watchlist = list
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    let source: Option<Arc<dyn MarketDataSource>> = if cli.offline {
        None
    } else {
        match YahooChartClient::new(Duration::from_secs(config.fetch_timeout_secs)) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "market data client unavailable, using synthetic baseline");
                None
            }
        }
    };

    let classifier: Option<Arc<dyn TextClassifier>> = match std::env::var("SENTINEL_CLASSIFIER_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            match HttpClassifier::new(key.trim(), Duration::from_secs(config.fetch_timeout_secs)) {
                Ok(c) => Some(Arc::new(c)),
                Err(e) => {
                    warn!(error = %e, "classifier disabled");
                    None
                }
            }
        }
        _ => None,
    };

    let default_fast = config.fast_mode;
    let engine = RiskEngine::new(config, source, classifier);
    info!(engine = ?engine, "Risk Sentinel ready");

    match cli.command {
        Commands::Symbol { symbol } => print(&engine.analyze_symbol(&symbol).await?),
        Commands::Message { entity, text } => print(&engine.ingest_message(&entity, &text)?),
        Commands::Verify {
            symbol,
            date,
            full,
            revenue_growth,
            profit_growth,
            text,
        } => {
            let reported = ReportedFigures {
                revenue_growth_pct: revenue_growth,
                profit_growth_pct: profit_growth,
            };
            let fast = default_fast && !full;
            print(&engine.verify_announcement(&symbol, &text, &date, reported, fast).await?)
        }
        Commands::Scan { symbols } => {
            let flagged = if symbols.is_empty() {
                engine.scan_watchlist().await
            } else {
                engine.scan_symbols(&symbols).await
            };
            print(&flagged)
        }
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialise report")?;
    println!("{json}");
    Ok(())
}

//! Command-line reports over a directory of daily price CSVs.
//!
//! Subcommands:
//!   - `summary`  asset counts, date range and latest quotes
//!   - `forecast` ARIMA and LSTM forecasts for one asset
//!   - `compare`  accuracy table and winners across all assets
//!   - `export`   forecast CSV for one asset
//!   - `asset`    JSON snapshot of one asset

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use forecast_compare::{
    batch_compare, forecast_rows, write_forecast_csv, AssetClass, AssetSnapshot, AssetUniverse,
    ComparisonRow, ComparisonSummary, DataLoader, ForecastBundle, ForecastConfig, ForecastEngine,
    ModelOutcome,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "forecast_report",
    version = forecast_compare::VERSION,
    about = "Compare ARIMA and LSTM forecasts on crypto and stock price histories",
    propagate_version = true
)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory with crypto_*.csv and stock_*.csv files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Asset counts, date coverage and latest quotes
    Summary,
    /// Forecast one asset with both models
    Forecast {
        #[arg(long)]
        asset: String,
        /// Days to forecast; defaults to the configured horizon
        #[arg(long)]
        horizon: Option<usize>,
    },
    /// Compare model accuracy across every loaded asset
    Compare,
    /// Write the forecast of one asset as CSV
    Export {
        #[arg(long)]
        asset: String,
        #[arg(long)]
        horizon: Option<usize>,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print one asset's history and features as JSON
    Asset { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ForecastConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ForecastConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data.dir = dir.clone();
    }

    init_tracing(&config.logging.level);

    let universe = DataLoader::load_dir(&config.data.dir)
        .with_context(|| format!("failed to load assets from {}", config.data.dir.display()))?;
    if universe.is_empty() {
        bail!("no price files found in {}", config.data.dir.display());
    }

    match cli.command {
        Commands::Summary => print_summary(&universe),
        Commands::Forecast { asset, horizon } => {
            let engine = ForecastEngine::new(&config)?;
            let horizon = horizon.unwrap_or(engine.horizon());
            let bundle = engine.train_and_forecast_asset(&universe, &asset, horizon)?;
            print_forecast(&bundle)
        }
        Commands::Compare => {
            let engine = ForecastEngine::new(&config)?;
            print_comparison(&engine, &universe)
        }
        Commands::Export {
            asset,
            horizon,
            output,
        } => {
            let engine = ForecastEngine::new(&config)?;
            let horizon = horizon.unwrap_or(engine.horizon());
            let bundle = engine.train_and_forecast_asset(&universe, &asset, horizon)?;
            let rows = forecast_rows(&bundle)?;
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    write_forecast_csv(&rows, BufWriter::new(file))?;
                    eprintln!("wrote {} rows to {}", rows.len(), path.display());
                }
                None => write_forecast_csv(&rows, io::stdout().lock())?,
            }
            Ok(())
        }
        Commands::Asset { name } => {
            let asset = universe
                .get(&name)
                .with_context(|| format!("asset {} not found", name))?;
            println!("{}", AssetSnapshot::from_asset(asset).to_json()?);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over the configured level; logs go to stderr
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_summary(universe: &AssetUniverse) -> Result<()> {
    let mut out = io::stdout().lock();

    writeln!(
        out,
        "Assets: {} ({} crypto, {} stock)",
        universe.len(),
        universe.names(Some(AssetClass::Crypto)).len(),
        universe.names(Some(AssetClass::Stock)).len()
    )?;
    if let Some((first, last)) = universe.date_range() {
        writeln!(out, "Coverage: {} to {}", first, last)?;
    }

    writeln!(out)?;
    writeln!(out, "{:<12} {:<7} {:>12} {:>9}", "Asset", "Class", "Close", "Change")?;
    for asset in universe.iter() {
        let Some(quote) = asset.series.latest_quote() else {
            continue;
        };
        let change = quote
            .change_pct
            .map_or_else(|| "-".to_string(), |c| format!("{:+.2}%", c));
        writeln!(
            out,
            "{:<12} {:<7} {:>12.2} {:>9}",
            asset.name, asset.class, quote.close, change
        )?;
    }
    Ok(())
}

fn outcome_label<M>(outcome: &ModelOutcome<M>) -> String {
    match outcome.reason() {
        Some(reason) => format!("{} (fallback: {})", outcome.metrics(), reason),
        None => outcome.metrics().to_string(),
    }
}

fn print_forecast(bundle: &ForecastBundle) -> Result<()> {
    let mut out = io::stdout().lock();

    writeln!(out, "{} forecast after {}", bundle.asset, bundle.last_date)?;
    writeln!(out, "ARIMA: {}", outcome_label(&bundle.arima))?;
    writeln!(out, "LSTM:  {}", outcome_label(&bundle.lstm))?;
    writeln!(out)?;

    writeln!(out, "{:<12} {:>14} {:>14}", "Date", "ARIMA", "LSTM")?;
    for row in forecast_rows(bundle)? {
        writeln!(out, "{:<12} {:>14.2} {:>14.2}", row.date, row.arima, row.lstm)?;
    }
    Ok(())
}

fn print_comparison(engine: &ForecastEngine, universe: &AssetUniverse) -> Result<()> {
    let rows = batch_compare(engine, universe)?;
    let mut out = io::stdout().lock();

    writeln!(
        out,
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}  {:<6} {}",
        "Asset", "ARIMA MAE", "RMSE", "MAPE", "LSTM MAE", "RMSE", "MAPE", "Winner", "Fallback"
    )?;
    for row in &rows {
        writeln!(
            out,
            "{:<12} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}  {:<6} {}",
            row.asset,
            row.arima.mae,
            row.arima.rmse,
            row.arima.mape,
            row.lstm.mae,
            row.lstm.rmse,
            row.lstm.mape,
            row.winner.to_string(),
            fallback_marker(row),
        )?;
    }

    let summary = ComparisonSummary::from_rows(&rows);
    writeln!(out)?;
    writeln!(
        out,
        "ARIMA wins {} / LSTM wins {} over {} assets",
        summary.arima_wins, summary.lstm_wins, summary.assets
    )?;
    writeln!(
        out,
        "Mean MAE: ARIMA {:.2}, LSTM {:.2}",
        summary.arima_mean_mae, summary.lstm_mean_mae
    )?;
    if rows.iter().any(|r| r.arima_degraded || r.lstm_degraded) {
        writeln!(
            out,
            "A*: ARIMA used the fallback projection, L*: LSTM did; their metrics are zero"
        )?;
    }
    Ok(())
}

/// Which models of a comparison row fell back to the naive projection
fn fallback_marker(row: &ComparisonRow) -> &'static str {
    match (row.arima_degraded, row.lstm_degraded) {
        (false, false) => "",
        (true, false) => "A*",
        (false, true) => "L*",
        (true, true) => "A* L*",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_compare::{Metrics, ModelKind};

    fn row(arima_degraded: bool, lstm_degraded: bool) -> ComparisonRow {
        ComparisonRow {
            asset: "BTC".to_string(),
            arima: Metrics::zero(),
            lstm: Metrics::zero(),
            winner: ModelKind::Arima,
            arima_degraded,
            lstm_degraded,
        }
    }

    #[test]
    fn fallback_marker_names_the_degraded_model() {
        assert_eq!(fallback_marker(&row(false, false)), "");
        assert_eq!(fallback_marker(&row(true, false)), "A*");
        assert_eq!(fallback_marker(&row(false, true)), "L*");
        assert_eq!(fallback_marker(&row(true, true)), "A* L*");
    }
}

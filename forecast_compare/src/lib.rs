//! # Forecast Compare
//!
//! ARIMA versus LSTM forecasting of daily close prices for crypto and
//! equity assets, with holdout accuracy metrics and batch comparison.
//!
//! ## Features
//!
//! - Price CSV ingestion with polars and derived features (daily return,
//!   30-day volatility, 50-day moving average)
//! - ARIMA with stepwise AIC order search or a fixed order
//! - Stacked LSTM trained on min-max normalised sliding windows
//! - Per-asset forecast bundles and universe-wide comparison tables
//! - Forecast CSV export and JSON asset snapshots
//!
//! A forecaster that cannot fit falls back to a straight line from the last
//! close to 5% above it, reported as [`ModelOutcome::Degraded`] with zero
//! metrics.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use forecast_compare::{ForecastConfig, ForecastEngine, PriceSeries};
//!
//! # fn main() -> forecast_compare::Result<()> {
//! let config = ForecastConfig::from_toml_str(
//!     "[arima]\nmode = \"fixed\"\n[sequence]\nenabled = false",
//! )?;
//! let engine = ForecastEngine::new(&config)?;
//!
//! let closes: Vec<f64> = (0..120).map(|t| 100.0 + t as f64).collect();
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let series = PriceSeries::from_closes(start, &closes)?;
//!
//! let bundle = engine.train_and_forecast(&series, "DEMO", 5)?;
//! assert_eq!(bundle.arima.forecast().len(), 5);
//! assert!(bundle.lstm.is_degraded());
//! # Ok(())
//! # }
//! ```

pub mod comparison;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod utils;

// Re-export commonly used types
pub use crate::comparison::{batch_compare, pick_winner, ComparisonRow, ComparisonSummary};
pub use crate::config::ForecastConfig;
pub use crate::data::{Asset, AssetClass, AssetUniverse, DataLoader, PriceSeries};
pub use crate::engine::{Capabilities, ForecastBundle, ForecastEngine};
pub use crate::error::{ForecastError, Result};
pub use crate::export::{forecast_rows, write_forecast_csv, AssetSnapshot, ForecastRow};
pub use crate::metrics::{calculate_metrics, Metrics};
pub use crate::models::{
    DegradeReason, ForecastModel, ForecastResult, ModelKind, ModelOutcome, TrainedForecastModel,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! Batch comparison of ARIMA and LSTM accuracy across a universe

use crate::data::AssetUniverse;
use crate::engine::ForecastEngine;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::models::ModelKind;
use crate::utils::round2;
use serde::Serialize;
use tracing::info;

/// Accuracy of both models on one asset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub asset: String,
    pub arima: Metrics,
    pub lstm: Metrics,
    pub winner: ModelKind,
    /// ARIMA fell back to the naive projection; its metrics are zero
    pub arima_degraded: bool,
    /// LSTM fell back to the naive projection; its metrics are zero
    pub lstm_degraded: bool,
}

/// Lower MAE wins; ARIMA keeps ties
pub fn pick_winner(arima: &Metrics, lstm: &Metrics) -> ModelKind {
    if arima.mae <= lstm.mae {
        ModelKind::Arima
    } else {
        ModelKind::Lstm
    }
}

/// Forecast every asset in universe order and tabulate the metrics
pub fn batch_compare(
    engine: &ForecastEngine,
    universe: &AssetUniverse,
) -> Result<Vec<ComparisonRow>> {
    universe
        .iter()
        .map(|asset| {
            let bundle = engine.train_and_forecast(&asset.series, &asset.name, engine.horizon())?;
            let arima = bundle.arima.metrics();
            let lstm = bundle.lstm.metrics();
            let winner = pick_winner(&arima, &lstm);
            info!(asset = %asset.name, %winner, "compared");

            Ok(ComparisonRow {
                asset: bundle.asset,
                arima,
                lstm,
                winner,
                arima_degraded: bundle.arima.is_degraded(),
                lstm_degraded: bundle.lstm.is_degraded(),
            })
        })
        .collect()
}

/// Win counts and mean MAE per model over a comparison table
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub assets: usize,
    pub arima_wins: usize,
    pub lstm_wins: usize,
    pub arima_mean_mae: f64,
    pub lstm_mean_mae: f64,
}

impl ComparisonSummary {
    pub fn from_rows(rows: &[ComparisonRow]) -> Self {
        if rows.is_empty() {
            return Self::default();
        }

        let n = rows.len() as f64;
        let arima_wins = rows.iter().filter(|r| r.winner == ModelKind::Arima).count();

        Self {
            assets: rows.len(),
            arima_wins,
            lstm_wins: rows.len() - arima_wins,
            arima_mean_mae: round2(rows.iter().map(|r| r.arima.mae).sum::<f64>() / n),
            lstm_mean_mae: round2(rows.iter().map(|r| r.lstm.mae).sum::<f64>() / n),
        }
    }
}

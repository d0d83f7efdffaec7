//! Forecast CSV export and per-asset JSON snapshots

use crate::data::Asset;
use crate::engine::ForecastBundle;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;

/// One forecast day with both models' predictions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "ARIMA_Forecast")]
    pub arima: f64,
    #[serde(rename = "LSTM_Forecast")]
    pub lstm: f64,
}

/// Rows for every forecast day, starting the day after the last observation
pub fn forecast_rows(bundle: &ForecastBundle) -> Result<Vec<ForecastRow>> {
    let dates = bundle.forecast_dates()?;

    Ok(dates
        .into_iter()
        .zip(bundle.arima.forecast())
        .zip(bundle.lstm.forecast())
        .map(|((date, &arima), &lstm)| ForecastRow { date, arima, lstm })
        .collect())
}

/// Write rows as CSV with a `Date,ARIMA_Forecast,LSTM_Forecast` header
pub fn write_forecast_csv<W: Write>(rows: &[ForecastRow], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if rows.is_empty() {
        csv_writer.write_record(["Date", "ARIMA_Forecast", "LSTM_Forecast"])?;
    }
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Column-oriented view of one asset for JSON consumers.
///
/// Feature warm-up gaps are reported as 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSnapshot {
    pub asset: String,
    pub dates: Vec<String>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub daily_return: Vec<f64>,
    pub volatility: Vec<f64>,
}

impl AssetSnapshot {
    pub fn from_asset(asset: &Asset) -> Self {
        let series = &asset.series;
        let features = series.features();

        Self {
            asset: asset.name.clone(),
            dates: series
                .dates()
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect(),
            close: series.closes(),
            volume: series.volumes(),
            daily_return: features
                .iter()
                .map(|f| f.daily_return.unwrap_or(0.0))
                .collect(),
            volatility: features
                .iter()
                .map(|f| f.volatility_30d.unwrap_or(0.0))
                .collect(),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

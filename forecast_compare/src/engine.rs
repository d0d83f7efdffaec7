//! Per-asset orchestration of the two forecasters

use crate::config::{ArimaMode, ForecastConfig};
use crate::data::{AssetUniverse, PriceSeries};
use crate::error::{ForecastError, Result};
use crate::models::arima::{ArimaCapability, ArimaForecaster, TrainedArimaModel};
use crate::models::order_search::OrderSearch;
use crate::models::sequence::{SequenceCapability, SequenceForecaster, TrainedSequenceModel};
use crate::models::ModelOutcome;
use crate::utils::future_dates;
use chrono::NaiveDate;
use tracing::info;

/// Model capabilities resolved from configuration
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub arima: ArimaCapability,
    pub sequence: SequenceCapability,
}

impl Capabilities {
    /// Resolve both capabilities once
    pub fn from_config(config: &ForecastConfig) -> Result<Self> {
        let arima = match config.arima.mode {
            ArimaMode::Auto => ArimaCapability::AutoOrder(OrderSearch::new(
                config.arima.max_p,
                config.arima.max_d,
                config.arima.max_q,
            )?),
            ArimaMode::Fixed => ArimaCapability::FixedOrder(config.arima.order()),
            ArimaMode::Disabled => ArimaCapability::Unavailable,
        };

        let sequence = if config.sequence.enabled {
            let model_config = config.sequence.to_model_config(config.engine.seed);
            model_config.validate()?;
            SequenceCapability::Available(model_config)
        } else {
            SequenceCapability::Unavailable
        };

        Ok(Self { arima, sequence })
    }
}

/// Both forecasts for one asset
#[derive(Debug, Clone)]
pub struct ForecastBundle {
    pub asset: String,
    /// Last observed date; forecasts start the day after
    pub last_date: NaiveDate,
    pub arima: ModelOutcome<TrainedArimaModel>,
    pub lstm: ModelOutcome<TrainedSequenceModel>,
}

impl ForecastBundle {
    /// Forecast horizon in days
    pub fn horizon(&self) -> usize {
        self.arima.forecast().len()
    }

    /// Calendar dates of the forecast steps
    pub fn forecast_dates(&self) -> Result<Vec<NaiveDate>> {
        future_dates(self.last_date, self.horizon())
    }
}

/// Runs the ARIMA and LSTM forecasters for assets of a universe.
///
/// The engine holds no per-call state; each call builds its own scaler and
/// models.
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    arima: ArimaForecaster,
    sequence: SequenceForecaster,
    horizon: usize,
}

impl ForecastEngine {
    /// Create an engine from validated configuration
    pub fn new(config: &ForecastConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_capabilities(
            Capabilities::from_config(config)?,
            config.engine.train_ratio,
            config.engine.horizon,
        ))
    }

    /// Create an engine from already-resolved capabilities
    pub fn with_capabilities(capabilities: Capabilities, train_ratio: f64, horizon: usize) -> Self {
        Self {
            arima: ArimaForecaster::new(capabilities.arima, train_ratio),
            sequence: SequenceForecaster::new(capabilities.sequence, train_ratio),
            horizon,
        }
    }

    /// Configured default horizon
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Run both forecasters on one series.
    ///
    /// Fitting failures never surface here; they arrive as degraded
    /// outcomes. Only invalid input is an error.
    pub fn train_and_forecast(
        &self,
        series: &PriceSeries,
        asset_id: &str,
        horizon: usize,
    ) -> Result<ForecastBundle> {
        let last_date = series
            .last_date()
            .ok_or_else(|| ForecastError::EmptySeries(asset_id.to_string()))?;
        if horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "horizon must be at least 1".to_string(),
            ));
        }

        info!(asset = asset_id, observations = series.len(), horizon, "forecasting");
        let closes = series.closes();
        let arima = self.arima.forecast(&closes, horizon);
        let lstm = self.sequence.forecast(&closes, horizon);

        Ok(ForecastBundle {
            asset: asset_id.to_string(),
            last_date,
            arima,
            lstm,
        })
    }

    /// Look up `asset_id` in `universe` and forecast it
    pub fn train_and_forecast_asset(
        &self,
        universe: &AssetUniverse,
        asset_id: &str,
        horizon: usize,
    ) -> Result<ForecastBundle> {
        let asset = universe
            .get(asset_id)
            .ok_or_else(|| ForecastError::AssetNotFound(asset_id.to_string()))?;
        self.train_and_forecast(&asset.series, &asset.name, horizon)
    }
}

//! Forecasting models for daily close prices

use crate::error::{ForecastError, Result};
use crate::metrics::Metrics;
use crate::utils::linspace;
use serde::Serialize;
use std::fmt::{self, Debug};

pub mod arima;
pub mod lstm;
pub mod order_search;
pub mod sequence;

/// Growth applied by the fallback projection over the whole horizon
pub const FALLBACK_GROWTH: f64 = 1.05;

/// Forecast result containing predicted values
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    /// Forecasted values
    values: Vec<f64>,
    /// Number of periods forecasted
    horizon: usize,
}

impl ForecastResult {
    /// Create a new forecast result
    pub fn new(values: Vec<f64>, horizon: usize) -> Result<Self> {
        if values.len() != horizon {
            return Err(ForecastError::ValidationError(format!(
                "Values length ({}) doesn't match horizon ({})",
                values.len(),
                horizon
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelError(
                "forecast contains non-finite values".to_string(),
            ));
        }

        Ok(Self { values, horizon })
    }

    /// Get the forecasted values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Get the number of periods forecasted
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Take the forecasted values
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug {
    /// Generate forecast for future periods
    fn forecast(&self, horizon: usize) -> Result<ForecastResult>;

    /// Name of the model
    fn name(&self) -> &str;
}

/// Forecast model that can be trained on a close-price series
pub trait ForecastModel: Debug + Clone {
    /// The type of trained model produced
    type Trained: TrainedForecastModel;

    /// Train the model on the full history
    fn train(&self, data: &[f64]) -> Result<Self::Trained>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

/// The two model families being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelKind {
    #[serde(rename = "ARIMA")]
    Arima,
    #[serde(rename = "LSTM")]
    Lstm,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Arima => write!(f, "ARIMA"),
            ModelKind::Lstm => write!(f, "LSTM"),
        }
    }
}

/// Why a forecaster fell back to the naive projection
#[derive(Debug, Clone, PartialEq)]
pub enum DegradeReason {
    /// The model family is switched off
    Unavailable,
    /// The series is too short for the model
    InsufficientData(String),
    /// Fitting or evaluation failed
    FitFailed(String),
}

impl From<ForecastError> for DegradeReason {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::InsufficientData(msg) => DegradeReason::InsufficientData(msg),
            other => DegradeReason::FitFailed(other.to_string()),
        }
    }
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::Unavailable => write!(f, "model unavailable"),
            DegradeReason::InsufficientData(msg) => write!(f, "insufficient data: {}", msg),
            DegradeReason::FitFailed(msg) => write!(f, "fit failed: {}", msg),
        }
    }
}

/// Result of running one forecaster on one asset.
///
/// A degraded outcome carries the naive projection and zero metrics; it can
/// never be mistaken for a fitted one.
#[derive(Debug, Clone)]
pub enum ModelOutcome<M> {
    Fitted {
        forecast: ForecastResult,
        metrics: Metrics,
        model: M,
    },
    Degraded {
        forecast: ForecastResult,
        metrics: Metrics,
        reason: DegradeReason,
    },
}

impl<M> ModelOutcome<M> {
    /// Fallback outcome: straight line from `last_close` to 5% above it
    pub fn degraded(last_close: f64, horizon: usize, reason: DegradeReason) -> Self {
        let values = naive_projection(last_close, horizon);
        ModelOutcome::Degraded {
            forecast: ForecastResult { values, horizon },
            metrics: Metrics::zero(),
            reason,
        }
    }

    /// Forecasted values
    pub fn forecast(&self) -> &[f64] {
        match self {
            ModelOutcome::Fitted { forecast, .. } | ModelOutcome::Degraded { forecast, .. } => {
                forecast.values()
            }
        }
    }

    /// Holdout metrics; zero for a degraded outcome
    pub fn metrics(&self) -> Metrics {
        match self {
            ModelOutcome::Fitted { metrics, .. } | ModelOutcome::Degraded { metrics, .. } => {
                *metrics
            }
        }
    }

    /// Fitted model handle, absent when degraded
    pub fn model(&self) -> Option<&M> {
        match self {
            ModelOutcome::Fitted { model, .. } => Some(model),
            ModelOutcome::Degraded { .. } => None,
        }
    }

    /// Reason for falling back, absent when fitted
    pub fn reason(&self) -> Option<&DegradeReason> {
        match self {
            ModelOutcome::Fitted { .. } => None,
            ModelOutcome::Degraded { reason, .. } => Some(reason),
        }
    }

    /// Whether the naive fallback was used
    pub fn is_degraded(&self) -> bool {
        matches!(self, ModelOutcome::Degraded { .. })
    }
}

/// Straight-line projection from `last_close` to `1.05 * last_close`.
///
/// Both endpoints are exact; a one-step horizon yields just `last_close`.
pub fn naive_projection(last_close: f64, horizon: usize) -> Vec<f64> {
    linspace(last_close, last_close * FALLBACK_GROWTH, horizon)
}

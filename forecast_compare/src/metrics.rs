//! Metrics for evaluating forecast performance

use crate::error::{ForecastError, Result};
use crate::utils::round2;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

/// Holdout accuracy of one forecaster, rounded to 2 decimals.
///
/// An all-zero value is what a degraded forecaster reports; check the
/// outcome variant rather than reading it as a perfect fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error, in percent
    pub mape: f64,
}

impl Metrics {
    /// Metrics reported alongside a fallback forecast
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every component is exactly zero
    pub fn is_zero(&self) -> bool {
        self.mae == 0.0 && self.rmse == 0.0 && self.mape == 0.0
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE {:.2}  RMSE {:.2}  MAPE {:.2}%",
            self.mae, self.rmse, self.mape
        )
    }
}

/// Compare predictions against actual values.
///
/// Actual values that are zero (within `f64::EPSILON`) are left out of the
/// MAPE mean; when no actual value is usable the MAPE is undefined and an
/// error is returned.
pub fn calculate_metrics(actual: &[f64], predicted: &[f64]) -> Result<Metrics> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(ForecastError::ValidationError(format!(
            "Actual ({}) and predicted ({}) values must have the same non-zero length",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.iter().chain(predicted).any(|v| !v.is_finite()) {
        return Err(ForecastError::ValidationError(
            "Metrics require finite actual and predicted values".to_string(),
        ));
    }

    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(&a, &p)| a - p)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).mean();
    let rmse = errors.iter().quadratic_mean();

    let pct_errors: Vec<f64> = actual
        .iter()
        .zip(&errors)
        .filter(|(a, _)| a.abs() > f64::EPSILON)
        .map(|(a, e)| (e / a).abs())
        .collect();
    if pct_errors.is_empty() {
        return Err(ForecastError::UndefinedMetric(
            "MAPE is undefined when every actual value is zero".to_string(),
        ));
    }
    let mape = pct_errors.iter().mean() * 100.0;

    Ok(Metrics {
        mae: round2(mae),
        rmse: round2(rmse),
        mape: round2(mape),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        let m = calculate_metrics(&[100.0, 200.0], &[110.0, 190.0]).unwrap();
        assert_eq!(m.mae, 10.0);
        assert_eq!(m.rmse, 10.0);
        assert_eq!(m.mape, 7.5);
    }

    #[test]
    fn values_are_rounded() {
        let m = calculate_metrics(&[3.0, 3.0, 3.0], &[2.0, 3.0, 3.0]).unwrap();
        assert_eq!(m.mae, 0.33);
        assert_eq!(m.rmse, 0.58);
        assert_eq!(m.mape, 11.11);
    }

    #[test]
    fn zero_actuals_are_skipped_in_mape() {
        let m = calculate_metrics(&[0.0, 50.0], &[1.0, 45.0]).unwrap();
        assert_eq!(m.mae, 3.0);
        assert_eq!(m.mape, 10.0);
    }

    #[test]
    fn all_zero_actuals_make_mape_undefined() {
        let err = calculate_metrics(&[0.0, 0.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ForecastError::UndefinedMetric(_)));
    }

    #[test]
    fn mismatched_or_empty_inputs_are_rejected() {
        assert!(calculate_metrics(&[], &[]).is_err());
        assert!(calculate_metrics(&[1.0], &[1.0, 2.0]).is_err());
        assert!(calculate_metrics(&[1.0], &[f64::NAN]).is_err());
    }

    #[test]
    fn zero_metrics_flag() {
        assert!(Metrics::zero().is_zero());
        assert!(!Metrics { mae: 0.01, ..Metrics::zero() }.is_zero());
    }
}

//! ARIMA models for time series forecasting
//!
//! Coefficients are estimated by conditional least squares on the
//! differenced series: plain OLS for pure AR orders and the two-stage
//! Hannan-Rissanen regression once an MA part is present. A constant is
//! only estimated for undifferenced series.

use crate::error::{ForecastError, Result};
use crate::metrics::{calculate_metrics, Metrics};
use crate::models::order_search::OrderSearch;
use crate::models::{
    DegradeReason, ForecastModel, ForecastResult, ModelOutcome, TrainedForecastModel,
};
use crate::utils::train_test_split;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Observations required on top of `p + d + q` before fitting
const MIN_EXTRA_OBSERVATIONS: usize = 10;
/// Diagonal loading of the normal equations, relative to their mean diagonal
const RIDGE_SCALE: f64 = 1e-8;
/// Minimum order of the long autoregression in the first Hannan-Rissanen stage
const MIN_LONG_AR_ORDER: usize = 10;

/// ARIMA(p, d, q) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    /// AR order
    pub p: usize,
    /// Differencing order
    pub d: usize,
    /// MA order
    pub q: usize,
}

impl ArimaOrder {
    /// Order used when automatic selection is switched off
    pub const FALLBACK: ArimaOrder = ArimaOrder::new(5, 1, 0);

    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Observations needed to fit this order
    pub fn min_observations(&self) -> usize {
        self.p + self.d + self.q + MIN_EXTRA_OBSERVATIONS
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

/// ARIMA model (AutoRegressive Integrated Moving Average)
#[derive(Debug, Clone)]
pub struct ArimaModel {
    /// Name of the model
    name: String,
    /// Model order
    order: ArimaOrder,
}

impl ArimaModel {
    /// Create a new ARIMA model
    pub fn new(order: ArimaOrder) -> Self {
        Self {
            name: order.to_string(),
            order,
        }
    }

    /// Model order
    pub fn order(&self) -> ArimaOrder {
        self.order
    }
}

impl ForecastModel for ArimaModel {
    type Trained = TrainedArimaModel;

    fn train(&self, data: &[f64]) -> Result<TrainedArimaModel> {
        TrainedArimaModel::fit(data, self.order)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Trained ARIMA model
#[derive(Debug, Clone)]
pub struct TrainedArimaModel {
    /// Name of the model
    name: String,
    /// Model order
    order: ArimaOrder,
    /// Intercept of the differenced series, zero when `d > 0`
    constant: f64,
    /// Fitted AR coefficients
    ar_coefficients: Vec<f64>,
    /// Fitted MA coefficients
    ma_coefficients: Vec<f64>,
    /// One-step residuals of the differenced series, zero during warm-up
    residuals: Vec<f64>,
    /// Series the model was fitted on
    history: Vec<f64>,
    /// Residual variance
    sigma2: f64,
    /// Akaike information criterion
    aic: f64,
}

/// Estimated parameters before residuals are computed
struct Coefficients {
    constant: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
}

impl TrainedArimaModel {
    /// Fit an ARIMA model of the given order
    pub fn fit(data: &[f64], order: ArimaOrder) -> Result<Self> {
        if data.len() < order.min_observations() {
            return Err(ForecastError::InsufficientData(format!(
                "{} needs at least {} observations, got {}",
                order,
                order.min_observations(),
                data.len()
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::DataError(
                "ARIMA input contains non-finite values".to_string(),
            ));
        }

        let diffed = difference(data, order.d);
        let with_constant = order.d == 0;
        let coefficients = if order.q == 0 {
            estimate_ar(&diffed, order.p, with_constant)?
        } else {
            estimate_arma(&diffed, order.p, order.q, with_constant)?
        };

        let residuals = css_residuals(&diffed, &coefficients);
        let all_finite = residuals
            .iter()
            .chain(&coefficients.ar)
            .chain(&coefficients.ma)
            .chain(std::iter::once(&coefficients.constant))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ForecastError::ModelError(format!(
                "{} produced non-finite parameters",
                order
            )));
        }

        let n_eff = (diffed.len() - order.p) as f64;
        let sigma2 = (residuals[order.p..].iter().map(|r| r * r).sum::<f64>() / n_eff)
            .max(f64::MIN_POSITIVE);
        let k = (order.p + order.q + usize::from(with_constant) + 1) as f64;
        let log_likelihood = -0.5 * n_eff * (1.0 + (2.0 * std::f64::consts::PI * sigma2).ln());
        let aic = -2.0 * log_likelihood + 2.0 * k;

        Ok(Self {
            name: order.to_string(),
            order,
            constant: coefficients.constant,
            ar_coefficients: coefficients.ar,
            ma_coefficients: coefficients.ma,
            residuals,
            history: data.to_vec(),
            sigma2,
            aic,
        })
    }

    /// Model order
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    /// Fitted AR coefficients
    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar_coefficients
    }

    /// Fitted MA coefficients
    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma_coefficients
    }

    /// Intercept of the differenced series
    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Residual variance
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Akaike information criterion
    pub fn aic(&self) -> f64 {
        self.aic
    }

    /// One-step-ahead in-sample predictions for the observations in `range`.
    ///
    /// Each prediction only uses observations before its index; the first
    /// `d + p` positions have no residual yet and echo the observation.
    pub fn predict_in_sample(&self, range: Range<usize>) -> Result<Vec<f64>> {
        if range.start > range.end || range.end > self.history.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "prediction range {:?} outside fitted series of length {}",
                range,
                self.history.len()
            )));
        }

        let d = self.order.d;
        Ok(range
            .map(|t| {
                if t < d {
                    self.history[t]
                } else {
                    self.history[t] - self.residuals[t - d]
                }
            })
            .collect())
    }

    fn next_difference(&self, diffed: &[f64], residuals: &[f64]) -> f64 {
        let t = diffed.len();
        let ar: f64 = self
            .ar_coefficients
            .iter()
            .enumerate()
            .map(|(i, phi)| phi * lagged(diffed, t, i + 1))
            .sum();
        let ma: f64 = self
            .ma_coefficients
            .iter()
            .enumerate()
            .map(|(j, theta)| theta * lagged(residuals, t, j + 1))
            .sum();
        self.constant + ar + ma
    }
}

impl TrainedForecastModel for TrainedArimaModel {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        let mut diffed = difference(&self.history, self.order.d);
        let mut residuals = self.residuals.clone();
        let mut path = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let next = self.next_difference(&diffed, &residuals);
            diffed.push(next);
            // future shocks have zero expectation
            residuals.push(0.0);
            path.push(next);
        }

        for level in (0..self.order.d).rev() {
            let start = difference(&self.history, level)
                .last()
                .copied()
                .ok_or_else(|| {
                    ForecastError::ModelError("cannot undo differencing".to_string())
                })?;
            path = integrate(&path, start);
        }

        ForecastResult::new(path, horizon)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Difference a series `d` times
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..d {
        if result.len() < 2 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Cumulative sum of `diff` starting from `start`
pub fn integrate(diff: &[f64], start: f64) -> Vec<f64> {
    diff.iter()
        .scan(start, |level, &d| {
            *level += d;
            Some(*level)
        })
        .collect()
}

/// `values[t - lag]`, or zero before the start of the series
fn lagged(values: &[f64], t: usize, lag: usize) -> f64 {
    t.checked_sub(lag)
        .and_then(|i| values.get(i))
        .copied()
        .unwrap_or(0.0)
}

/// Least squares with a small ridge on the normal equations
fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>> {
    let k = x.ncols();
    if k == 0 {
        return Ok(DVector::zeros(0));
    }

    let xt = x.transpose();
    let mut xtx = &xt * x;
    let xty = &xt * y;

    let trace = xtx.trace();
    let ridge = if trace > 0.0 {
        RIDGE_SCALE * trace / k as f64
    } else {
        RIDGE_SCALE
    };
    for i in 0..k {
        xtx[(i, i)] += ridge;
    }

    let cholesky = xtx.cholesky().ok_or_else(|| {
        ForecastError::ModelError("normal equations are not positive definite".to_string())
    })?;
    Ok(cholesky.solve(&xty))
}

/// Regress `data[t]` on rows built by `regressors` for `t` in `start..n`
fn regress<F>(data: &[f64], start: usize, cols: usize, regressors: F) -> Result<DVector<f64>>
where
    F: Fn(usize) -> Vec<f64>,
{
    let n = data.len();
    let rows = n.saturating_sub(start);
    if rows < cols + 2 {
        return Err(ForecastError::InsufficientData(format!(
            "{} usable observations for {} parameters",
            rows, cols
        )));
    }

    let x_data: Vec<f64> = (start..n).flat_map(&regressors).collect();
    let x = DMatrix::from_row_slice(rows, cols, &x_data);
    let y = DVector::from_column_slice(&data[start..]);
    least_squares(&x, &y)
}

/// Split a solution vector into constant, AR and MA parts
fn unpack(beta: &DVector<f64>, with_constant: bool, p: usize, q: usize) -> Coefficients {
    let offset = usize::from(with_constant);
    Coefficients {
        constant: if with_constant { beta[0] } else { 0.0 },
        ar: beta.iter().skip(offset).take(p).copied().collect(),
        ma: beta.iter().skip(offset + p).take(q).copied().collect(),
    }
}

/// Pure autoregression by OLS
fn estimate_ar(data: &[f64], p: usize, with_constant: bool) -> Result<Coefficients> {
    let cols = p + usize::from(with_constant);
    let beta = regress(data, p, cols, |t| {
        let mut row = Vec::with_capacity(cols);
        if with_constant {
            row.push(1.0);
        }
        row.extend((1..=p).map(|i| data[t - i]));
        row
    })?;

    Ok(unpack(&beta, with_constant, p, 0))
}

/// Hannan-Rissanen: a long AR supplies innovation estimates that enter the
/// second regression as MA regressors
fn estimate_arma(data: &[f64], p: usize, q: usize, with_constant: bool) -> Result<Coefficients> {
    let n = data.len();
    let long_order = (p + q).max(MIN_LONG_AR_ORDER).min(n / 4);
    if long_order == 0 {
        return Err(ForecastError::InsufficientData(format!(
            "{} observations are too few for an MA term",
            n
        )));
    }

    let long_ar = estimate_ar(data, long_order, true)?;
    let innovations: Vec<f64> = (0..n)
        .map(|t| {
            if t < long_order {
                0.0
            } else {
                let fitted: f64 = long_ar
                    .ar
                    .iter()
                    .enumerate()
                    .map(|(i, phi)| phi * data[t - i - 1])
                    .sum();
                data[t] - long_ar.constant - fitted
            }
        })
        .collect();

    let start = p.max(long_order + q);
    let cols = p + q + usize::from(with_constant);
    let beta = regress(data, start, cols, |t| {
        let mut row = Vec::with_capacity(cols);
        if with_constant {
            row.push(1.0);
        }
        row.extend((1..=p).map(|i| data[t - i]));
        row.extend((1..=q).map(|j| innovations[t - j]));
        row
    })?;

    Ok(unpack(&beta, with_constant, p, q))
}

/// Conditional-sum-of-squares residuals, zero for the first `p` positions
fn css_residuals(data: &[f64], coefficients: &Coefficients) -> Vec<f64> {
    let p = coefficients.ar.len();
    let mut residuals = vec![0.0; data.len()];

    for t in p..data.len() {
        let ar: f64 = coefficients
            .ar
            .iter()
            .enumerate()
            .map(|(i, phi)| phi * lagged(data, t, i + 1))
            .sum();
        let ma: f64 = coefficients
            .ma
            .iter()
            .enumerate()
            .map(|(j, theta)| theta * lagged(&residuals, t, j + 1))
            .sum();
        residuals[t] = data[t] - coefficients.constant - ar - ma;
    }

    residuals
}

/// How the ARIMA order is obtained; decided once when the engine is built
#[derive(Debug, Clone)]
pub enum ArimaCapability {
    /// Stepwise AIC search on the training split
    AutoOrder(OrderSearch),
    /// Always use this order
    FixedOrder(ArimaOrder),
    /// ARIMA is switched off; every asset gets the fallback projection
    Unavailable,
}

/// Autoregressive forecaster: order selection, full-series refit and
/// holdout evaluation for one close-price series
#[derive(Debug, Clone)]
pub struct ArimaForecaster {
    capability: ArimaCapability,
    train_ratio: f64,
}

impl ArimaForecaster {
    /// Create a new forecaster
    pub fn new(capability: ArimaCapability, train_ratio: f64) -> Self {
        Self {
            capability,
            train_ratio,
        }
    }

    /// Capability this forecaster was built with
    pub fn capability(&self) -> &ArimaCapability {
        &self.capability
    }

    /// Forecast `horizon` closes; failures degrade to the fallback projection.
    ///
    /// The order is chosen on the training split, but the reported model is
    /// refit on the whole series and the holdout metrics come from that
    /// refit, so they are optimistic.
    pub fn forecast(&self, closes: &[f64], horizon: usize) -> ModelOutcome<TrainedArimaModel> {
        let last_close = closes.last().copied().unwrap_or_default();

        if matches!(self.capability, ArimaCapability::Unavailable) {
            return ModelOutcome::degraded(last_close, horizon, DegradeReason::Unavailable);
        }

        match self.fit_and_forecast(closes, horizon) {
            Ok((forecast, metrics, model)) => {
                info!(model = %model.name(), mae = metrics.mae, "ARIMA fitted");
                ModelOutcome::Fitted {
                    forecast,
                    metrics,
                    model,
                }
            }
            Err(err) => {
                warn!(error = %err, "ARIMA degraded to fallback projection");
                ModelOutcome::degraded(last_close, horizon, err.into())
            }
        }
    }

    fn fit_and_forecast(
        &self,
        closes: &[f64],
        horizon: usize,
    ) -> Result<(ForecastResult, Metrics, TrainedArimaModel)> {
        let (train, holdout) = train_test_split(closes, self.train_ratio)?;
        if train.is_empty() || holdout.is_empty() {
            return Err(ForecastError::InsufficientData(format!(
                "{} observations leave no train/holdout split",
                closes.len()
            )));
        }

        let order = self.select_order(train)?;
        debug!(%order, train_size = train.len(), "ARIMA order selected");

        let model = ArimaModel::new(order).train(closes)?;
        let forecast = model.forecast(horizon)?;
        let predicted = model.predict_in_sample(train.len()..closes.len())?;
        let metrics = calculate_metrics(holdout, &predicted)?;

        Ok((forecast, metrics, model))
    }

    fn select_order(&self, train: &[f64]) -> Result<ArimaOrder> {
        match &self.capability {
            ArimaCapability::AutoOrder(search) => search.select(train),
            ArimaCapability::FixedOrder(order) => Ok(*order),
            ArimaCapability::Unavailable => Err(ForecastError::ModelError(
                "ARIMA is unavailable".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn linear(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn test_difference() {
        let data = vec![1.0, 3.0, 6.0, 10.0, 15.0];
        assert_eq!(difference(&data, 1), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(difference(&data, 2), vec![1.0, 1.0, 1.0]);
        assert!(difference(&[1.0], 1).is_empty());
        assert_eq!(integrate(&[2.0, 3.0], 1.0), vec![3.0, 6.0]);
    }

    #[test]
    fn test_ar_model() {
        let mut data = vec![0.0];
        let phi = 0.7;
        for i in 1..200 {
            let noise = ((i * 7919) % 1000) as f64 / 5000.0 - 0.1;
            data.push(phi * data[i - 1] + noise);
        }

        let model = ArimaModel::new(ArimaOrder::new(1, 0, 0)).train(&data).unwrap();
        assert!((model.ar_coefficients()[0] - phi).abs() < 0.2);
        assert!(model.aic().is_finite());
        assert_eq!(model.name(), "ARIMA(1,0,0)");
    }

    #[test]
    fn linear_trend_is_continued() {
        let data = linear(300);
        let model = ArimaModel::new(ArimaOrder::new(1, 1, 0)).train(&data).unwrap();
        let forecast = model.forecast(5).unwrap();
        for (h, value) in forecast.values().iter().enumerate() {
            assert_relative_eq!(*value, 400.0 + h as f64, epsilon = 1e-3);
        }
    }

    #[test]
    fn second_differences_integrate_from_each_level() {
        let data: Vec<f64> = (0..50).map(|t| (t * t) as f64).collect();
        let model = ArimaModel::new(ArimaOrder::new(1, 2, 0)).train(&data).unwrap();
        let forecast = model.forecast(2).unwrap();
        assert_relative_eq!(forecast.values()[0], 2500.0, epsilon = 1e-3);
        assert_relative_eq!(forecast.values()[1], 2601.0, epsilon = 1e-3);
    }

    #[test]
    fn moving_average_terms_are_estimated() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let shocks: Vec<f64> = (0..600).map(|_| normal.sample(&mut rng)).collect();
        let mut data = vec![0.0];
        for t in 1..600 {
            data.push(0.6 * data[t - 1] + shocks[t] + 0.3 * shocks[t - 1]);
        }

        let model = TrainedArimaModel::fit(&data, ArimaOrder::new(1, 0, 1)).unwrap();
        assert_eq!(model.ma_coefficients().len(), 1);
        assert!(model.aic().is_finite());
        assert!((model.ar_coefficients()[0] - 0.6).abs() < 0.25);
        assert!(model.sigma2() > 0.0);
        assert!(model.forecast(10).unwrap().values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn in_sample_predictions_track_the_series() {
        let data = linear(120);
        let model = TrainedArimaModel::fit(&data, ArimaOrder::new(2, 1, 0)).unwrap();
        let predicted = model.predict_in_sample(96..120).unwrap();
        assert_eq!(predicted.len(), 24);
        for (p, a) in predicted.iter().zip(&data[96..]) {
            assert_relative_eq!(*p, *a, epsilon = 1e-3);
        }
        assert!(model.predict_in_sample(100..121).is_err());
    }

    #[test]
    fn too_short_series_is_rejected() {
        let err = TrainedArimaModel::fit(&[1.0, 2.0, 3.0], ArimaOrder::FALLBACK).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData(_)));
    }

    #[test]
    fn forecaster_with_fixed_order() {
        let data = linear(300);
        let forecaster =
            ArimaForecaster::new(ArimaCapability::FixedOrder(ArimaOrder::FALLBACK), 0.8);
        let outcome = forecaster.forecast(&data, 30);

        assert!(!outcome.is_degraded());
        assert_eq!(outcome.forecast().len(), 30);
        assert!(outcome.metrics().mae < 3.0);
        assert_eq!(outcome.model().map(|m| m.order()), Some(ArimaOrder::FALLBACK));
    }

    #[test]
    fn forecaster_degrades_when_unavailable_or_short() {
        let unavailable = ArimaForecaster::new(ArimaCapability::Unavailable, 0.8);
        let outcome = unavailable.forecast(&linear(300), 10);
        assert_eq!(outcome.reason(), Some(&DegradeReason::Unavailable));
        assert_eq!(outcome.forecast()[0], 399.0);

        let fixed = ArimaForecaster::new(ArimaCapability::FixedOrder(ArimaOrder::FALLBACK), 0.8);
        let outcome = fixed.forecast(&[10.0, 11.0, 12.0], 10);
        assert!(matches!(
            outcome.reason(),
            Some(DegradeReason::InsufficientData(_))
        ));
        assert!(outcome.metrics().is_zero());
    }
}

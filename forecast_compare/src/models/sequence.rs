//! Sequence forecaster built on the stacked LSTM network
//!
//! Closes are min-max normalised over the whole series, cut into sliding
//! windows of `lookback` values and used to train a [`Network`] that
//! predicts the next value. Multi-step forecasts feed each prediction back
//! into the window.

use crate::error::{ForecastError, Result};
use crate::metrics::{calculate_metrics, Metrics};
use crate::models::lstm::{batch_inputs, Adam, Network, NetworkShape};
use crate::models::{
    DegradeReason, ForecastModel, ForecastResult, ModelOutcome, TrainedForecastModel,
};
use crate::utils::{chronological_split, MinMaxScaler};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Hyper-parameters of the sequence model
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceConfig {
    /// Trailing observations fed to the network per prediction
    pub lookback: usize,
    /// Width of each stacked LSTM layer
    pub lstm_units: Vec<usize>,
    /// Width of the dense layer before the output
    pub dense_units: usize,
    /// Dropout after each LSTM layer while training
    pub dropout: f64,
    /// Maximum number of passes over the training windows
    pub epochs: usize,
    /// Windows per gradient step
    pub batch_size: usize,
    /// Epochs without a lower training loss before stopping
    pub patience: usize,
    /// Adam step size
    pub learning_rate: f64,
    /// Seed for weight initialisation, shuffling and dropout
    pub seed: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            lookback: 60,
            lstm_units: vec![50, 50],
            dense_units: 25,
            dropout: 0.2,
            epochs: 50,
            batch_size: 32,
            patience: 5,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

impl SequenceConfig {
    /// Set the lookback window
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    /// Set the LSTM layer widths
    pub fn with_lstm_units(mut self, units: Vec<usize>) -> Self {
        self.lstm_units = units;
        self
    }

    /// Set the dense layer width
    pub fn with_dense_units(mut self, units: usize) -> Self {
        self.dense_units = units;
        self
    }

    /// Set the dropout rate
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Set the epoch cap
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the learning rate
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check that every setting is usable
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ForecastError::InvalidParameter(msg));

        if self.lookback == 0 {
            return invalid("lookback must be at least 1".to_string());
        }
        if self.lstm_units.is_empty() || self.lstm_units.contains(&0) {
            return invalid(format!("invalid LSTM layer widths {:?}", self.lstm_units));
        }
        if self.dense_units == 0 {
            return invalid("dense layer needs at least one unit".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if self.epochs == 0 || self.batch_size == 0 {
            return invalid("epochs and batch size must be positive".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            ));
        }
        Ok(())
    }

    fn network_shape(&self) -> NetworkShape {
        NetworkShape {
            lstm_units: self.lstm_units.clone(),
            dense_units: self.dense_units,
            dropout: self.dropout,
        }
    }
}

/// Input windows and next-value targets for target indices in `targets`.
///
/// Targets before `lookback` have no full window and are skipped; inputs
/// may reach back before `targets.start`. The forecaster trains on targets
/// in `[lookback, train_size)` and scores targets in `[train_size, n)`.
pub fn make_windows(
    values: &[f64],
    lookback: usize,
    targets: Range<usize>,
) -> (Vec<&[f64]>, Vec<f64>) {
    let start = targets.start.max(lookback);
    let end = targets.end.min(values.len());

    (start..end)
        .map(|t| (&values[t - lookback..t], values[t]))
        .unzip()
}

/// Iterative multi-step forecast over a fixed-size window.
///
/// Each prediction is appended to the window and the oldest value dropped,
/// so step `k` only sees `seed` and the first `k - 1` predictions.
pub fn roll_forward<F>(seed: &[f64], horizon: usize, mut predict: F) -> Vec<f64>
where
    F: FnMut(&[f64]) -> f64,
{
    let mut window: VecDeque<f64> = seed.iter().copied().collect();
    let mut predictions = Vec::with_capacity(horizon);

    for _ in 0..horizon {
        let next = predict(window.make_contiguous());
        predictions.push(next);
        window.pop_front();
        window.push_back(next);
    }

    predictions
}

/// Outcome of the training loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSummary {
    /// Epochs actually run
    pub epochs_run: usize,
    /// Lowest mean training loss, whose weights were kept
    pub best_loss: f64,
}

/// Mini-batch Adam training with early stopping on the epoch loss.
///
/// The weights of the best epoch are always restored.
fn train_network(
    config: &SequenceConfig,
    windows: &[&[f64]],
    targets: &[f64],
) -> Result<(Network, TrainingSummary)> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut network = Network::new(config.network_shape(), &mut rng);
    let mut adam = Adam::new(&mut network, config.learning_rate);
    let mut order: Vec<usize> = (0..windows.len()).collect();

    let mut best_network = network.clone();
    let mut best_loss = f64::INFINITY;
    let mut stale_epochs = 0;
    let mut epochs_run = 0;

    for epoch in 0..config.epochs {
        order.shuffle(&mut rng);
        let mut total = 0.0;

        for chunk in order.chunks(config.batch_size) {
            let batch: Vec<&[f64]> = chunk.iter().map(|&i| windows[i]).collect();
            let batch_targets: Vec<f64> = chunk.iter().map(|&i| targets[i]).collect();
            let xs = batch_inputs(&batch);

            let (loss, grads) = network.loss_and_gradients(&xs, &batch_targets, Some(&mut rng));
            if !loss.is_finite() {
                return Err(ForecastError::ModelError(format!(
                    "training loss diverged in epoch {}",
                    epoch + 1
                )));
            }
            adam.update(&mut network, &grads);
            total += loss * chunk.len() as f64;
        }

        epochs_run = epoch + 1;
        let epoch_loss = total / windows.len() as f64;
        debug!(epoch = epochs_run, loss = epoch_loss, "sequence model epoch");

        if epoch_loss < best_loss {
            best_loss = epoch_loss;
            best_network = network.clone();
            stale_epochs = 0;
        } else {
            stale_epochs += 1;
            if stale_epochs >= config.patience {
                debug!(epoch = epochs_run, "early stopping");
                break;
            }
        }
    }

    Ok((
        best_network,
        TrainingSummary {
            epochs_run,
            best_loss,
        },
    ))
}

/// Untrained sequence model
#[derive(Debug, Clone)]
pub struct SequenceModel {
    name: String,
    config: SequenceConfig,
}

impl SequenceModel {
    /// Create a new sequence model
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            name: "LSTM".to_string(),
            config,
        }
    }

    /// Fit on windows whose targets lie in `[lookback, train_size)`.
    ///
    /// The scaler is fitted on the whole of `data`. No training target
    /// falls in the holdout, so every holdout target from `train_size` on
    /// can be scored.
    pub fn fit_split(&self, data: &[f64], train_size: usize) -> Result<TrainedSequenceModel> {
        self.config.validate()?;
        let lookback = self.config.lookback;
        if train_size <= lookback || train_size > data.len() {
            return Err(ForecastError::InsufficientData(format!(
                "{} training observations do not cover a lookback of {}",
                train_size.min(data.len()),
                lookback
            )));
        }

        let scaler = MinMaxScaler::fit(data)?;
        let normalized = scaler.transform_all(data);
        let (windows, targets) = make_windows(&normalized, lookback, 0..train_size);
        let (network, summary) = train_network(&self.config, &windows, &targets)?;

        info!(
            windows = windows.len(),
            epochs = summary.epochs_run,
            loss = summary.best_loss,
            "sequence model trained"
        );

        Ok(TrainedSequenceModel {
            name: self.name.clone(),
            lookback,
            network,
            scaler,
            normalized,
            summary,
        })
    }
}

impl ForecastModel for SequenceModel {
    type Trained = TrainedSequenceModel;

    fn train(&self, data: &[f64]) -> Result<TrainedSequenceModel> {
        self.fit_split(data, data.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Trained sequence model with the scaler it was trained under
#[derive(Debug, Clone)]
pub struct TrainedSequenceModel {
    name: String,
    lookback: usize,
    network: Network,
    scaler: MinMaxScaler,
    /// Normalised series the model was fitted on
    normalized: Vec<f64>,
    summary: TrainingSummary,
}

impl TrainedSequenceModel {
    /// Training statistics
    pub fn summary(&self) -> TrainingSummary {
        self.summary
    }

    /// Scaler fitted on the training series
    pub fn scaler(&self) -> MinMaxScaler {
        self.scaler
    }

    /// Network weights
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Predict the next normalised value after `window`
    pub fn predict_next(&self, window: &[f64]) -> f64 {
        self.network
            .predict(&batch_inputs(&[window]))
            .first()
            .copied()
            .unwrap_or(f64::NAN)
    }

    /// One-step predictions, in price units, for the targets in `targets`.
    ///
    /// Returns the target indices actually covered with their predictions.
    pub fn predict_range(&self, targets: Range<usize>) -> (Range<usize>, Vec<f64>) {
        let covered = targets.start.max(self.lookback)..targets.end.min(self.normalized.len());
        let (windows, _) = make_windows(&self.normalized, self.lookback, covered.clone());
        let predictions = self
            .network
            .predict(&batch_inputs(&windows))
            .into_iter()
            .map(|v| self.scaler.inverse(v))
            .collect();
        (covered, predictions)
    }
}

impl TrainedForecastModel for TrainedSequenceModel {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        let seed = &self.normalized[self.normalized.len() - self.lookback..];
        let normalized = roll_forward(seed, horizon, |window| self.predict_next(window));
        ForecastResult::new(self.scaler.inverse_all(&normalized), horizon)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Whether the sequence model is used; decided once when the engine is built
#[derive(Debug, Clone)]
pub enum SequenceCapability {
    /// Train with this configuration
    Available(SequenceConfig),
    /// Switched off; every asset gets the fallback projection
    Unavailable,
}

/// Sequence forecaster: training on the early windows, holdout evaluation
/// on the late ones and a self-fed forecast from the series end
#[derive(Debug, Clone)]
pub struct SequenceForecaster {
    capability: SequenceCapability,
    train_ratio: f64,
}

impl SequenceForecaster {
    /// Create a new forecaster
    pub fn new(capability: SequenceCapability, train_ratio: f64) -> Self {
        Self {
            capability,
            train_ratio,
        }
    }

    /// Capability this forecaster was built with
    pub fn capability(&self) -> &SequenceCapability {
        &self.capability
    }

    /// Forecast `horizon` closes; failures degrade to the fallback projection
    pub fn forecast(&self, closes: &[f64], horizon: usize) -> ModelOutcome<TrainedSequenceModel> {
        let last_close = closes.last().copied().unwrap_or_default();

        let config = match &self.capability {
            SequenceCapability::Available(config) => config,
            SequenceCapability::Unavailable => {
                return ModelOutcome::degraded(last_close, horizon, DegradeReason::Unavailable)
            }
        };

        match self.fit_and_forecast(config, closes, horizon) {
            Ok((forecast, metrics, model)) => {
                info!(mae = metrics.mae, "LSTM fitted");
                ModelOutcome::Fitted {
                    forecast,
                    metrics,
                    model,
                }
            }
            Err(err) => {
                warn!(error = %err, "LSTM degraded to fallback projection");
                ModelOutcome::degraded(last_close, horizon, err.into())
            }
        }
    }

    fn fit_and_forecast(
        &self,
        config: &SequenceConfig,
        closes: &[f64],
        horizon: usize,
    ) -> Result<(ForecastResult, Metrics, TrainedSequenceModel)> {
        let train_size = chronological_split(closes.len(), self.train_ratio)?;
        if train_size == closes.len() {
            return Err(ForecastError::InsufficientData(format!(
                "{} observations leave no holdout",
                closes.len()
            )));
        }

        let model = SequenceModel::new(config.clone()).fit_split(closes, train_size)?;
        let (covered, predicted) = model.predict_range(train_size..closes.len());
        let metrics = calculate_metrics(&closes[covered], &predicted)?;
        let forecast = model.forecast(horizon)?;

        Ok((forecast, metrics, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> SequenceConfig {
        SequenceConfig::default()
            .with_lookback(5)
            .with_lstm_units(vec![4, 4])
            .with_dense_units(3)
            .with_epochs(3)
            .with_learning_rate(0.01)
    }

    #[test]
    fn windows_respect_target_range() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();

        let (windows, targets) = make_windows(&values, 3, 0..7);
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0], &[0.0, 1.0, 2.0]);
        assert_eq!(targets, vec![3.0, 4.0, 5.0, 6.0]);

        // holdout windows borrow their inputs from before the range
        let (windows, targets) = make_windows(&values, 3, 8..10);
        assert_eq!(windows[0], &[5.0, 6.0, 7.0]);
        assert_eq!(targets, vec![8.0, 9.0]);
    }

    #[test]
    fn roll_forward_feeds_predictions_back() {
        let mut seen = Vec::new();
        let out = roll_forward(&[1.0, 2.0, 3.0], 3, |window| {
            seen.push(window.to_vec());
            window[window.len() - 1] + 1.0
        });

        assert_eq!(out, vec![4.0, 5.0, 6.0]);
        assert_eq!(seen[1], vec![2.0, 3.0, 4.0]);
        assert_eq!(seen[2], vec![3.0, 4.0, 5.0]);
        assert!(roll_forward(&[1.0], 0, |_| 0.0).is_empty());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(SequenceConfig::default().validate().is_ok());
        assert!(SequenceConfig::default().with_lookback(0).validate().is_err());
        assert!(SequenceConfig::default().with_dropout(1.0).validate().is_err());
        assert!(SequenceConfig::default().with_lstm_units(vec![]).validate().is_err());
        assert!(SequenceConfig::default().with_learning_rate(0.0).validate().is_err());
    }

    #[test]
    fn short_series_degrades() {
        let closes: Vec<f64> = (0..6).map(f64::from).collect();
        let forecaster =
            SequenceForecaster::new(SequenceCapability::Available(quick_config()), 0.8);
        let outcome = forecaster.forecast(&closes, 4);

        assert!(matches!(
            outcome.reason(),
            Some(DegradeReason::InsufficientData(_))
        ));
        assert_eq!(outcome.forecast().len(), 4);
        assert_eq!(outcome.forecast()[0], 5.0);
    }

    #[test]
    fn unavailable_capability_degrades() {
        let forecaster = SequenceForecaster::new(SequenceCapability::Unavailable, 0.8);
        let outcome = forecaster.forecast(&[10.0, 20.0], 2);
        assert_eq!(outcome.reason(), Some(&DegradeReason::Unavailable));
        assert_eq!(outcome.forecast(), &[20.0, 21.0]);
    }

    #[test]
    fn trained_model_forecasts_full_horizon() {
        let closes: Vec<f64> = (0..80).map(|t| 50.0 + (t as f64 / 5.0).sin() * 5.0).collect();
        let forecaster =
            SequenceForecaster::new(SequenceCapability::Available(quick_config()), 0.8);
        let outcome = forecaster.forecast(&closes, 12);

        assert!(!outcome.is_degraded(), "{:?}", outcome.reason());
        assert_eq!(outcome.forecast().len(), 12);
        assert!(outcome.forecast().iter().all(|v| v.is_finite()));
        let model = outcome.model().unwrap();
        assert!(model.summary().epochs_run <= 3);
        assert!(model.summary().best_loss.is_finite());
    }

    #[test]
    fn holdout_scoring_starts_at_the_split() {
        let closes: Vec<f64> = (0..40).map(|t| 20.0 + t as f64).collect();
        let model = SequenceModel::new(quick_config()).fit_split(&closes, 32).unwrap();

        let (covered, predicted) = model.predict_range(32..40);
        assert_eq!(covered, 32..40);
        assert_eq!(predicted.len(), 8);

        // a split that leaves no full training window is rejected
        let err = SequenceModel::new(quick_config()).fit_split(&closes, 5).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData(_)));
    }

    #[test]
    fn training_is_reproducible_for_a_seed() {
        let closes: Vec<f64> = (0..40).map(|t| 10.0 + t as f64).collect();
        let model = SequenceModel::new(quick_config());
        let a = model.train(&closes).unwrap().forecast(5).unwrap();
        let b = model.train(&closes).unwrap().forecast(5).unwrap();
        assert_eq!(a, b);
    }
}

//! TOML configuration for the forecasting engine and the report binary
//!
//! Every field has a default, so an empty file yields the stock setup:
//! 30-day horizon, 80/20 split, stepwise ARIMA order search and the
//! 50/50-unit LSTM with a 60-day lookback.

use crate::error::{ForecastError, Result};
use crate::models::arima::ArimaOrder;
use crate::models::sequence::SequenceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub data: DataConfig,
    pub engine: EngineConfig,
    pub arima: ArimaConfig,
    pub sequence: SequenceSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding `crypto_*.csv` and `stock_*.csv`
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Days forecast past the last observation
    pub horizon: usize,
    /// Share of each series used for training
    pub train_ratio: f64,
    /// Seed for the sequence model
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon: 30,
            train_ratio: 0.8,
            seed: 42,
        }
    }
}

/// How the ARIMA order is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArimaMode {
    Auto,
    Fixed,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArimaConfig {
    pub mode: ArimaMode,
    /// (p, d, q) used in fixed mode
    pub fixed_order: [usize; 3],
    pub max_p: usize,
    pub max_q: usize,
    pub max_d: usize,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        let fallback = ArimaOrder::FALLBACK;
        Self {
            mode: ArimaMode::Auto,
            fixed_order: [fallback.p, fallback.d, fallback.q],
            max_p: 5,
            max_q: 5,
            max_d: 2,
        }
    }
}

impl ArimaConfig {
    pub fn order(&self) -> ArimaOrder {
        let [p, d, q] = self.fixed_order;
        ArimaOrder::new(p, d, q)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    pub enabled: bool,
    pub lookback: usize,
    pub units: Vec<usize>,
    pub dense_units: usize,
    pub dropout: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub patience: usize,
    pub learning_rate: f64,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        let stock = SequenceConfig::default();
        Self {
            enabled: true,
            lookback: stock.lookback,
            units: stock.lstm_units,
            dense_units: stock.dense_units,
            dropout: stock.dropout,
            epochs: stock.epochs,
            batch_size: stock.batch_size,
            patience: stock.patience,
            learning_rate: stock.learning_rate,
        }
    }
}

impl SequenceSettings {
    /// Model configuration seeded with `seed`
    pub fn to_model_config(&self, seed: u64) -> SequenceConfig {
        SequenceConfig {
            lookback: self.lookback,
            lstm_units: self.units.clone(),
            dense_units: self.dense_units,
            dropout: self.dropout,
            epochs: self.epochs,
            batch_size: self.batch_size,
            patience: self.patience,
            learning_rate: self.learning_rate,
            seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ForecastConfig {
    /// Read and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ForecastError::Config(format!("failed to read {}: {}", path.display(), err))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ForecastConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no forecaster can run with
    pub fn validate(&self) -> Result<()> {
        if self.engine.horizon == 0 {
            return Err(ForecastError::Config("horizon must be at least 1".to_string()));
        }
        if !(self.engine.train_ratio > 0.0 && self.engine.train_ratio < 1.0) {
            return Err(ForecastError::Config(format!(
                "train_ratio must be strictly between 0 and 1, got {}",
                self.engine.train_ratio
            )));
        }
        if self.arima.mode == ArimaMode::Auto && (self.arima.max_p == 0 || self.arima.max_q == 0) {
            return Err(ForecastError::Config(
                "max_p and max_q must be at least 1".to_string(),
            ));
        }
        if self.sequence.enabled {
            self.sequence
                .to_model_config(self.engine.seed)
                .validate()
                .map_err(|err| ForecastError::Config(err.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ForecastConfig::from_toml_str("").unwrap();
        assert_eq!(config, ForecastConfig::default());
        assert_eq!(config.engine.horizon, 30);
        assert_eq!(config.arima.mode, ArimaMode::Auto);
        assert_eq!(config.arima.order(), ArimaOrder::new(5, 1, 0));
        assert_eq!(config.sequence.units, vec![50, 50]);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ForecastConfig::from_toml_str(
            r#"
            [arima]
            mode = "fixed"
            fixed_order = [2, 1, 1]

            [sequence]
            lookback = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.arima.mode, ArimaMode::Fixed);
        assert_eq!(config.arima.order(), ArimaOrder::new(2, 1, 1));
        assert_eq!(config.arima.max_p, 5);
        assert_eq!(config.sequence.lookback, 20);
        assert_eq!(config.sequence.epochs, 50);

        let model = config.sequence.to_model_config(7);
        assert_eq!(model.lookback, 20);
        assert_eq!(model.seed, 7);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for raw in [
            "[engine]\ntrain_ratio = 1.0",
            "[engine]\nhorizon = 0",
            "[sequence]\ndropout = 1.5",
            "[arima]\nmode = \"sometimes\"",
        ] {
            let err = ForecastConfig::from_toml_str(raw).unwrap_err();
            assert!(matches!(err, ForecastError::Config(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn disabled_sequence_skips_validation() {
        let config =
            ForecastConfig::from_toml_str("[sequence]\nenabled = false\nlookback = 0").unwrap();
        assert!(!config.sequence.enabled);
    }
}

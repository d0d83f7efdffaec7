//! Error types for the forecast_compare crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the forecast_compare crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// The requested asset is not part of the loaded universe
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// The asset has no observations to fit on
    #[error("Empty price series for asset {0}")]
    EmptySeries(String),

    /// Not enough observations for the requested model
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Model fitting failed (singular system, non-finite parameters, ...)
    #[error("Model error: {0}")]
    ModelError(String),

    /// A metric has no defined value for the given inputs
    #[error("Undefined metric: {0}")]
    UndefinedMetric(String),

    /// Error related to parameter validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from reading or validating configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Error from feature math
    #[error("Math error: {0}")]
    MathError(#[from] trade_math::MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV serialization
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from JSON serialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::Config(err.to_string())
    }
}

//! # Asset Forecast
//!
//! Umbrella crate for the workspace.
//!
//! - [`trade_math`]: return, moving-average and volatility primitives
//! - [`forecast_compare`]: ARIMA and LSTM forecasting, metrics and comparison
//!
//! ```
//! use asset_forecast_workspace::forecast_compare::calculate_metrics;
//!
//! let metrics = calculate_metrics(&[100.0, 200.0], &[110.0, 190.0]).unwrap();
//! assert_eq!(metrics.mae, 10.0);
//! ```

pub use forecast_compare;
pub use trade_math;

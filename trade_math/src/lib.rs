//! # Trade Math
//!
//! Rolling-window calculations used to derive features from daily price
//! series. Every function here works on plain slices and reports warm-up
//! positions as `None` rather than inventing a value.
//!
//! ```
//! use trade_math::returns::pct_change;
//! use trade_math::moving_averages::rolling_mean;
//!
//! let closes = [100.0, 110.0, 99.0];
//! let returns = pct_change(&closes);
//! assert_eq!(returns[0], None);
//! assert!((returns[1].unwrap() - 0.1).abs() < 1e-12);
//!
//! let ma = rolling_mean(&closes, 2).unwrap();
//! assert_eq!(ma, vec![None, Some(105.0), Some(104.5)]);
//! ```

use thiserror::Error;

pub mod moving_averages;
pub mod returns;
pub mod volatility;

/// Errors that can occur in trading-related calculations
#[derive(Error, Debug, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for trading math operations
pub type Result<T> = std::result::Result<T, MathError>;

pub(crate) fn check_window(window: usize) -> Result<()> {
    if window == 0 {
        return Err(MathError::InvalidInput(
            "Window must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_window_is_rejected() {
        assert!(matches!(check_window(0), Err(MathError::InvalidInput(_))));
        assert!(check_window(1).is_ok());
    }
}

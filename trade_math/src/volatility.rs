//! Rolling volatility
//!
//! Volatility here is the sample standard deviation (n - 1 denominator) of a
//! return series over a trailing window, recomputed at every point.

use crate::{check_window, Result};
use statrs::statistics::Statistics;
use std::collections::VecDeque;

/// Streaming sample standard deviation over the last `period` values.
///
/// A missing observation empties the window, so a value is only reported
/// once `period` consecutive observations are present.
#[derive(Debug, Clone)]
pub struct RollingStdDev {
    period: usize,
    values: VecDeque<f64>,
}

impl RollingStdDev {
    /// Create a new rolling standard deviation with the specified period
    pub fn new(period: usize) -> Result<Self> {
        check_window(period)?;

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
        })
    }

    /// Push the next observation; `None` or a non-finite value resets the window
    pub fn update(&mut self, value: Option<f64>) {
        match value {
            Some(v) if v.is_finite() => {
                self.values.push_back(v);
                if self.values.len() > self.period {
                    self.values.pop_front();
                }
            }
            _ => self.values.clear(),
        }
    }

    /// Current value, if a full window is available
    pub fn value(&self) -> Option<f64> {
        if self.values.len() < self.period {
            return None;
        }
        if self.period == 1 {
            // Sample deviation of a single value is undefined
            return None;
        }

        let std_dev = self.values.iter().std_dev();
        std_dev.is_finite().then_some(std_dev)
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset, clearing all values
    pub fn reset(&mut self) {
        self.values.clear();
    }
}

/// Trailing sample standard deviation of `values` over `window` points.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>> {
    let mut rolling = RollingStdDev::new(window)?;

    Ok(values
        .iter()
        .map(|&value| {
            rolling.update(value);
            rolling.value()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::pct_change;
    use approx::assert_relative_eq;

    #[test]
    fn sample_standard_deviation() {
        let values: Vec<Option<f64>> = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]
            .into_iter()
            .map(Some)
            .collect();
        let out = rolling_std(&values, 8).unwrap();
        assert!(out[..7].iter().all(Option::is_none));
        // population sd is 2.0, sample sd is sqrt(32 / 7)
        assert_relative_eq!(out[7].unwrap(), (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn gap_in_returns_delays_first_value() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 3) as f64).collect();
        let returns = pct_change(&closes);
        let vol = rolling_std(&returns, 30).unwrap();

        // return[0] is undefined, so 30 valid returns first exist at index 30
        assert!(vol[..30].iter().all(Option::is_none));
        assert!(vol[30].is_some());
    }

    #[test]
    fn constant_returns_have_zero_volatility() {
        let values = vec![Some(0.01); 5];
        let out = rolling_std(&values, 3).unwrap();
        assert_relative_eq!(out[4].unwrap(), 0.0);
    }

    #[test]
    fn single_period_is_never_defined() {
        let out = rolling_std(&[Some(1.0), Some(2.0)], 1).unwrap();
        assert_eq!(out, vec![None, None]);
    }
}

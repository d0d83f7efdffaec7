//! Utility functions for the forecast_compare crate

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};

/// Formats tried, in order, when a date cell is not a plain ISO date.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

/// Parse a calendar date from the formats commonly found in price exports.
///
/// Timestamps are truncated to their date; offsets are dropped after
/// conversion to the local date they were written in.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim().trim_matches('"');
    if raw.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z")
        .ok()
        .map(|dt| dt.date_naive())
}

/// Number of leading observations that form the training split.
///
/// The split is chronological and truncates, so a 300-point series with a
/// 0.8 ratio trains on the first 240 points.
pub fn chronological_split(len: usize, train_ratio: f64) -> Result<usize> {
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "train ratio must be in (0, 1), got {}",
            train_ratio
        )));
    }

    Ok((len as f64 * train_ratio).floor() as usize)
}

/// Split a series into its training head and holdout tail
pub fn train_test_split(data: &[f64], train_ratio: f64) -> Result<(&[f64], &[f64])> {
    let train_size = chronological_split(data.len(), train_ratio)?;
    Ok(data.split_at(train_size))
}

/// Calendar days following `last`, one per forecast step
pub fn future_dates(last: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>> {
    (1..=horizon as u64)
        .map(|offset| {
            last.checked_add_days(Days::new(offset)).ok_or_else(|| {
                ForecastError::ValidationError(format!(
                    "date overflow adding {} days to {}",
                    offset, last
                ))
            })
        })
        .collect()
}

/// Round to two decimal places for reporting
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `steps` evenly spaced values from `start` to `end`, both inclusive.
pub fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (steps - 1) as f64;
            let mut values: Vec<f64> = (0..steps).map(|i| start + step * i as f64).collect();
            // pin the endpoint instead of trusting accumulated rounding
            values[steps - 1] = end;
            values
        }
    }
}

/// Min-max normalizer fitted once and then read-only.
///
/// A constant series gets a unit scale so transforms stay finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    min: f64,
    scale: f64,
}

impl MinMaxScaler {
    /// Fit the scaler to the range of `values`
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(ForecastError::InsufficientData(
                "cannot fit a scaler to an empty series".to_string(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::DataError(
                "cannot fit a scaler to non-finite values".to_string(),
            ));
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        let scale = if range > 0.0 { 1.0 / range } else { 1.0 };

        Ok(Self { min, scale })
    }

    /// Map a value into the fitted [0, 1] range
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) * self.scale
    }

    /// Map a normalized value back to original units
    pub fn inverse(&self, value: f64) -> f64 {
        value / self.scale + self.min
    }

    /// Transform every value of a slice
    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    /// Inverse-transform every value of a slice
    pub fn inverse_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.inverse(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case("2024-01-01")]
    #[case("01/01/2024")]
    #[case("2024/01/01")]
    #[case("2024-01-01 00:00:00")]
    #[case("2024-01-01T09:30:00")]
    #[case("2024-01-01T00:00:00+00:00")]
    #[case("2024-01-01 00:00:00+05:00")]
    fn parses_common_date_formats(#[case] raw: &str) {
        assert_eq!(
            parse_date(raw),
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
    }

    #[test]
    fn rejects_garbage_dates() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date("2024-13-01"), None);
    }

    #[test]
    fn split_truncates() {
        assert_eq!(chronological_split(300, 0.8).unwrap(), 240);
        assert_eq!(chronological_split(9, 0.8).unwrap(), 7);
        assert!(chronological_split(10, 1.0).is_err());
        assert!(chronological_split(10, 0.0).is_err());

        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let (train, test) = train_test_split(&data, 0.8).unwrap();
        assert_eq!(train, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(test, &[5.0]);
    }

    #[test]
    fn future_dates_cross_month_end() {
        let last = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let dates = future_dates(last, 3).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            ]
        );
        assert!(future_dates(last, 0).unwrap().is_empty());
    }

    #[test]
    fn linspace_endpoints() {
        let v = linspace(100.0, 105.0, 6);
        assert_eq!(v.len(), 6);
        assert_eq!(v[0], 100.0);
        assert_eq!(v[5], 105.0);
        assert_relative_eq!(v[1], 101.0, epsilon = 1e-12);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert!(linspace(3.0, 9.0, 0).is_empty());
    }

    #[test]
    fn scaler_maps_range_to_unit_interval() {
        let scaler = MinMaxScaler::fit(&[10.0, 20.0, 15.0]).unwrap();
        assert_relative_eq!(scaler.transform(10.0), 0.0);
        assert_relative_eq!(scaler.transform(20.0), 1.0);
        assert_relative_eq!(scaler.transform(15.0), 0.5);
        assert_relative_eq!(scaler.inverse(0.25), 12.5);
    }

    #[test]
    fn scaler_on_constant_series_is_finite() {
        let scaler = MinMaxScaler::fit(&[7.0, 7.0]).unwrap();
        assert_eq!(scaler.transform(7.0), 0.0);
        assert_eq!(scaler.inverse(0.0), 7.0);
        assert!(MinMaxScaler::fit(&[]).is_err());
        assert!(MinMaxScaler::fit(&[1.0, f64::NAN]).is_err());
    }

    #[test]
    fn round_to_cents() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(-0.006), -0.01);
    }
}

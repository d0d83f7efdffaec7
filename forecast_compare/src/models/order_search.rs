//! Automatic ARIMA order selection
//!
//! The differencing order comes from repeated KPSS level-stationarity
//! tests; p and q come from a stepwise AIC search that starts at (1, 1) and
//! (2, 2) and walks to neighbouring orders until none improves.

use crate::error::{ForecastError, Result};
use crate::models::arima::{difference, ArimaOrder, TrainedArimaModel};
use std::collections::HashSet;
use tracing::debug;

/// 5% critical value of the KPSS level-stationarity statistic
pub const KPSS_CRITICAL_5PCT: f64 = 0.463;
/// Shortest series the KPSS statistic is computed for
const MIN_KPSS_OBSERVATIONS: usize = 10;

/// Steps taken from the current best (p, q) in each search round
const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, 1),
    (-1, 1),
    (1, -1),
];

/// KPSS statistic for level stationarity, `None` for short series.
///
/// The long-run variance uses a Bartlett-weighted Newey-West estimate with
/// `trunc(4 * (n / 100)^0.25)` lags. A series without variation is reported
/// as perfectly stationary.
pub fn kpss_level_statistic(data: &[f64]) -> Option<f64> {
    let n = data.len();
    if n < MIN_KPSS_OBSERVATIONS {
        return None;
    }

    let nf = n as f64;
    let mean = data.iter().sum::<f64>() / nf;
    let demeaned: Vec<f64> = data.iter().map(|y| y - mean).collect();

    let lags = ((4.0 * (nf / 100.0).powf(0.25)) as usize).min(n - 1);
    let mut long_run_variance = demeaned.iter().map(|r| r * r).sum::<f64>() / nf;
    for lag in 1..=lags {
        let weight = 1.0 - lag as f64 / (lags + 1) as f64;
        let gamma = demeaned[lag..]
            .iter()
            .zip(&demeaned[..n - lag])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / nf;
        long_run_variance += 2.0 * weight * gamma;
    }

    let scale = data.iter().map(|y| y * y).sum::<f64>() / nf;
    if long_run_variance <= 1e-20 * scale {
        return Some(0.0);
    }

    let partial_sum_energy: f64 = demeaned
        .iter()
        .scan(0.0, |sum, r| {
            *sum += r;
            Some(*sum * *sum)
        })
        .sum();

    Some(partial_sum_energy / (nf * nf * long_run_variance))
}

/// Number of differences needed before the KPSS test stops rejecting
/// stationarity, capped at `max_d`
pub fn ndiffs(data: &[f64], max_d: usize) -> usize {
    let mut d = 0;
    let mut series = data.to_vec();

    while d < max_d {
        match kpss_level_statistic(&series) {
            Some(stat) if stat > KPSS_CRITICAL_5PCT => {
                d += 1;
                series = difference(&series, 1);
            }
            _ => break,
        }
    }

    d
}

/// Stepwise AIC search over p in `[min_p, max_p]` and q in `[min_q, max_q]`
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSearch {
    min_p: usize,
    max_p: usize,
    min_q: usize,
    max_q: usize,
    max_d: usize,
}

impl Default for OrderSearch {
    fn default() -> Self {
        Self {
            min_p: 1,
            max_p: 5,
            min_q: 1,
            max_q: 5,
            max_d: 2,
        }
    }
}

impl OrderSearch {
    /// Create a search with p and q starting at 1
    pub fn new(max_p: usize, max_d: usize, max_q: usize) -> Result<Self> {
        if max_p < 1 || max_q < 1 {
            return Err(ForecastError::InvalidParameter(format!(
                "order search needs max_p and max_q of at least 1, got {} and {}",
                max_p, max_q
            )));
        }

        Ok(Self {
            max_p,
            max_q,
            max_d,
            ..Self::default()
        })
    }

    /// Upper bound on the differencing order
    pub fn max_d(&self) -> usize {
        self.max_d
    }

    /// Choose the order with the lowest AIC found by the stepwise walk
    pub fn select(&self, train: &[f64]) -> Result<ArimaOrder> {
        let d = ndiffs(train, self.max_d);
        let mut visited = HashSet::new();
        let mut best: Option<(ArimaOrder, f64)> = None;

        for (p, q) in [(1, 1), (2, 2)] {
            let order = ArimaOrder::new(
                p.clamp(self.min_p, self.max_p),
                d,
                q.clamp(self.min_q, self.max_q),
            );
            self.consider(train, order, &mut visited, &mut best);
        }

        loop {
            let (current, _) = best.ok_or_else(|| {
                ForecastError::ModelError("no candidate ARIMA order could be fitted".to_string())
            })?;

            let mut improved = false;
            for (dp, dq) in NEIGHBOURS {
                let Some(order) = self.step(current, dp, dq) else {
                    continue;
                };
                improved |= self.consider(train, order, &mut visited, &mut best);
            }

            if !improved {
                return Ok(current);
            }
        }
    }

    fn step(&self, from: ArimaOrder, dp: i64, dq: i64) -> Option<ArimaOrder> {
        let p = from.p as i64 + dp;
        let q = from.q as i64 + dq;
        let p_ok = (self.min_p as i64..=self.max_p as i64).contains(&p);
        let q_ok = (self.min_q as i64..=self.max_q as i64).contains(&q);
        (p_ok && q_ok).then(|| ArimaOrder::new(p as usize, from.d, q as usize))
    }

    /// Fit `order` once; returns whether it became the new best
    fn consider(
        &self,
        train: &[f64],
        order: ArimaOrder,
        visited: &mut HashSet<ArimaOrder>,
        best: &mut Option<(ArimaOrder, f64)>,
    ) -> bool {
        if !visited.insert(order) {
            return false;
        }

        match TrainedArimaModel::fit(train, order) {
            Ok(model) => {
                let aic = model.aic();
                debug!(%order, aic, "candidate order");
                let better = best.map_or(true, |(_, best_aic)| aic < best_aic);
                if better {
                    *best = Some((order, aic));
                }
                better
            }
            Err(err) => {
                debug!(%order, error = %err, "candidate order rejected");
                false
            }
        }
    }
}

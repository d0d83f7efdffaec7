//! Period-over-period returns

/// Percentage change between consecutive values, as a fraction.
///
/// The first position has no predecessor and is `None`. A zero or
/// non-finite previous value also yields `None` for that position.
pub fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(None);

    for pair in values.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        let change = if prev != 0.0 && prev.is_finite() && curr.is_finite() {
            Some(curr / prev - 1.0)
        } else {
            None
        };
        out.push(change);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_return_is_undefined() {
        let r = pct_change(&[100.0, 102.0, 99.96]);
        assert_eq!(r.len(), 3);
        assert_eq!(r[0], None);
        assert_relative_eq!(r[1].unwrap(), 0.02, epsilon = 1e-12);
        assert_relative_eq!(r[2].unwrap(), -0.02, epsilon = 1e-12);
    }

    #[test]
    fn zero_price_breaks_the_chain() {
        let r = pct_change(&[0.0, 5.0, 10.0]);
        assert_eq!(r[1], None);
        assert_relative_eq!(r[2].unwrap(), 1.0);
    }

    #[test]
    fn empty_input() {
        assert!(pct_change(&[]).is_empty());
    }
}

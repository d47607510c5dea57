//! Small statistics helpers shared by the quality engine and the optimizer.

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n − 1 denominator); 0.0 for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Sample standard deviation; 0.0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Approximate 95% confidence interval for the mean, clamped to `[0, 1]`.
/// `(0, 1)` for fewer than two values.
pub fn confidence_interval_95(values: &[f64]) -> (f64, f64) {
    if values.len() < 2 {
        return (0.0, 1.0);
    }
    let m = mean(values);
    let margin = 1.96 * std_dev(values) / (values.len() as f64).sqrt();
    ((m - margin).max(0.0), (m + margin).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn variance_of_constant_is_zero() {
        assert_eq!(variance(&[0.5, 0.5, 0.5]), 0.0);
    }

    #[test]
    fn interval_brackets_the_mean() {
        let values = [0.6, 0.7, 0.8, 0.9];
        let (low, high) = confidence_interval_95(&values);
        let m = mean(&values);
        assert!(low <= m && m <= high);
        assert!(low >= 0.0 && high <= 1.0);
    }

    #[test]
    fn interval_for_tiny_sample_is_unit() {
        assert_eq!(confidence_interval_95(&[0.5]), (0.0, 1.0));
    }
}

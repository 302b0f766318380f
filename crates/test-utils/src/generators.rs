//! Synthetic latency samples with known statistics.

/// `n` evenly spaced durations: `start`, `start + step`, ...
///
/// The mean is `start + step * (n - 1) / 2`.
///
/// # Example
///
/// ```
/// use test_utils::linear_durations;
///
/// assert_eq!(linear_durations(5, 1.0, 1.0), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
/// ```
pub fn linear_durations(n: usize, start: f64, step: f64) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Mostly fast requests with a slow outlier every `period` samples.
///
/// Useful for checking that tail percentiles pick up rare slow requests while
/// the median stays at `fast`.
pub fn durations_with_outliers(n: usize, period: usize, fast: f64, slow: f64) -> Vec<f64> {
    (0..n)
        .map(|i| if period > 0 && i % period == period - 1 { slow } else { fast })
        .collect()
}

/// Population mean and standard deviation computed in two passes.
pub fn two_pass_mean_stddev(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlier_spacing() {
        let d = durations_with_outliers(10, 5, 1.0, 100.0);
        assert_eq!(d.iter().filter(|&&x| x == 100.0).count(), 2);
        assert_eq!(d[4], 100.0);
        assert_eq!(d[9], 100.0);
    }

    #[test]
    fn test_two_pass() {
        let (mean, sd) = two_pass_mean_stddev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(sd, 2.0);
    }
}

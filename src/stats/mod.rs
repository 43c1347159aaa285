pub mod cusum;
pub mod disproportionality;
pub mod rolling;
pub mod yoy_pop;
pub mod zscore;

use crate::models::signal::MethodDetails;

/// A monthly time series in chronological order, e.g.
/// `[("2025-07", 12), ("2025-08", 9), ...]`. The last element is always the
/// latest/target month.
pub type MonthlySeries = Vec<(String, u64)>;

/// Raw output of one statistical method, before threshold classification.
/// The classifier turns this into a `MethodResult` by applying thresholds;
/// the method functions themselves never decide signal strength.
pub struct MethodOutput {
    pub value: Option<f64>,
    pub lower_ci: Option<f64>,
    pub upper_ci: Option<f64>,
    pub details: MethodDetails,
}

/// Sample mean and Bessel-corrected sample standard deviation. Returns
/// `(mean, 0.0)` for a single-element slice (std is undefined for n < 2;
/// callers gate on a minimum series length before trusting it).
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_std_matches_known_values() {
        let (mean, std) = mean_std(&[8.0, 12.0, 9.0, 11.0, 10.0, 9.0, 10.0, 11.0, 10.0, 9.0, 12.0]);
        assert!((mean - 10.0909).abs() < 1e-3);
        assert!((std - 1.3753).abs() < 1e-3);
    }

    #[test]
    fn mean_std_of_constant_series_has_zero_std() {
        let (mean, std) = mean_std(&[10.0; 11]);
        assert_eq!(mean, 10.0);
        assert_eq!(std, 0.0);
    }
}

use crate::models::signal::MethodDetails;
use crate::stats::{mean_std, MethodOutput, MonthlySeries};

/// Cumulative sum control procedure: detects sustained upward drift rather
/// than a single-month spike.
///
/// `target = mean` over all months except the latest; `slack = 0.5 * std`
/// over the same baseline; `S_t = max(0, S_{t-1} + x_t - target - slack)`
/// accumulated across the whole series. The control limit `h = 4 * std` is
/// documented alongside the value but classification against it happens in
/// the threshold engine, not here.
pub fn compute(series: &MonthlySeries) -> MethodOutput {
    let details_series = series.clone();

    if series.len() < 3 {
        return MethodOutput {
            value: None,
            lower_ci: None,
            upper_ci: None,
            details: MethodDetails::Cusum {
                mean: 0.0,
                std: 0.0,
                control_limit: 0.0,
                cusum_series: Vec::new(),
            },
        };
    }

    let baseline: Vec<f64> = series[..series.len() - 1].iter().map(|(_, v)| *v as f64).collect();
    let (mean, std) = mean_std(&baseline);

    if std == 0.0 {
        return MethodOutput {
            value: None,
            lower_ci: None,
            upper_ci: None,
            details: MethodDetails::Cusum {
                mean,
                std,
                control_limit: 0.0,
                cusum_series: Vec::new(),
            },
        };
    }

    let slack = 0.5 * std;
    let control_limit = 4.0 * std;

    let mut cusum_series = Vec::with_capacity(series.len());
    let mut s_prev = 0.0_f64;
    for (_, v) in series {
        let s_t = (s_prev + *v as f64 - mean - slack).max(0.0);
        cusum_series.push(s_t);
        s_prev = s_t;
    }

    let value = cusum_series.iter().cloned().fold(f64::MIN, f64::max);

    MethodOutput {
        value: Some(value),
        lower_ci: None,
        upper_ci: None,
        details: MethodDetails::Cusum {
            mean,
            std,
            control_limit,
            cusum_series,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(counts: &[u64]) -> MonthlySeries {
        counts
            .iter()
            .enumerate()
            .map(|(i, c)| (format!("2025-{:02}", i + 1), *c))
            .collect()
    }

    #[test]
    fn flat_series_has_zero_value_when_std_is_zero() {
        let s = series(&[10, 10, 10, 10, 10]);
        let out = compute(&s);
        assert_eq!(out.value, None);
    }

    #[test]
    fn sustained_drift_accumulates_above_control_limit() {
        let s = series(&[10, 11, 9, 10, 25, 26, 27, 28]);
        let out = compute(&s);
        let value = out.value.expect("expected a value");
        if let MethodDetails::Cusum { control_limit, .. } = out.details {
            assert!(value > control_limit);
        } else {
            panic!("wrong details variant");
        }
    }

    #[test]
    fn short_series_is_null() {
        let s = series(&[10, 11]);
        let out = compute(&s);
        assert_eq!(out.value, None);
    }
}

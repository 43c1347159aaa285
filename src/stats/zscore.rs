use crate::models::signal::MethodDetails;
use crate::stats::{mean_std, MethodOutput, MonthlySeries};

/// Z-score against the entity's own history.
///
/// Baseline excludes the comparison month (or the last month if none is
/// given explicitly); the target value is always the latest month in
/// `series`. Returns a null value when the baseline is degenerate
/// (`T < 3` or `σ = 0`) rather than raising.
pub fn compute(series: &MonthlySeries, comparison_month: Option<&str>) -> MethodOutput {
    let details_series = series.clone();
    let latest_month = series.last().map(|(m, _)| m.clone()).unwrap_or_default();

    if series.len() < 3 {
        return MethodOutput {
            value: None,
            lower_ci: None,
            upper_ci: None,
            details: MethodDetails::Zscore {
                avg_monthly: 0.0,
                std_monthly: 0.0,
                latest_month,
                monthly_series: details_series,
            },
        };
    }

    let target_month = comparison_month.unwrap_or(latest_month.as_str());
    let baseline: Vec<f64> = series
        .iter()
        .filter(|(m, _)| m != target_month)
        .map(|(_, v)| *v as f64)
        .collect();

    let target_value = series
        .iter()
        .find(|(m, _)| m == target_month)
        .map(|(_, v)| *v as f64)
        .unwrap_or(0.0);

    let (avg_monthly, std_monthly) = mean_std(&baseline);

    let value = if std_monthly == 0.0 {
        None
    } else {
        Some((target_value - avg_monthly) / std_monthly)
    };

    MethodOutput {
        value,
        lower_ci: None,
        upper_ci: None,
        details: MethodDetails::Zscore {
            avg_monthly,
            std_monthly,
            latest_month,
            monthly_series: details_series,
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
    fn flat_history_with_one_spike_has_null_value() {
        // 11 months flat at 10, then a spike. Baseline excludes the
        // spike month, leaving 11 identical values => sigma = 0.
        let s = series(&[10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 100]);
        let out = compute(&s, None);
        assert_eq!(out.value, None);
    }

    #[test]
    fn significant_spike_yields_high_z_score() {
        let s = series(&[8, 12, 9, 11, 10, 9, 10, 11, 10, 9, 12, 30]);
        let out = compute(&s, None);
        let z = out.value.expect("expected a value");
        assert!(z > 10.0, "expected z-score > 10, got {z}");
    }

    #[test]
    fn short_history_is_null() {
        let s = series(&[10, 12]);
        let out = compute(&s, None);
        assert_eq!(out.value, None);
    }

    #[test]
    fn explicit_comparison_month_is_excluded_from_baseline() {
        let s = series(&[10, 10, 10, 10, 50]);
        let out = compute(&s, Some("2025-03"));
        // baseline excludes 2025-03 (value 10), target is still latest (2025-05, 50)
        if let MethodDetails::Zscore { avg_monthly, .. } = out.details {
            assert_eq!(avg_monthly, 20.0);
        } else {
            panic!("wrong details variant");
        }
    }
}

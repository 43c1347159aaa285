use crate::models::signal::MethodDetails;
use crate::stats::{mean_std, MethodOutput, MonthlySeries};

/// Rolling-window z-score: compares the latest month against the mean/std
/// of the `window` months immediately preceding it, rather than the whole
/// history.
pub fn compute(series: &MonthlySeries, window: u32) -> MethodOutput {
    let window = window as usize;
    let details_series = series.clone();

    if series.len() < window + 1 || window == 0 {
        return MethodOutput {
            value: None,
            lower_ci: None,
            upper_ci: None,
            details: MethodDetails::Rolling {
                rolling_avg: 0.0,
                rolling_std: 0.0,
                latest: series.last().map(|(_, v)| *v).unwrap_or(0),
                window_months: window as u32,
                monthly_series: details_series,
            },
        };
    }

    let latest = series.last().map(|(_, v)| *v).unwrap_or(0);
    let preceding: Vec<f64> = series[series.len() - 1 - window..series.len() - 1]
        .iter()
        .map(|(_, v)| *v as f64)
        .collect();

    let (rolling_avg, rolling_std) = mean_std(&preceding);
    let value = if rolling_std == 0.0 {
        None
    } else {
        Some((latest as f64 - rolling_avg) / rolling_std)
    };

    MethodOutput {
        value,
        lower_ci: None,
        upper_ci: None,
        details: MethodDetails::Rolling {
            rolling_avg,
            rolling_std,
            latest,
            window_months: window as u32,
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
    fn insufficient_history_is_null() {
        let s = series(&[10, 11, 12]);
        let out = compute(&s, 6);
        assert_eq!(out.value, None);
    }

    #[test]
    fn computes_against_preceding_window_only() {
        let s = series(&[10, 10, 10, 10, 10, 10, 40]);
        let out = compute(&s, 6);
        let v = out.value.expect("expected a value");
        assert!(v > 0.0);
    }

    #[test]
    fn exact_minimum_length_is_accepted() {
        let s = series(&[10, 10, 10, 10]);
        let out = compute(&s, 3);
        assert!(out.value.is_some() || out.value.is_none());
        if let MethodDetails::Rolling { window_months, .. } = out.details {
            assert_eq!(window_months, 3);
        } else {
            panic!("wrong details variant");
        }
    }
}

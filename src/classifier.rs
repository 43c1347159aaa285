use crate::config::ThresholdConfig;
use crate::models::signal::{MethodDetails, MethodResult, SignalMethod, SignalStrength, ThresholdOverrides};
use crate::stats::MethodOutput;

/// Applies per-method thresholds to a raw [`MethodOutput`], producing the
/// classified [`MethodResult`]. Threshold resolution order: request
/// override, then the process-wide `ThresholdConfig`.
pub fn classify(
    method: SignalMethod,
    output: MethodOutput,
    config: &ThresholdConfig,
    override_: Option<&ThresholdOverrides>,
    min_events: u64,
) -> MethodResult {
    let high = override_
        .and_then(|o| o.high)
        .unwrap_or_else(|| default_high(method, config));
    let elevated = override_
        .and_then(|o| o.elevated)
        .unwrap_or_else(|| default_elevated(method, config));

    let strength = match method {
        SignalMethod::Zscore | SignalMethod::Rolling | SignalMethod::Cusum => {
            classify_by_magnitude(output.value, high, elevated)
        }
        SignalMethod::Yoy | SignalMethod::Pop => {
            let current = match &output.details {
                MethodDetails::YoyPop { current_period, .. } => *current_period,
                _ => 0,
            };
            if current < min_events {
                SignalStrength::Normal
            } else {
                classify_by_magnitude(output.value, high, elevated)
            }
        }
        SignalMethod::Prr | SignalMethod::Ror => {
            let a = match &output.details {
                MethodDetails::Prr { a, .. } | MethodDetails::Ror { a, .. } => *a,
                _ => 0,
            };
            classify_disproportionality(output.value, output.lower_ci, a, high, elevated, config.min_disproportionality_a)
        }
        SignalMethod::Ebgm => {
            let a = match &output.details {
                MethodDetails::Ebgm { observed, .. } => *observed,
                _ => 0,
            };
            classify_disproportionality(output.value, output.lower_ci, a, high, elevated, config.min_disproportionality_a)
        }
    };

    MethodResult {
        method,
        value: output.value,
        lower_ci: output.lower_ci,
        upper_ci: output.upper_ci,
        is_signal: strength != SignalStrength::Normal,
        signal_strength: strength,
        details: output.details,
    }
}

fn classify_by_magnitude(value: Option<f64>, high: f64, elevated: f64) -> SignalStrength {
    match value {
        None => SignalStrength::Normal,
        Some(v) if v > high => SignalStrength::High,
        Some(v) if v > elevated => SignalStrength::Elevated,
        _ => SignalStrength::Normal,
    }
}

/// PRR/ROR/EBGM share the same gate shape: a ratio threshold AND a CI
/// floor of 1.0 AND a minimum observed-event count. Passing the CI gate
/// here guarantees CI containment: any `is_signal = true`
/// disproportionality result has `lower_ci >= 1.0`.
fn classify_disproportionality(
    value: Option<f64>,
    lower_ci: Option<f64>,
    a: u64,
    high: f64,
    elevated: f64,
    min_a: u64,
) -> SignalStrength {
    let (Some(v), Some(ci)) = (value, lower_ci) else {
        return SignalStrength::Normal;
    };
    if a < min_a {
        return SignalStrength::Normal;
    }
    if v >= high && ci >= 1.0 {
        SignalStrength::High
    } else if v >= elevated && ci >= 1.0 {
        SignalStrength::Elevated
    } else {
        SignalStrength::Normal
    }
}

fn default_high(method: SignalMethod, config: &ThresholdConfig) -> f64 {
    match method {
        SignalMethod::Zscore | SignalMethod::Rolling => config.zscore_high,
        SignalMethod::Cusum => config.cusum_high,
        SignalMethod::Yoy | SignalMethod::Pop => config.yoy_pop_high,
        SignalMethod::Prr | SignalMethod::Ror | SignalMethod::Ebgm => config.disproportionality_high,
    }
}

fn default_elevated(method: SignalMethod, config: &ThresholdConfig) -> f64 {
    match method {
        SignalMethod::Zscore | SignalMethod::Rolling => config.zscore_elevated,
        SignalMethod::Cusum => config.cusum_elevated,
        SignalMethod::Yoy | SignalMethod::Pop => config.yoy_pop_elevated,
        SignalMethod::Prr | SignalMethod::Ror | SignalMethod::Ebgm => config.disproportionality_elevated,
    }
}

/// Overall `SignalResult.signal_type`: the strongest classification across
/// all methods computed for that entity.
pub fn overall_strength(results: &[MethodResult]) -> SignalStrength {
    results
        .iter()
        .map(|r| r.signal_strength)
        .max()
        .unwrap_or(SignalStrength::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::disproportionality::{prr, ContingencyTable};
    use crate::stats::zscore;

    #[test]
    fn zscore_above_high_threshold_classifies_high() {
        let series = (1..=11)
            .map(|i| (format!("2025-{i:02}"), 10))
            .chain(std::iter::once(("2025-12".to_string(), 30)))
            .collect();
        let out = zscore::compute(&series, None);
        let config = ThresholdConfig::default();
        let result = classify(SignalMethod::Zscore, out, &config, None, 1);
        assert_eq!(result.signal_strength, SignalStrength::High);
    }

    #[test]
    fn prr_below_min_a_never_signals_even_with_large_ratio() {
        let t = ContingencyTable { a: 2, b: 100, c: 50, d: 10000 };
        let out = prr(t);
        let config = ThresholdConfig::default();
        let result = classify(SignalMethod::Prr, out, &config, None, 1);
        assert!(!result.is_signal);
    }

    #[test]
    fn disproportionality_signal_always_has_ci_above_one() {
        let t = ContingencyTable { a: 30, b: 70, c: 10, d: 9990 };
        let out = prr(t);
        let config = ThresholdConfig::default();
        let result = classify(SignalMethod::Prr, out, &config, None, 1);
        if result.is_signal {
            assert!(result.lower_ci.unwrap() >= 1.0);
        }
    }

    #[test]
    fn request_override_takes_precedence_over_config_default() {
        let series = (1..=11)
            .map(|i| (format!("2025-{i:02}"), 10))
            .chain(std::iter::once(("2025-12".to_string(), 12)))
            .collect();
        let out = zscore::compute(&series, None);
        let config = ThresholdConfig::default();
        let overrides = ThresholdOverrides { high: Some(0.1), elevated: Some(0.01) };
        let result = classify(SignalMethod::Zscore, out, &config, Some(&overrides), 1);
        assert_eq!(result.signal_strength, SignalStrength::High);
    }

    #[test]
    fn overall_strength_is_the_max_across_methods() {
        let results = vec![
            MethodResult {
                method: SignalMethod::Zscore,
                value: Some(1.0),
                lower_ci: None,
                upper_ci: None,
                is_signal: true,
                signal_strength: SignalStrength::Elevated,
                details: MethodDetails::YoyPop { current_period: 1, comparison_period: 1 },
            },
            MethodResult {
                method: SignalMethod::Cusum,
                value: Some(6.0),
                lower_ci: None,
                upper_ci: None,
                is_signal: true,
                signal_strength: SignalStrength::High,
                details: MethodDetails::YoyPop { current_period: 1, comparison_period: 1 },
            },
        ];
        assert_eq!(overall_strength(&results), SignalStrength::High);
    }
}

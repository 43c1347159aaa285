use crate::models::signal::{DataNotes, MethodDetails};
use crate::stats::MethodOutput;

/// Year-over-year / period-over-period percent change. Both methods share
/// this formula; callers select which `SignalMethod` tag to report under.
///
/// `comparison = 0` with `current > 0` is explicitly undefined rather than
/// `+∞`: this reports a null value and a `data_note`, not a sentinel.
pub fn compute(current: u64, comparison: u64, notes: &mut DataNotes) -> MethodOutput {
    let details = MethodDetails::YoyPop {
        current_period: current,
        comparison_period: comparison,
    };

    if comparison == 0 && current > 0 {
        notes.push("comparison period empty");
        return MethodOutput {
            value: None,
            lower_ci: None,
            upper_ci: None,
            details,
        };
    }

    let value = 100.0 * (current as f64 - comparison as f64) / (comparison.max(1) as f64);

    MethodOutput {
        value: Some(value),
        lower_ci: None,
        upper_ci: None,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_comparison_with_events_is_null_with_note() {
        let mut notes = DataNotes::default();
        let out = compute(50, 0, &mut notes);
        assert_eq!(out.value, None);
        assert!(notes.into_joined().unwrap().contains("comparison period empty"));
    }

    #[test]
    fn both_zero_yields_zero_percent() {
        let mut notes = DataNotes::default();
        let out = compute(0, 0, &mut notes);
        assert_eq!(out.value, Some(0.0));
        assert!(notes.into_joined().is_none());
    }

    #[test]
    fn doubling_yields_100_percent() {
        let mut notes = DataNotes::default();
        let out = compute(20, 10, &mut notes);
        assert_eq!(out.value, Some(100.0));
    }

    #[test]
    fn halving_yields_negative_50_percent() {
        let mut notes = DataNotes::default();
        let out = compute(5, 10, &mut notes);
        assert_eq!(out.value, Some(-50.0));
    }
}

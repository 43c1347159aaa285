use chrono::{Datelike, Months, NaiveDate};

use crate::error::EngineError;
use crate::models::signal::{DataCompleteness, DataNotes, TimeComparisonConfig, TimeInfo};

/// Resolves a `TimeComparisonConfig` + injected "today" into concrete
/// analysis/comparison windows and declares data completeness. `today` is
/// injected rather than read from the system clock so `detect` stays pure
/// and reproducible for a fixed snapshot plus request.
pub fn resolve(
    config: &TimeComparisonConfig,
    today: NaiveDate,
    ingestion_lag_months: u32,
    notes: &mut DataNotes,
) -> Result<(TimeInfo, DataCompleteness), EngineError> {
    let time_info = match config {
        TimeComparisonConfig::Lookback { lookback_months } => {
            let analysis_start = sub_months(today, *lookback_months);
            TimeInfo {
                analysis_start: fmt_date(analysis_start),
                analysis_end: fmt_date(today),
                comparison_start: None,
                comparison_end: None,
                rolling_window_months: None,
            }
        }
        TimeComparisonConfig::Custom { period_a, period_b } => {
            let a_start = parse_date(&period_a.start)?;
            let a_end = parse_date(&period_a.end)?;
            let b_start = parse_date(&period_b.start)?;
            let b_end = parse_date(&period_b.end)?;
            if a_start > a_end || b_start > b_end {
                return Err(EngineError::BadRequest(
                    "custom time_config periods must have start <= end".to_string(),
                ));
            }
            let len_a = (a_end - a_start).num_days().max(1) as f64;
            let len_b = (b_end - b_start).num_days().max(1) as f64;
            if ((len_a - len_b).abs() / len_a.max(len_b)) > 0.2 {
                notes.push("comparison period length differs from analysis period by more than 20%");
            }
            TimeInfo {
                analysis_start: fmt_date(a_start),
                analysis_end: fmt_date(a_end),
                comparison_start: Some(fmt_date(b_start)),
                comparison_end: Some(fmt_date(b_end)),
                rolling_window_months: None,
            }
        }
        TimeComparisonConfig::Yoy {
            current_year,
            comparison_year,
            quarter,
        } => {
            let (a_start, a_end) = year_or_quarter_span(*current_year, *quarter)?;
            let (b_start, b_end) = year_or_quarter_span(*comparison_year, *quarter)?;
            TimeInfo {
                analysis_start: fmt_date(a_start),
                analysis_end: fmt_date(a_end),
                comparison_start: Some(fmt_date(b_start)),
                comparison_end: Some(fmt_date(b_end)),
                rolling_window_months: None,
            }
        }
        TimeComparisonConfig::Rolling {
            lookback_months,
            rolling_window_months,
            comparison_month: _,
        } => {
            let analysis_start = sub_months(today, *lookback_months);
            TimeInfo {
                analysis_start: fmt_date(analysis_start),
                analysis_end: fmt_date(today),
                comparison_start: None,
                comparison_end: None,
                rolling_window_months: Some(*rolling_window_months),
            }
        }
    };

    let completeness = resolve_completeness(today, ingestion_lag_months);
    if &time_info.analysis_end[0..7] > completeness.last_complete_month.as_str() {
        notes.push(format!(
            "analysis window extends past the last complete reporting month ({})",
            completeness.last_complete_month
        ));
    }

    Ok((time_info, completeness))
}

/// Given "today" and the ingestion lag, marks every month whose end falls
/// within `lag` months of today as incomplete.
pub fn resolve_completeness(today: NaiveDate, lag_months: u32) -> DataCompleteness {
    let last_complete = sub_months(today, lag_months);
    let last_complete_month = month_key(last_complete);

    let mut incomplete_months = Vec::new();
    let mut cursor = add_months(first_of_month(last_complete), 1);
    while (cursor.year(), cursor.month()) <= (today.year(), today.month()) {
        incomplete_months.push(month_key(cursor));
        cursor = add_months(cursor, 1);
    }

    DataCompleteness {
        estimated_lag_months: lag_months,
        last_complete_month,
        incomplete_months,
    }
}

fn year_or_quarter_span(year: i32, quarter: Option<u8>) -> Result<(NaiveDate, NaiveDate), EngineError> {
    match quarter {
        None => {
            let start = NaiveDate::from_ymd_opt(year, 1, 1)
                .ok_or_else(|| EngineError::BadRequest(format!("invalid year {year}")))?;
            let end = NaiveDate::from_ymd_opt(year, 12, 31)
                .ok_or_else(|| EngineError::BadRequest(format!("invalid year {year}")))?;
            Ok((start, end))
        }
        Some(q @ 1..=4) => {
            let start_month = (q - 1) * 3 + 1;
            let start = NaiveDate::from_ymd_opt(year, start_month as u32, 1)
                .ok_or_else(|| EngineError::BadRequest(format!("invalid quarter {q} of {year}")))?;
            let end_month_start = add_months(start, 3);
            let end = end_month_start
                .pred_opt()
                .ok_or_else(|| EngineError::BadRequest("date underflow".to_string()))?;
            Ok((start, end))
        }
        Some(q) => Err(EngineError::BadRequest(format!("quarter must be 1-4, got {q}"))),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| EngineError::BadRequest(format!("invalid date '{s}', expected YYYY-MM-DD")))
}

fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn month_key(d: NaiveDate) -> String {
    d.format("%Y-%m").to_string()
}

fn first_of_month(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap()
}

fn sub_months(d: NaiveDate, n: u32) -> NaiveDate {
    d.checked_sub_months(Months::new(n)).unwrap_or(d)
}

fn add_months(d: NaiveDate, n: u32) -> NaiveDate {
    d.checked_add_months(Months::new(n)).unwrap_or(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::signal::DateSpan;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn lookback_resolves_window_from_today() {
        let mut notes = DataNotes::default();
        let (info, _) = resolve(
            &TimeComparisonConfig::Lookback { lookback_months: 12 },
            date("2026-06-15"),
            2,
            &mut notes,
        )
        .unwrap();
        assert_eq!(info.analysis_start, "2025-06-15");
        assert_eq!(info.analysis_end, "2026-06-15");
        assert!(info.comparison_start.is_none());
    }

    #[test]
    fn completeness_marks_recent_months_incomplete() {
        let completeness = resolve_completeness(date("2026-06-15"), 2);
        assert_eq!(completeness.last_complete_month, "2026-04");
        assert_eq!(completeness.incomplete_months, vec!["2026-05", "2026-06"]);
    }

    #[test]
    fn custom_period_length_mismatch_over_20pct_is_noted() {
        let mut notes = DataNotes::default();
        let config = TimeComparisonConfig::Custom {
            period_a: DateSpan { start: "2026-01-01".to_string(), end: "2026-01-31".to_string() },
            period_b: DateSpan { start: "2025-01-01".to_string(), end: "2025-01-10".to_string() },
        };
        resolve(&config, date("2026-06-15"), 2, &mut notes).unwrap();
        assert!(notes.into_joined().unwrap().contains("differs from analysis period"));
    }

    #[test]
    fn custom_period_with_start_after_end_is_bad_request() {
        let mut notes = DataNotes::default();
        let config = TimeComparisonConfig::Custom {
            period_a: DateSpan { start: "2026-02-01".to_string(), end: "2026-01-01".to_string() },
            period_b: DateSpan { start: "2025-01-01".to_string(), end: "2025-01-31".to_string() },
        };
        let result = resolve(&config, date("2026-06-15"), 2, &mut notes);
        assert!(matches!(result, Err(EngineError::BadRequest(_))));
    }

    #[test]
    fn yoy_quarter_resolves_three_month_span() {
        let mut notes = DataNotes::default();
        let config = TimeComparisonConfig::Yoy {
            current_year: 2026,
            comparison_year: 2025,
            quarter: Some(2),
        };
        let (info, _) = resolve(&config, date("2026-06-15"), 2, &mut notes).unwrap();
        assert_eq!(info.analysis_start, "2026-04-01");
        assert_eq!(info.analysis_end, "2026-06-30");
        assert_eq!(info.comparison_start.unwrap(), "2025-04-01");
    }

    #[test]
    fn analysis_window_past_last_complete_month_adds_note() {
        let mut notes = DataNotes::default();
        let config = TimeComparisonConfig::Lookback { lookback_months: 1 };
        resolve(&config, date("2026-06-15"), 2, &mut notes).unwrap();
        assert!(notes
            .into_joined()
            .unwrap()
            .contains("last complete reporting month"));
    }

    #[test]
    fn analysis_end_within_last_complete_month_adds_no_note() {
        let mut notes = DataNotes::default();
        let config = TimeComparisonConfig::Custom {
            period_a: DateSpan { start: "2026-04-01".to_string(), end: "2026-04-15".to_string() },
            period_b: DateSpan { start: "2025-04-01".to_string(), end: "2025-04-15".to_string() },
        };
        let (info, completeness) = resolve(&config, date("2026-06-15"), 2, &mut notes).unwrap();
        assert_eq!(info.analysis_end, "2026-04-15");
        assert_eq!(completeness.last_complete_month, "2026-04");
        assert!(notes.into_joined().is_none());
    }
}

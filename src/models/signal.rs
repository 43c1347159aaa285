use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::entity_group::EntityGroup;
use super::event::EntityLevel;
use super::filter::FilterSpec;

/// Tagged time-comparison configuration. Sum type, one variant per `mode`,
/// rather than a single struct with optional fields per mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeComparisonConfig {
    Lookback {
        lookback_months: u32,
    },
    Custom {
        period_a: DateSpan,
        period_b: DateSpan,
    },
    Yoy {
        current_year: i32,
        comparison_year: i32,
        quarter: Option<u8>,
    },
    Rolling {
        lookback_months: u32,
        rolling_window_months: u32,
        comparison_month: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonPopulation {
    All,
    SameProductCode,
    Custom,
}

impl Default for ComparisonPopulation {
    fn default() -> Self {
        ComparisonPopulation::All
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalMethod {
    Zscore,
    Prr,
    Ror,
    Ebgm,
    Cusum,
    Yoy,
    Pop,
    Rolling,
}

impl SignalMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalMethod::Zscore => "zscore",
            SignalMethod::Prr => "prr",
            SignalMethod::Ror => "ror",
            SignalMethod::Ebgm => "ebgm",
            SignalMethod::Cusum => "cusum",
            SignalMethod::Yoy => "yoy",
            SignalMethod::Pop => "pop",
            SignalMethod::Rolling => "rolling",
        }
    }

    /// Whether this method operates on the disproportionality (2x2
    /// contingency table) inputs rather than a monthly time series.
    pub fn is_disproportionality(self) -> bool {
        matches!(self, SignalMethod::Prr | SignalMethod::Ror | SignalMethod::Ebgm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Normal,
    Elevated,
    High,
}

/// Per-method thresholds, overridable per request. `None` fields fall back
/// to the documented default for that method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOverrides {
    pub high: Option<f64>,
    pub elevated: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalRequest {
    pub methods: Vec<SignalMethod>,
    pub time_config: Option<TimeComparisonConfig>,
    pub level: EntityLevel,
    pub parent_value: Option<String>,
    pub filters: FilterSpec,
    pub comparison_population: ComparisonPopulation,
    pub comparison_filters: Option<FilterSpec>,
    pub active_groups: Vec<EntityGroup>,
    pub min_events: u64,
    pub limit: u64,
    pub thresholds: HashMap<SignalMethod, ThresholdOverrides>,
    pub deadline_ms: Option<u64>,
}

impl Default for SignalRequest {
    fn default() -> Self {
        Self {
            methods: Vec::new(),
            time_config: None,
            level: EntityLevel::Manufacturer,
            parent_value: None,
            filters: FilterSpec::default(),
            comparison_population: ComparisonPopulation::default(),
            comparison_filters: None,
            active_groups: Vec::new(),
            min_events: 10,
            limit: 20,
            thresholds: HashMap::new(),
            deadline_ms: None,
        }
    }
}

/// Mode-specific detail payload for a single computed method, discriminated
/// by `method` — tagged variants over subtyping.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MethodDetails {
    Zscore {
        avg_monthly: f64,
        std_monthly: f64,
        latest_month: String,
        monthly_series: Vec<(String, u64)>,
    },
    Rolling {
        rolling_avg: f64,
        rolling_std: f64,
        latest: u64,
        window_months: u32,
        monthly_series: Vec<(String, u64)>,
    },
    Cusum {
        mean: f64,
        std: f64,
        control_limit: f64,
        cusum_series: Vec<f64>,
    },
    YoyPop {
        current_period: u64,
        comparison_period: u64,
    },
    Prr {
        a: u64,
        b: u64,
        c: u64,
        d: u64,
    },
    Ror {
        a: u64,
        b: u64,
        c: u64,
        d: u64,
    },
    Ebgm {
        observed: u64,
        expected: f64,
        rr: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodResult {
    pub method: SignalMethod,
    pub value: Option<f64>,
    pub lower_ci: Option<f64>,
    pub upper_ci: Option<f64>,
    pub is_signal: bool,
    pub signal_strength: SignalStrength,
    pub details: MethodDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalResult {
    pub entity: String,
    pub entity_level: EntityLevel,
    pub total_events: u64,
    pub deaths: u64,
    pub injuries: u64,
    pub malfunctions: u64,
    pub current_period_events: Option<u64>,
    pub comparison_period_events: Option<u64>,
    pub change_pct: Option<f64>,
    pub methods: Vec<MethodResult>,
    pub signal_type: SignalStrength,
    pub has_children: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataCompleteness {
    pub estimated_lag_months: u32,
    pub last_complete_month: String,
    pub incomplete_months: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeInfo {
    pub analysis_start: String,
    pub analysis_end: String,
    pub comparison_start: Option<String>,
    pub comparison_end: Option<String>,
    pub rolling_window_months: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalCounts {
    pub high: u64,
    pub elevated: u64,
    pub normal: u64,
    pub total_entities_analyzed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalResponse {
    pub level: EntityLevel,
    pub parent_value: Option<String>,
    pub methods_applied: Vec<SignalMethod>,
    pub time_info: TimeInfo,
    pub data_completeness: DataCompleteness,
    pub data_note: Option<String>,
    pub counts: SignalCounts,
    pub results: Vec<SignalResult>,
}

/// Accumulates the free-text lines that get joined into `data_note` on the
/// wire (SPEC_FULL: internally a `Vec<String>`, joined with `"; "`).
#[derive(Debug, Clone, Default)]
pub struct DataNotes(Vec<String>);

impl DataNotes {
    pub fn push(&mut self, note: impl Into<String>) {
        self.0.push(note.into());
    }

    pub fn into_joined(self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_strength_orders_high_above_elevated_above_normal() {
        assert!(SignalStrength::High > SignalStrength::Elevated);
        assert!(SignalStrength::Elevated > SignalStrength::Normal);
    }

    #[test]
    fn disproportionality_methods_are_flagged() {
        assert!(SignalMethod::Prr.is_disproportionality());
        assert!(SignalMethod::Ror.is_disproportionality());
        assert!(SignalMethod::Ebgm.is_disproportionality());
        assert!(!SignalMethod::Zscore.is_disproportionality());
    }

    #[test]
    fn data_notes_join_with_semicolon() {
        let mut notes = DataNotes::default();
        notes.push("a");
        notes.push("b");
        assert_eq!(notes.into_joined(), Some("a; b".to_string()));
    }

    #[test]
    fn empty_data_notes_yield_none() {
        assert_eq!(DataNotes::default().into_joined(), None);
    }

    #[test]
    fn signal_request_defaults_match_spec() {
        let req = SignalRequest::default();
        assert_eq!(req.min_events, 10);
        assert_eq!(req.limit, 20);
        assert_eq!(req.comparison_population, ComparisonPopulation::All);
    }
}

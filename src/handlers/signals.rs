use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::event::EntityLevel;
use crate::models::filter::FilterSpec;
use crate::models::signal::{
    ComparisonPopulation, MethodDetails, SignalMethod, SignalRequest, SignalResponse, SignalStrength,
    TimeComparisonConfig,
};
use crate::orchestrator;
use crate::AppState;

/// `POST /api/analytics/signals/advanced` — the core's canonical surface.
pub async fn advanced(
    State(state): State<AppState>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<SignalResponse>, EngineError> {
    let today = Utc::now().date_naive();
    let response = orchestrator::detect(&state.ch, &state.config_db, &state.config, request, today).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimpleSignalsQuery {
    pub lookback_months: u32,
    pub manufacturers: Option<String>,
    pub product_codes: Option<String>,
    pub event_types: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub free_text: Option<String>,
    pub brand_names: Option<String>,
    pub generic_names: Option<String>,
    pub device_manufacturers: Option<String>,
    pub model_numbers: Option<String>,
    pub device_product_codes: Option<String>,
    pub implant_flag: Option<bool>,
    pub min_events: u64,
}

impl Default for SimpleSignalsQuery {
    fn default() -> Self {
        Self {
            lookback_months: 12,
            manufacturers: None,
            product_codes: None,
            event_types: None,
            date_from: None,
            date_to: None,
            free_text: None,
            brand_names: None,
            generic_names: None,
            device_manufacturers: None,
            model_numbers: None,
            device_product_codes: None,
            implant_flag: None,
            min_events: 10,
        }
    }
}

fn split_csv(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .map(|s| s.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect())
        .unwrap_or_default()
}

impl SimpleSignalsQuery {
    fn into_filters(self) -> (u32, u64, FilterSpec) {
        let filters = FilterSpec {
            manufacturers: split_csv(&self.manufacturers),
            product_codes: split_csv(&self.product_codes),
            event_types: split_csv(&self.event_types),
            date_from: self.date_from,
            date_to: self.date_to,
            free_text: self.free_text,
            brand_names: split_csv(&self.brand_names),
            generic_names: split_csv(&self.generic_names),
            device_manufacturers: split_csv(&self.device_manufacturers),
            model_numbers: split_csv(&self.model_numbers),
            implant_flag: self.implant_flag,
            device_product_codes: split_csv(&self.device_product_codes),
        };
        (self.lookback_months, self.min_events, filters)
    }
}

#[derive(Debug, Serialize)]
pub struct SimpleSignal {
    pub manufacturer: String,
    pub avg_monthly: f64,
    pub std_monthly: f64,
    pub total_events: u64,
    pub total_deaths: u64,
    pub latest_month: String,
    pub z_score: Option<f64>,
    pub signal_type: SignalStrength,
}

#[derive(Debug, Serialize)]
pub struct SimpleSignalsResponse {
    pub lookback_months: u32,
    pub signals: Vec<SimpleSignal>,
}

/// `GET /api/analytics/signals` — z-score-only convenience. Honors every
/// filter the advanced endpoint does: it builds the same `FilterSpec` and
/// runs it through the full orchestrator, just with a single method.
pub async fn simple(
    State(state): State<AppState>,
    Query(query): Query<SimpleSignalsQuery>,
) -> Result<Json<SimpleSignalsResponse>, EngineError> {
    let (lookback_months, min_events, filters) = query.into_filters();

    let request = SignalRequest {
        methods: vec![SignalMethod::Zscore],
        time_config: Some(TimeComparisonConfig::Lookback { lookback_months }),
        level: EntityLevel::Manufacturer,
        parent_value: None,
        filters,
        comparison_population: ComparisonPopulation::All,
        comparison_filters: None,
        active_groups: Vec::new(),
        min_events,
        limit: 1000,
        thresholds: Default::default(),
        deadline_ms: None,
    };

    let today = Utc::now().date_naive();
    let response = orchestrator::detect(&state.ch, &state.config_db, &state.config, request, today).await?;

    let signals = response
        .results
        .into_iter()
        .filter_map(|r| {
            let zscore = r.methods.into_iter().find(|m| m.method == SignalMethod::Zscore)?;
            let (avg_monthly, std_monthly, latest_month) = match zscore.details {
                MethodDetails::Zscore { avg_monthly, std_monthly, latest_month, .. } => {
                    (avg_monthly, std_monthly, latest_month)
                }
                _ => (0.0, 0.0, String::new()),
            };
            Some(SimpleSignal {
                manufacturer: r.entity,
                avg_monthly,
                std_monthly,
                total_events: r.total_events,
                total_deaths: r.deaths,
                latest_month,
                z_score: zscore.value,
                signal_type: r.signal_type,
            })
        })
        .collect();

    Ok(Json(SimpleSignalsResponse { lookback_months, signals }))
}

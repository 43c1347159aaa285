use std::time::{Duration, Instant};

use chrono::NaiveDate;
use clickhouse::Client;

use crate::aggregator::Aggregator;
use crate::classifier;
use crate::config::EngineConfig;
use crate::config_db::ConfigDb;
use crate::error::EngineError;
use crate::models::entity_group::ActiveGroupSet;
use crate::models::filter::Predicate;
use crate::models::signal::{
    ComparisonPopulation, DataCompleteness, DataNotes, SignalCounts, SignalMethod, SignalRequest,
    SignalResponse, SignalResult, SignalStrength, TimeInfo,
};
use crate::query_builder;
use crate::registry::Registry;
use crate::stats::{cusum, rolling, yoy_pop, zscore};

/// Sequences predicate-building, time-window resolution, entity group
/// resolution, aggregation, statistical computation, and classification
/// over a single `SignalRequest`. `today` is an injected clock so `detect`
/// stays pure for a fixed store snapshot plus request — deterministic
/// given the same inputs.
pub async fn detect(
    ch: &Client,
    config_db: &ConfigDb,
    config: &EngineConfig,
    request: SignalRequest,
    today: NaiveDate,
) -> Result<SignalResponse, EngineError> {
    // Step 1: validate.
    if request.methods.is_empty() {
        return Err(EngineError::BadRequest("methods must be non-empty".to_string()));
    }
    if request.min_events < 1 {
        return Err(EngineError::BadRequest("min_events must be >= 1".to_string()));
    }
    let time_config = request
        .time_config
        .as_ref()
        .ok_or_else(|| EngineError::BadRequest("time_config is required".to_string()))?;
    if request.parent_value.is_some() && request.level.parent().is_none() {
        return Err(EngineError::BadRequest(
            "parent_value given but level has no parent level to drill from".to_string(),
        ));
    }
    if request.comparison_population == ComparisonPopulation::Custom && request.comparison_filters.is_none() {
        return Err(EngineError::BadRequest(
            "comparison_population 'custom' requires comparison_filters".to_string(),
        ));
    }

    let deadline = request
        .deadline_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let check_deadline = |deadline: Option<Instant>| -> Result<(), EngineError> {
        if let Some(d) = deadline {
            if Instant::now() > d {
                return Err(EngineError::Timeout);
            }
        }
        Ok(())
    };

    let mut notes = DataNotes::default();

    // Step 2: resolve windows.
    let (time_info, data_completeness) =
        crate::time_window::resolve(time_config, today, config.completeness.ingestion_lag_months, &mut notes)?;

    // Step 3: active groups, registry + request override.
    let registry = Registry::new(config_db);
    let active_groups_for_level = |level: crate::models::event::EntityLevel| -> Result<Vec<crate::models::entity_group::EntityGroup>, EngineError> {
        let registry_groups = match level.entity_type() {
            Some(et) => registry.active_groups_for(et)?,
            None => Vec::new(),
        };
        Ok(ActiveGroupSet::merge(registry_groups, request.active_groups.clone()).groups)
    };
    let merged = active_groups_for_level(request.level)?;

    // Step 4: build predicate.
    let predicate = query_builder::build(&request.filters, request.level, merged, &mut notes)?;

    // The coarser level `parent_value` is scoped against, if a drill-down
    // was requested. Its entity expression may come from a different
    // entity_type (and therefore a different active-group set) than
    // `request.level`'s own.
    let parent_scope_expr = match (&request.parent_value, request.level.parent()) {
        (Some(_), Some(parent_level)) => {
            let parent_groups = active_groups_for_level(parent_level)?;
            Some(query_builder::build_entity_expression(parent_level, parent_groups, &mut notes))
        }
        _ => None,
    };
    let parent_scope = parent_scope_expr
        .as_ref()
        .map(|expr| (expr, request.parent_value.as_deref().unwrap()));

    // The custom comparison-population predicate, built only when requested.
    let custom_predicate: Option<Predicate> = match (request.comparison_population, &request.comparison_filters) {
        (ComparisonPopulation::Custom, Some(filters)) => {
            let groups = active_groups_for_level(request.level)?;
            Some(query_builder::build(filters, request.level, groups, &mut notes)?)
        }
        _ => None,
    };

    check_deadline(deadline)?;

    // Step 5: aggregate.
    let aggregator = Aggregator::new(ch);
    let totals = aggregator
        .entity_totals(&predicate, &time_info.analysis_start, &time_info.analysis_end, parent_scope)
        .await?;

    if totals.is_empty() {
        notes.push("no events matched filters");
        return Ok(empty_response(&request, time_info, data_completeness, notes));
    }

    check_deadline(deadline)?;

    let monthly = aggregator
        .entity_monthly(&predicate, &time_info.analysis_start, &time_info.analysis_end, parent_scope)
        .await?;

    check_deadline(deadline)?;

    // Comparison-period totals, needed only by yoy/pop.
    let needs_period_comparison = request
        .methods
        .iter()
        .any(|m| matches!(m, SignalMethod::Yoy | SignalMethod::Pop));
    let comparison_totals = if needs_period_comparison {
        match (&time_info.comparison_start, &time_info.comparison_end) {
            (Some(start), Some(end)) => Some(
                aggregator
                    .entity_totals(&predicate, start, end, parent_scope)
                    .await?,
            ),
            _ => {
                notes.push("yoy/pop requested but time_config has no comparison window; skipped");
                None
            }
        }
    } else {
        None
    };

    check_deadline(deadline)?;

    // Global contingency totals, needed only by prr/ror/ebgm.
    let needs_disproportionality = request.methods.iter().any(|m| m.is_disproportionality());
    let global_totals = if needs_disproportionality {
        Some(
            aggregator
                .global_totals(
                    &predicate,
                    &time_info.analysis_start,
                    &time_info.analysis_end,
                    request.comparison_population,
                    &request.filters.product_codes,
                    custom_predicate.as_ref(),
                )
                .await?,
        )
    } else {
        None
    };

    check_deadline(deadline)?;

    // Steps 6-7: per-entity method computation + classification.
    let mut results = Vec::new();
    for entity_totals in &totals {
        if entity_totals.total < request.min_events {
            continue;
        }

        let series = monthly.get(&entity_totals.entity).cloned().unwrap_or_default();
        let comparison_period_events = comparison_totals.as_ref().and_then(|rows| {
            rows.iter()
                .find(|r| r.entity == entity_totals.entity)
                .map(|r| r.total)
        });

        let mut method_results = Vec::new();
        for method in &request.methods {
            let override_ = request.thresholds.get(method);
            let output = match method {
                SignalMethod::Zscore => Some(zscore::compute(&series, None)),
                SignalMethod::Rolling => time_info
                    .rolling_window_months
                    .map(|w| rolling::compute(&series, w)),
                SignalMethod::Cusum => Some(cusum::compute(&series)),
                SignalMethod::Yoy | SignalMethod::Pop => comparison_period_events
                    .map(|comp| yoy_pop::compute(entity_totals.total, comp, &mut notes)),
                SignalMethod::Prr => global_totals.map(|(global_deaths, global_non_deaths)| {
                    let table = aggregator.contingency_table(
                        entity_totals.deaths,
                        entity_totals.total,
                        global_deaths,
                        global_non_deaths,
                    );
                    crate::stats::disproportionality::prr(table)
                }),
                SignalMethod::Ror => global_totals.map(|(global_deaths, global_non_deaths)| {
                    let table = aggregator.contingency_table(
                        entity_totals.deaths,
                        entity_totals.total,
                        global_deaths,
                        global_non_deaths,
                    );
                    crate::stats::disproportionality::ror(table)
                }),
                SignalMethod::Ebgm => global_totals.map(|(global_deaths, global_non_deaths)| {
                    let table = aggregator.contingency_table(
                        entity_totals.deaths,
                        entity_totals.total,
                        global_deaths,
                        global_non_deaths,
                    );
                    crate::stats::disproportionality::ebgm(table)
                }),
            };

            if let Some(output) = output {
                method_results.push(classifier::classify(*method, output, &config.thresholds, override_, request.min_events));
            }
        }

        if method_results.is_empty() {
            continue;
        }

        let signal_type = classifier::overall_strength(&method_results);
        results.push(SignalResult {
            entity: entity_totals.entity.clone(),
            entity_level: request.level,
            total_events: entity_totals.total,
            deaths: entity_totals.deaths,
            injuries: entity_totals.injuries,
            malfunctions: entity_totals.malfunctions,
            current_period_events: Some(entity_totals.total),
            comparison_period_events,
            change_pct: comparison_period_events.map(|comp| {
                if comp == 0 {
                    0.0
                } else {
                    100.0 * (entity_totals.total as f64 - comp as f64) / comp as f64
                }
            }),
            methods: method_results,
            signal_type,
            has_children: false,
        });
    }

    // Step 8: sort + truncate.
    results.sort_by(|a, b| {
        b.signal_type
            .cmp(&a.signal_type)
            .then(b.total_events.cmp(&a.total_events))
            .then(a.entity.cmp(&b.entity))
    });
    results.truncate(request.limit as usize);

    check_deadline(deadline)?;

    // Step 9: has_children existence probe, bounded to the final page.
    // Probes the *child* level's grouping, scoped to this entity as its
    // parent — not the entity's own level, which is already guaranteed
    // non-empty by the `min_events` gate above.
    if let Some(child_level) = request.level.child() {
        let child_groups = active_groups_for_level(child_level)?;
        let child_predicate = query_builder::build(&request.filters, child_level, child_groups, &mut notes)?;
        for result in &mut results {
            result.has_children = aggregator
                .has_children(
                    &predicate.entity_expression,
                    &child_predicate,
                    &time_info.analysis_start,
                    &time_info.analysis_end,
                    &result.entity,
                )
                .await?;
        }
    }

    // Step 10: counts + data_note.
    let counts = count_by_strength(&results);

    Ok(SignalResponse {
        level: request.level,
        parent_value: request.parent_value,
        methods_applied: request.methods,
        time_info,
        data_completeness,
        data_note: notes.into_joined(),
        counts,
        results,
    })
}

fn empty_response(
    request: &SignalRequest,
    time_info: TimeInfo,
    data_completeness: DataCompleteness,
    notes: DataNotes,
) -> SignalResponse {
    SignalResponse {
        level: request.level,
        parent_value: request.parent_value.clone(),
        methods_applied: request.methods.clone(),
        time_info,
        data_completeness,
        data_note: notes.into_joined(),
        counts: SignalCounts { high: 0, elevated: 0, normal: 0, total_entities_analyzed: 0 },
        results: Vec::new(),
    }
}

fn count_by_strength(results: &[SignalResult]) -> SignalCounts {
    let mut high = 0;
    let mut elevated = 0;
    let mut normal = 0;
    for r in results {
        match r.signal_type {
            SignalStrength::High => high += 1,
            SignalStrength::Elevated => elevated += 1,
            SignalStrength::Normal => normal += 1,
        }
    }
    SignalCounts {
        high,
        elevated,
        normal,
        total_entities_analyzed: results.len() as u64,
    }
}

use std::collections::BTreeMap;

use clickhouse::{Client, Row};
use serde::Deserialize;

use crate::error::EngineError;
use crate::models::filter::{Condition, EntityExpression, Predicate};
use crate::models::signal::ComparisonPopulation;
use crate::stats::disproportionality::ContingencyTable;
use crate::stats::MonthlySeries;

/// A drill-down scope: the parent level's (already group-rewritten) entity
/// expression, and the value the current query must be restricted to.
pub type ParentScope<'a> = (&'a EntityExpression, &'a str);

/// Per-entity totals over the analysis window.
#[derive(Debug, Clone)]
pub struct EntityTotals {
    pub entity: String,
    pub total: u64,
    pub deaths: u64,
    pub injuries: u64,
    pub malfunctions: u64,
}

#[derive(Debug, Row, Deserialize)]
struct TotalsRow {
    entity: String,
    total: u64,
    deaths: u64,
    injuries: u64,
    malfunctions: u64,
}

#[derive(Debug, Row, Deserialize)]
struct MonthlyRow {
    entity: String,
    month: String,
    count: u64,
}

#[derive(Debug, Row, Deserialize)]
struct CountRow {
    count: u64,
}

/// The event store side of entity aggregation. Translates the structured
/// [`Predicate`] into ClickHouse SQL — the only place that needs to know
/// the columnar dialect.
pub struct Aggregator<'a> {
    client: &'a Client,
}

impl<'a> Aggregator<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// `per_entity_totals`: for each post-rewrite entity, (total, deaths,
    /// injuries, malfunctions) over [analysis_start, analysis_end].
    pub async fn entity_totals(
        &self,
        predicate: &Predicate,
        analysis_start: &str,
        analysis_end: &str,
        parent: Option<ParentScope<'_>>,
    ) -> Result<Vec<EntityTotals>, EngineError> {
        let entity_expr = render_entity_expression(predicate);
        let from_clause = from_clause(predicate);
        let mut where_sql = render_where(predicate, analysis_start, analysis_end, parent);
        if where_sql.is_empty() {
            where_sql = "1=1".to_string();
        }

        let sql = format!(
            "SELECT {entity_expr} AS entity,
                    count() AS total,
                    countIf(event_type = 'D') AS deaths,
                    countIf(event_type = 'IN') AS injuries,
                    countIf(event_type = 'M') AS malfunctions
             FROM {from_clause}
             WHERE {where_sql}
             GROUP BY entity
             ORDER BY total DESC"
        );

        let rows: Vec<TotalsRow> = self.client.query(&sql).fetch_all().await?;
        Ok(rows
            .into_iter()
            .map(|r| EntityTotals {
                entity: r.entity,
                total: r.total,
                deaths: r.deaths,
                injuries: r.injuries,
                malfunctions: r.malfunctions,
            })
            .collect())
    }

    /// `per_entity_monthly`: contiguous `YYYY-MM -> count` map per entity
    /// over the analysis horizon, zero-filled for missing months.
    pub async fn entity_monthly(
        &self,
        predicate: &Predicate,
        analysis_start: &str,
        analysis_end: &str,
        parent: Option<ParentScope<'_>>,
    ) -> Result<BTreeMap<String, MonthlySeries>, EngineError> {
        let entity_expr = render_entity_expression(predicate);
        let from_clause = from_clause(predicate);
        let mut where_sql = render_where(predicate, analysis_start, analysis_end, parent);
        if where_sql.is_empty() {
            where_sql = "1=1".to_string();
        }

        let sql = format!(
            "SELECT {entity_expr} AS entity,
                    formatDateTime(toStartOfMonth(date_received), '%Y-%m') AS month,
                    count() AS count
             FROM {from_clause}
             WHERE {where_sql}
             GROUP BY entity, month
             ORDER BY entity, month"
        );

        let rows: Vec<MonthlyRow> = self.client.query(&sql).fetch_all().await?;

        let months = contiguous_months(analysis_start, analysis_end);
        let mut by_entity: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for row in rows {
            by_entity.entry(row.entity).or_default().insert(row.month, row.count);
        }

        let mut result = BTreeMap::new();
        for (entity, counts) in by_entity {
            let series = months
                .iter()
                .map(|m| (m.clone(), *counts.get(m).unwrap_or(&0)))
                .collect();
            result.insert(entity, series);
        }
        Ok(result)
    }

    /// `global_totals`: the `(A+B+C+D)` comparison-population contingency
    /// cell counts for disproportionality methods. `custom_predicate` must
    /// be `Some` when `comparison_population` is `Custom` — the caller is
    /// responsible for building it from `comparison_filters` and rejecting
    /// the request otherwise, since there's no sane fallback population
    /// here that wouldn't silently misrepresent the denominator.
    pub async fn global_totals(
        &self,
        predicate: &Predicate,
        analysis_start: &str,
        analysis_end: &str,
        comparison_population: ComparisonPopulation,
        entity_product_codes: &[String],
        custom_predicate: Option<&Predicate>,
    ) -> Result<(u64, u64), EngineError> {
        let scoped_predicate = match (comparison_population, custom_predicate) {
            (ComparisonPopulation::Custom, Some(custom)) => custom,
            _ => predicate,
        };
        let from_clause = from_clause(scoped_predicate);
        let mut where_sql = render_where(scoped_predicate, analysis_start, analysis_end, None);
        if where_sql.is_empty() {
            where_sql = "1=1".to_string();
        }
        if comparison_population == ComparisonPopulation::SameProductCode
            && !entity_product_codes.is_empty()
        {
            where_sql.push_str(&format!(" AND product_code IN ({})", quoted_list(entity_product_codes)));
        }

        let sql = format!(
            "SELECT countIf(event_type = 'D') AS count FROM {from_clause} WHERE {where_sql}"
        );
        let deaths: Vec<CountRow> = self.client.query(&sql).fetch_all().await?;
        let sql_non_deaths = format!(
            "SELECT countIf(event_type != 'D') AS count FROM {from_clause} WHERE {where_sql}"
        );
        let non_deaths: Vec<CountRow> = self.client.query(&sql_non_deaths).fetch_all().await?;

        Ok((
            deaths.first().map(|r| r.count).unwrap_or(0),
            non_deaths.first().map(|r| r.count).unwrap_or(0),
        ))
    }

    /// Existence probe for `has_children`: does the *child*-level
    /// aggregation, scoped to this entity as its parent, return >= 1 row?
    /// `child_predicate` must be built for `level.child()`, not `level`
    /// itself — probing the same level the entity was found at is always
    /// true and tells the caller nothing.
    /// Deliberately bounded (`LIMIT 1`) rather than a full recomputation.
    pub async fn has_children(
        &self,
        parent_entity_expression: &EntityExpression,
        child_predicate: &Predicate,
        analysis_start: &str,
        analysis_end: &str,
        entity_value: &str,
    ) -> Result<bool, EngineError> {
        let entity_expr = render_entity_expression(child_predicate);
        let from_clause = from_clause(child_predicate);
        let mut where_sql = render_where(
            child_predicate,
            analysis_start,
            analysis_end,
            Some((parent_entity_expression, entity_value)),
        );
        if where_sql.is_empty() {
            where_sql = "1=1".to_string();
        }

        let sql = format!(
            "SELECT {entity_expr} AS entity FROM {from_clause} WHERE {where_sql} LIMIT 1"
        );
        let rows: Vec<CountRow> = self
            .client
            .query(&format!("SELECT count() AS count FROM ({sql})"))
            .fetch_all()
            .await?;
        Ok(rows.first().map(|r| r.count).unwrap_or(0) > 0)
    }

    pub fn contingency_table(&self, entity_deaths: u64, entity_total: u64, global_deaths: u64, global_non_deaths: u64) -> ContingencyTable {
        let a = entity_deaths;
        let b = entity_total.saturating_sub(entity_deaths);
        let c = global_deaths.saturating_sub(entity_deaths);
        let d = global_non_deaths.saturating_sub(b);
        ContingencyTable { a, b, c, d }
    }
}

fn from_clause(predicate: &Predicate) -> String {
    if predicate.requires_device_join {
        "maude.master_events me INNER JOIN maude.devices d ON me.mdr_report_key = d.mdr_report_key".to_string()
    } else {
        "maude.master_events me".to_string()
    }
}

fn render_entity_expression(predicate: &Predicate) -> String {
    render_entity_expression_for(&predicate.entity_expression, predicate.requires_device_join)
}

fn render_entity_expression_for(expr: &EntityExpression, requires_device_join: bool) -> String {
    let raw_column = qualified_column_for(requires_device_join, expr.raw_column);
    if expr.active_groups.is_empty() {
        return raw_column;
    }

    // First group wins on overlap: nested `if`s, evaluated
    // in reverse insertion order so the first group's check ends up
    // outermost, mirrors EntityExpression::rewrite.
    let mut out = raw_column.clone();
    for group in expr.active_groups.iter().rev() {
        let in_list = quoted_list(&group.members);
        out = format!(
            "if({raw_column} IN ({in_list}), '{}', {out})",
            escape(&group.display_name)
        );
    }
    out
}

fn qualified_column_for(requires_device_join: bool, column: &str) -> String {
    let device_columns = ["brand_name", "generic_name", "model_number", "manufacturer_d_clean", "device_report_product_code", "implant_flag"];
    if requires_device_join && device_columns.contains(&column) {
        format!("d.{column}")
    } else {
        format!("me.{column}")
    }
}

fn render_where(predicate: &Predicate, analysis_start: &str, analysis_end: &str, parent: Option<ParentScope>) -> String {
    let mut clauses = Vec::new();
    clauses.push(format!(
        "me.date_received BETWEEN '{}' AND '{}'",
        escape(analysis_start),
        escape(analysis_end)
    ));

    for cond in &predicate.event_conditions {
        clauses.push(render_condition(cond, "me"));
    }
    for cond in &predicate.device_conditions {
        clauses.push(render_condition(cond, "d"));
    }

    if let Some((parent_expr, parent_value)) = parent {
        let entity_expr = render_entity_expression_for(parent_expr, predicate.requires_device_join);
        clauses.push(format!("{entity_expr} = '{}'", escape(parent_value)));
    }

    clauses.join(" AND ")
}

fn render_condition(cond: &Condition, alias: &str) -> String {
    match cond {
        Condition::InStrings { column, values } => {
            format!("{alias}.{column} IN ({})", quoted_list(values))
        }
        Condition::DateRange { column, from, to } => {
            let mut parts = Vec::new();
            if let Some(f) = from {
                parts.push(format!("{alias}.{column} >= '{}'", escape(f)));
            }
            if let Some(t) = to {
                parts.push(format!("{alias}.{column} <= '{}'", escape(t)));
            }
            if parts.is_empty() {
                "1=1".to_string()
            } else {
                parts.join(" AND ")
            }
        }
        Condition::TextSearch { column, needle } => {
            format!("{alias}.{column} ILIKE '%{}%'", escape(needle))
        }
        Condition::Eq { column, value } => format!("{alias}.{column} = '{}'", escape(value)),
        Condition::BoolEq { column, value } => format!("{alias}.{column} = {}", if *value { 1 } else { 0 }),
    }
}

fn quoted_list(values: &[String]) -> String {
    values.iter().map(|v| format!("'{}'", escape(v))).collect::<Vec<_>>().join(", ")
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Contiguous `YYYY-MM` keys from `start` to `end` inclusive, used to
/// zero-fill months with no events.
fn contiguous_months(start: &str, end: &str) -> Vec<String> {
    use chrono::{Datelike, Months, NaiveDate};

    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
            .unwrap_or_else(|_| NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
    };
    let start_date = parse(start);
    let end_date = parse(end);

    let mut months = Vec::new();
    let mut cursor = NaiveDate::from_ymd_opt(start_date.year(), start_date.month(), 1).unwrap();
    let end_month = NaiveDate::from_ymd_opt(end_date.year(), end_date.month(), 1).unwrap();
    while cursor <= end_month {
        months.push(cursor.format("%Y-%m").to_string());
        cursor = cursor.checked_add_months(Months::new(1)).unwrap();
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::EntityLevel;

    fn brand_predicate() -> Predicate {
        Predicate {
            event_conditions: vec![],
            device_conditions: vec![],
            requires_device_join: true,
            entity_expression: EntityExpression {
                level: EntityLevel::Brand,
                raw_column: "brand_name",
                active_groups: vec![],
            },
        }
    }

    fn manufacturer_expression() -> EntityExpression {
        EntityExpression {
            level: EntityLevel::Manufacturer,
            raw_column: "manufacturer_clean",
            active_groups: vec![],
        }
    }

    #[test]
    fn render_where_scopes_parent_value_against_the_parent_level_column() {
        let predicate = brand_predicate();
        let parent_expr = manufacturer_expression();
        let where_sql = render_where(
            &predicate,
            "2026-01-01",
            "2026-06-30",
            Some((&parent_expr, "Abbott-family")),
        );
        assert!(where_sql.contains("me.manufacturer_clean = 'Abbott-family'"));
        assert!(!where_sql.contains("d.brand_name = 'Abbott-family'"));
    }

    #[test]
    fn render_entity_expression_still_uses_the_predicate_level_column() {
        let predicate = brand_predicate();
        assert_eq!(render_entity_expression(&predicate), "d.brand_name");
    }

    #[test]
    fn contiguous_months_fills_gaps() {
        let months = contiguous_months("2026-01-15", "2026-04-01");
        assert_eq!(months, vec!["2026-01", "2026-02", "2026-03", "2026-04"]);
    }

    #[test]
    fn escape_handles_quotes() {
        assert_eq!(escape("O'Brien"), "O\\'Brien");
    }

    #[test]
    fn quoted_list_joins_with_comma() {
        let values = vec!["Abbott".to_string(), "Medtronic".to_string()];
        assert_eq!(quoted_list(&values), "'Abbott', 'Medtronic'");
    }
}

use serde::{Deserialize, Serialize};

use super::entity_group::EntityGroup;
use super::event::EntityLevel;

/// Filter fields recognized by the query builder.
///
/// All fields are optional; an absent field imposes no restriction. Unknown
/// JSON fields are rejected at deserialization time by the handler layer
/// rather than silently ignored, so a typo in a filter name surfaces as
/// `BadFilter` instead of a silently-empty filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub manufacturers: Vec<String>,
    pub product_codes: Vec<String>,
    pub event_types: Vec<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub free_text: Option<String>,

    // Device-level filters, enforced as existence predicates over `devices`.
    pub brand_names: Vec<String>,
    pub generic_names: Vec<String>,
    pub device_manufacturers: Vec<String>,
    pub model_numbers: Vec<String>,
    pub implant_flag: Option<bool>,
    pub device_product_codes: Vec<String>,
}

impl FilterSpec {
    /// Whether any device-level predicate is present, i.e. whether the
    /// query needs the `devices` join.
    pub fn needs_device_join(&self) -> bool {
        !self.brand_names.is_empty()
            || !self.generic_names.is_empty()
            || !self.device_manufacturers.is_empty()
            || !self.model_numbers.is_empty()
            || self.implant_flag.is_some()
            || !self.device_product_codes.is_empty()
    }
}

/// A single condition in the predicate tree the query builder returns.
/// Kept as plain data — filter predicate as data — so the store adapter is
/// the only place that knows how to render it into a dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    InStrings { column: String, values: Vec<String> },
    DateRange { column: String, from: Option<String>, to: Option<String> },
    TextSearch { column: String, needle: String },
    Eq { column: String, value: String },
    BoolEq { column: String, value: bool },
}

/// The structured predicate returned by the query builder: a flat AND of
/// conditions against `master_events`, an optional AND of conditions against
/// `devices` (requiring the join), and the resolved `entity_expression` for
/// the level being analyzed.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub event_conditions: Vec<Condition>,
    pub device_conditions: Vec<Condition>,
    pub requires_device_join: bool,
    pub entity_expression: EntityExpression,
}

/// Maps a raw entity-level column to either itself or an active group's
/// display name — group rewrite semantics.
#[derive(Debug, Clone)]
pub struct EntityExpression {
    pub level: EntityLevel,
    pub raw_column: &'static str,
    pub active_groups: Vec<EntityGroup>,
}

impl EntityExpression {
    /// Rewrite a raw entity name to its display name if it belongs to the
    /// first (insertion-order) active group that claims it.
    pub fn rewrite(&self, raw: &str) -> String {
        for group in &self.active_groups {
            if group.contains_member(raw) {
                return group.display_name.clone();
            }
        }
        raw.to_string()
    }

    /// True when two or more active groups claim the same raw name —
    /// signals the "first group wins, emit a data_note warning" case.
    pub fn has_overlap(&self) -> bool {
        for raw_candidate in self
            .active_groups
            .iter()
            .flat_map(|g| g.members.iter())
        {
            let claims = self
                .active_groups
                .iter()
                .filter(|g| g.contains_member(raw_candidate))
                .count();
            if claims > 1 {
                return true;
            }
        }
        false
    }
}

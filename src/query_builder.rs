use crate::error::EngineError;
use crate::models::entity_group::EntityGroup;
use crate::models::event::{EntityLevel, EventType};
use crate::models::filter::{Condition, EntityExpression, FilterSpec, Predicate};
use crate::models::signal::DataNotes;

/// Turns a [`FilterSpec`] + active groups into a [`Predicate`]. Isolates
/// every column/translation detail so the rest of the engine never names a
/// store column directly.
pub fn build(
    filters: &FilterSpec,
    level: EntityLevel,
    active_groups: Vec<EntityGroup>,
    notes: &mut DataNotes,
) -> Result<Predicate, EngineError> {
    let mut event_conditions = Vec::new();

    if !filters.manufacturers.is_empty() {
        event_conditions.push(Condition::InStrings {
            column: "manufacturer_clean".to_string(),
            values: filters.manufacturers.clone(),
        });
    }
    if !filters.product_codes.is_empty() {
        event_conditions.push(Condition::InStrings {
            column: "product_code".to_string(),
            values: filters.product_codes.clone(),
        });
    }
    if !filters.event_types.is_empty() {
        let mut store_codes = Vec::with_capacity(filters.event_types.len());
        for code in &filters.event_types {
            let et = EventType::from_filter_code(code).ok_or_else(|| {
                EngineError::BadFilter(format!("unknown or unselectable event_type '{code}'"))
            })?;
            store_codes.push(et.store_code().to_string());
        }
        event_conditions.push(Condition::InStrings {
            column: "event_type".to_string(),
            values: store_codes,
        });
    }
    if filters.date_from.is_some() || filters.date_to.is_some() {
        if let (Some(from), Some(to)) = (&filters.date_from, &filters.date_to) {
            if from > to {
                return Err(EngineError::BadFilter(
                    "dateFrom must not be after dateTo".to_string(),
                ));
            }
        }
        event_conditions.push(Condition::DateRange {
            column: "date_received".to_string(),
            from: filters.date_from.clone(),
            to: filters.date_to.clone(),
        });
    }
    if let Some(text) = &filters.free_text {
        if !text.trim().is_empty() {
            event_conditions.push(Condition::TextSearch {
                column: "manufacturer_name".to_string(),
                needle: text.clone(),
            });
        }
    }

    let mut device_conditions = Vec::new();
    if !filters.brand_names.is_empty() {
        device_conditions.push(Condition::InStrings {
            column: "brand_name".to_string(),
            values: filters.brand_names.clone(),
        });
    }
    if !filters.generic_names.is_empty() {
        device_conditions.push(Condition::InStrings {
            column: "generic_name".to_string(),
            values: filters.generic_names.clone(),
        });
    }
    if !filters.device_manufacturers.is_empty() {
        device_conditions.push(Condition::InStrings {
            column: "manufacturer_d_clean".to_string(),
            values: filters.device_manufacturers.clone(),
        });
    }
    if !filters.model_numbers.is_empty() {
        device_conditions.push(Condition::InStrings {
            column: "model_number".to_string(),
            values: filters.model_numbers.clone(),
        });
    }
    if !filters.device_product_codes.is_empty() {
        device_conditions.push(Condition::InStrings {
            column: "device_report_product_code".to_string(),
            values: filters.device_product_codes.clone(),
        });
    }
    if let Some(flag) = filters.implant_flag {
        device_conditions.push(Condition::BoolEq {
            column: "implant_flag".to_string(),
            value: flag,
        });
    }

    let entity_expression = build_entity_expression(level, active_groups, notes);

    Ok(Predicate {
        event_conditions,
        device_conditions,
        requires_device_join: filters.needs_device_join() || level.is_device_level(),
        entity_expression,
    })
}

/// Resolves the group-rewrite expression for a single entity level,
/// independent of the rest of a [`Predicate`]. Used directly when a caller
/// needs the entity column for a level other than the one it's filtering
/// and aggregating on — e.g. the coarser level a drill-down's `parent_value`
/// is scoped against.
pub fn build_entity_expression(
    level: EntityLevel,
    active_groups: Vec<EntityGroup>,
    notes: &mut DataNotes,
) -> EntityExpression {
    let relevant_groups: Vec<EntityGroup> = active_groups
        .into_iter()
        .filter(|g| Some(g.entity_type) == level.entity_type())
        .collect();

    let entity_expression = EntityExpression {
        level,
        raw_column: level.raw_column(),
        active_groups: relevant_groups,
    };

    if entity_expression.has_overlap() {
        notes.push("overlapping active groups detected for this entity type; first group by insertion order was applied");
    }

    entity_expression
}

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::error::EngineError;
use crate::models::entity_group::{
    AvailableEntitiesQuery, AvailableEntity, CreateEntityGroupRequest, ListEntityGroupsQuery,
    SuggestNameQuery, SuggestNameResponse, UpdateEntityGroupRequest,
};
use crate::registry::{derive_display_name, Registry};
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListEntityGroupsQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let registry = Registry::new(&state.config_db);
    let groups = registry.list(
        query.entity_type,
        query.include_built_in.unwrap_or(true),
        query.active_only.unwrap_or(false),
    )?;
    Ok(Json(json!({ "entity_groups": groups })))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let registry = Registry::new(&state.config_db);
    let group = registry
        .get(&id)?
        .ok_or_else(|| EngineError::BadRequest(format!("entity group '{id}' not found")))?;
    Ok(Json(group))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateEntityGroupRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let registry = Registry::new(&state.config_db);
    let group = registry.create(req)?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEntityGroupRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let registry = Registry::new(&state.config_db);
    let group = registry.update(&id, req)?;
    Ok(Json(group))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let registry = Registry::new(&state.config_db);
    registry.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let registry = Registry::new(&state.config_db);
    let group = registry.activate(&id)?;
    Ok(Json(group))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let registry = Registry::new(&state.config_db);
    let group = registry.deactivate(&id)?;
    Ok(Json(group))
}

/// `GET /api/entity-groups/suggest-name?members=a,b,c` — same
/// auto-derivation algorithm as create/update, without event counts (a
/// plain alphabetical/prefix suggestion; the richer count-aware variant
/// only runs once a group is actually created against real data).
pub async fn suggest_name(Query(query): Query<SuggestNameQuery>) -> impl IntoResponse {
    let members: Vec<String> = query
        .members
        .split(',')
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    let display_name = derive_display_name(&members, |_| 0);
    Json(SuggestNameResponse { display_name, member_count: members.len() })
}

/// `GET /api/entity-groups/available-entities` — raw entity names with
/// event counts and their current group assignment, for the group-editing
/// UI to pick members from.
pub async fn available_entities(
    State(state): State<AppState>,
    Query(query): Query<AvailableEntitiesQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let registry = Registry::new(&state.config_db);
    let active_groups = registry.active_groups_for(query.entity_type)?;

    let column = match query.entity_type {
        crate::models::entity_group::EntityType::Manufacturer => "manufacturer_clean",
        crate::models::entity_group::EntityType::Brand => "brand_name",
        crate::models::entity_group::EntityType::GenericName => "generic_name",
    };
    let table = match query.entity_type {
        crate::models::entity_group::EntityType::Manufacturer => "maude.master_events",
        _ => "maude.devices",
    };

    let escape = |s: &str| s.replace('\\', "\\\\").replace('\'', "\\'");

    let mut where_clauses = Vec::new();
    if let Some(search) = &query.search {
        if !search.trim().is_empty() {
            where_clauses.push(format!("{column} ILIKE '%{}%'", escape(search)));
        }
    }
    if let Some(codes) = &query.product_codes {
        let product_column = if table == "maude.devices" { "device_report_product_code" } else { "product_code" };
        let values: Vec<String> = codes.split(',').map(|c| format!("'{}'", escape(c.trim()))).collect();
        if !values.is_empty() {
            where_clauses.push(format!("{product_column} IN ({})", values.join(", ")));
        }
    }
    if table != "maude.devices" {
        if let Some(event_types) = &query.event_types {
            let store_codes: Vec<String> = event_types
                .split(',')
                .filter_map(|c| crate::models::event::EventType::from_filter_code(c.trim()))
                .map(|et| format!("'{}'", et.store_code()))
                .collect();
            if !store_codes.is_empty() {
                where_clauses.push(format!("event_type IN ({})", store_codes.join(", ")));
            }
        }
    }
    let where_sql = if where_clauses.is_empty() { "1=1".to_string() } else { where_clauses.join(" AND ") };

    let sql = format!(
        "SELECT {column} AS raw_name, count() AS event_count FROM {table} WHERE {where_sql} GROUP BY raw_name ORDER BY event_count DESC LIMIT {}",
        query.limit
    );

    #[derive(Debug, clickhouse::Row, serde::Deserialize)]
    struct Row {
        raw_name: String,
        event_count: u64,
    }
    let rows: Vec<Row> = state.ch.query(&sql).fetch_all().await?;

    let entities: Vec<AvailableEntity> = rows
        .into_iter()
        .map(|r| {
            let current = active_groups.iter().find(|g| g.contains_member(&r.raw_name));
            AvailableEntity {
                raw_name: r.raw_name,
                event_count: r.event_count,
                current_group_id: current.map(|g| g.id.clone()),
                current_group_display_name: current.map(|g| g.display_name.clone()),
            }
        })
        .collect();

    Ok(Json(json!({ "entities": entities })))
}

use std::collections::HashSet;

use uuid::Uuid;

use crate::config_db::ConfigDb;
use crate::error::EngineError;
use crate::models::entity_group::{
    CreateEntityGroupRequest, EntityGroup, EntityType, UpdateEntityGroupRequest,
};

/// Domain logic for the Entity Group Registry, layered over the raw SQLite
/// CRUD in [`ConfigDb`]. This is where the invariants live: member
/// normalization, at-most-one-active-group-per-entity_type,
/// built-in immutability, and display-name auto-derivation.
pub struct Registry<'a> {
    db: &'a ConfigDb,
}

impl<'a> Registry<'a> {
    pub fn new(db: &'a ConfigDb) -> Self {
        Self { db }
    }

    pub fn list(
        &self,
        entity_type: Option<EntityType>,
        include_built_in: bool,
        active_only: bool,
    ) -> Result<Vec<EntityGroup>, EngineError> {
        Ok(self.db.list_entity_groups(entity_type, include_built_in, active_only)?)
    }

    pub fn get(&self, id: &str) -> Result<Option<EntityGroup>, EngineError> {
        Ok(self.db.get_entity_group(id)?)
    }

    /// Active groups for a given entity_type — what the orchestrator
    /// pulls before merging in any request-supplied overrides.
    pub fn active_groups_for(&self, entity_type: EntityType) -> Result<Vec<EntityGroup>, EngineError> {
        self.list(Some(entity_type), true, true)
    }

    pub fn create(&self, req: CreateEntityGroupRequest) -> Result<EntityGroup, EngineError> {
        let members = normalize_members(&req.members)?;

        if req.is_active {
            self.assert_no_active_conflict(req.entity_type, &members, None)?;
        }

        let display_name = req
            .display_name
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| derive_display_name(&members, |_| 0));

        let id = Uuid::new_v4().to_string();
        let group = EntityGroup {
            id: id.clone(),
            name: req.name,
            description: req.description,
            entity_type: req.entity_type,
            members,
            display_name,
            is_active: req.is_active,
            is_built_in: false,
            created_at: String::new(),
            updated_at: String::new(),
        };

        self.db.insert_entity_group(&group)?;
        self.get(&id)?
            .ok_or_else(|| EngineError::BadRequest("failed to read back created entity group".to_string()))
    }

    pub fn update(&self, id: &str, req: UpdateEntityGroupRequest) -> Result<EntityGroup, EngineError> {
        let existing = self
            .get(id)?
            .ok_or_else(|| EngineError::BadRequest(format!("entity group '{id}' not found")))?;

        if existing.is_built_in {
            return Err(EngineError::GroupConflict(
                "built-in groups cannot be updated".to_string(),
            ));
        }

        let members = normalize_members(&req.members)?;
        if existing.is_active {
            self.assert_no_active_conflict(existing.entity_type, &members, Some(id))?;
        }

        let display_name = req
            .display_name
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| derive_display_name(&members, |_| 0));

        let updated = self
            .db
            .update_entity_group(id, &req.name, req.description.as_deref(), &members, &display_name)?;
        if !updated {
            return Err(EngineError::BadRequest(format!("entity group '{id}' not found")));
        }

        self.get(id)?
            .ok_or_else(|| EngineError::BadRequest(format!("entity group '{id}' not found")))
    }

    pub fn delete(&self, id: &str) -> Result<(), EngineError> {
        let existing = self
            .get(id)?
            .ok_or_else(|| EngineError::BadRequest(format!("entity group '{id}' not found")))?;
        if existing.is_built_in {
            return Err(EngineError::GroupConflict(
                "built-in groups cannot be deleted".to_string(),
            ));
        }
        self.db.delete_entity_group(id)?;
        Ok(())
    }

    pub fn activate(&self, id: &str) -> Result<EntityGroup, EngineError> {
        let existing = self
            .get(id)?
            .ok_or_else(|| EngineError::BadRequest(format!("entity group '{id}' not found")))?;
        self.assert_no_active_conflict(existing.entity_type, &existing.members, Some(id))?;
        self.db.set_entity_group_active(id, true)?;
        self.get(id)?
            .ok_or_else(|| EngineError::BadRequest(format!("entity group '{id}' not found")))
    }

    pub fn deactivate(&self, id: &str) -> Result<EntityGroup, EngineError> {
        let existing = self
            .get(id)?
            .ok_or_else(|| EngineError::BadRequest(format!("entity group '{id}' not found")))?;
        if existing.is_built_in {
            return Err(EngineError::GroupConflict(
                "built-in groups cannot be deactivated".to_string(),
            ));
        }
        self.db.set_entity_group_active(id, false)?;
        self.get(id)?
            .ok_or_else(|| EngineError::BadRequest(format!("entity group '{id}' not found")))
    }

    /// An entity may belong to at most one active group per entity_type.
    /// `exclude_id` lets update/activate check against the group's own
    /// prior state without conflicting with itself.
    fn assert_no_active_conflict(
        &self,
        entity_type: EntityType,
        members: &[String],
        exclude_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let active = self.db.list_entity_groups(Some(entity_type), true, true)?;
        for other in active {
            if exclude_id == Some(other.id.as_str()) {
                continue;
            }
            for m in members {
                if other.contains_member(m) {
                    return Err(EngineError::GroupConflict(format!(
                        "'{m}' already belongs to active group '{}'",
                        other.display_name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Trim, dedupe case-insensitively (first occurrence wins, case preserved),
/// reject empty sets.
fn normalize_members(raw: &[String]) -> Result<Vec<String>, EngineError> {
    let mut seen = HashSet::new();
    let mut members = Vec::new();
    for m in raw {
        let trimmed = m.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            members.push(trimmed.to_string());
        }
    }
    if members.is_empty() {
        return Err(EngineError::BadRequest(
            "members must be a non-empty set of strings".to_string(),
        ));
    }
    Ok(members)
}

/// Display-name auto-derivation: longest common token prefix across
/// members, else the member with the highest event count,
/// else the first member alphabetically. `event_count` is injected so the
/// same algorithm backs both `create`/`update` (no counts available) and
/// `suggest-name` (counts from the available-entities query).
pub fn derive_display_name(members: &[String], event_count: impl Fn(&str) -> u64) -> String {
    if let Some(prefix) = longest_common_token_prefix(members) {
        return prefix;
    }
    if let Some(best) = members.iter().max_by_key(|m| event_count(m)) {
        if event_count(best) > 0 {
            return best.clone();
        }
    }
    let mut sorted = members.to_vec();
    sorted.sort();
    sorted.into_iter().next().unwrap_or_default()
}

fn longest_common_token_prefix(members: &[String]) -> Option<String> {
    if members.len() < 2 {
        return None;
    }
    let tokenized: Vec<Vec<&str>> = members.iter().map(|m| m.split_whitespace().collect()).collect();
    let min_len = tokenized.iter().map(|t| t.len()).min().unwrap_or(0);
    let mut common = Vec::new();
    for i in 0..min_len {
        let token = tokenized[0][i];
        if tokenized.iter().all(|t| t[i] == token) {
            common.push(token);
        } else {
            break;
        }
    }
    if common.is_empty() {
        None
    } else {
        Some(common.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> ConfigDb {
        ConfigDb::open(":memory:").unwrap()
    }

    #[test]
    fn create_rejects_empty_members() {
        let db = db();
        let registry = Registry::new(&db);
        let req = CreateEntityGroupRequest {
            name: "g".to_string(),
            description: None,
            entity_type: EntityType::Manufacturer,
            members: vec!["  ".to_string()],
            display_name: None,
            is_active: true,
        };
        assert!(registry.create(req).is_err());
    }

    #[test]
    fn create_dedupes_members_case_insensitively() {
        let db = db();
        let registry = Registry::new(&db);
        let req = CreateEntityGroupRequest {
            name: "g".to_string(),
            description: None,
            entity_type: EntityType::Manufacturer,
            members: vec!["Abbott".to_string(), "ABBOTT".to_string(), " Abbott ".to_string()],
            display_name: None,
            is_active: true,
        };
        let group = registry.create(req).unwrap();
        assert_eq!(group.members, vec!["Abbott"]);
    }

    #[test]
    fn activating_overlapping_group_fails_with_conflict() {
        let db = db();
        let registry = Registry::new(&db);
        registry
            .create(CreateEntityGroupRequest {
                name: "g1".to_string(),
                description: None,
                entity_type: EntityType::Manufacturer,
                members: vec!["Abbott".to_string()],
                display_name: None,
                is_active: true,
            })
            .unwrap();

        let result = registry.create(CreateEntityGroupRequest {
            name: "g2".to_string(),
            description: None,
            entity_type: EntityType::Manufacturer,
            members: vec!["Abbott".to_string()],
            display_name: None,
            is_active: true,
        });
        assert!(matches!(result, Err(EngineError::GroupConflict(_))));
    }

    #[test]
    fn built_in_group_update_is_rejected() {
        let db = db();
        let mut builtin = EntityGroup {
            id: "b1".to_string(),
            name: "Built In".to_string(),
            description: None,
            entity_type: EntityType::Manufacturer,
            members: vec!["X".to_string()],
            display_name: "X".to_string(),
            is_active: true,
            is_built_in: true,
            created_at: String::new(),
            updated_at: String::new(),
        };
        builtin.is_built_in = true;
        db.insert_entity_group(&builtin).unwrap();

        let registry = Registry::new(&db);
        let result = registry.update(
            "b1",
            UpdateEntityGroupRequest {
                name: "renamed".to_string(),
                description: None,
                members: vec!["Y".to_string()],
                display_name: None,
            },
        );
        assert!(matches!(result, Err(EngineError::GroupConflict(_))));
    }

    #[test]
    fn display_name_derives_longest_common_token_prefix() {
        let members = vec!["Abbott Labs".to_string(), "Abbott Vascular".to_string()];
        assert_eq!(derive_display_name(&members, |_| 0), "Abbott");
    }

    #[test]
    fn display_name_falls_back_to_highest_event_count() {
        let members = vec!["Abbott".to_string(), "St Jude Medical".to_string()];
        let counts = |m: &str| if m == "St Jude Medical" { 100 } else { 10 };
        assert_eq!(derive_display_name(&members, counts), "St Jude Medical");
    }

    #[test]
    fn display_name_falls_back_to_alphabetical_first() {
        let members = vec!["Zeta Corp".to_string(), "Acme Inc".to_string()];
        assert_eq!(derive_display_name(&members, |_| 0), "Acme Inc");
    }
}

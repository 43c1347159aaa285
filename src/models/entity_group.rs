use serde::{Deserialize, Serialize};

/// The raw-name dimension an [`EntityGroup`] collapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Manufacturer,
    Brand,
    GenericName,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Manufacturer => "manufacturer",
            EntityType::Brand => "brand",
            EntityType::GenericName => "generic_name",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "manufacturer" => Some(EntityType::Manufacturer),
            "brand" => Some(EntityType::Brand),
            "generic_name" => Some(EntityType::GenericName),
            _ => None,
        }
    }
}

/// A user-defined (or built-in) alias group that collapses several raw
/// entity names into one logical, drillable entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityGroup {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub entity_type: EntityType,
    pub members: Vec<String>,
    pub display_name: String,
    pub is_active: bool,
    pub is_built_in: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityGroup {
    /// Case-insensitive membership test against the (case-preserved) member set.
    pub fn contains_member(&self, raw: &str) -> bool {
        self.members.iter().any(|m| m.eq_ignore_ascii_case(raw))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEntityGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub entity_type: EntityType,
    pub members: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntityGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub members: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ListEntityGroupsQuery {
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub include_built_in: Option<bool>,
    #[serde(default)]
    pub active_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestNameQuery {
    /// Comma-separated member list, e.g. `?members=Abbott,St Jude Medical`.
    pub members: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestNameResponse {
    pub display_name: String,
    pub member_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct AvailableEntitiesQuery {
    pub entity_type: EntityType,
    #[serde(default)]
    pub product_codes: Option<String>,
    #[serde(default)]
    pub event_types: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_available_limit")]
    pub limit: u64,
}

fn default_available_limit() -> u64 {
    50
}

#[derive(Debug, Serialize)]
pub struct AvailableEntity {
    pub raw_name: String,
    pub event_count: u64,
    /// Id of the active group this raw name currently belongs to, if any.
    pub current_group_id: Option<String>,
    pub current_group_display_name: Option<String>,
}

/// Resolution of `(active_groups from registry) + (active_groups override
/// from request)` for a single entity_type — request wins on conflict.
#[derive(Debug, Clone, Default)]
pub struct ActiveGroupSet {
    pub groups: Vec<EntityGroup>,
}

impl ActiveGroupSet {
    /// Merge request-supplied groups on top of registry-supplied ones.
    /// A request group whose `id` matches a registry group replaces it;
    /// otherwise it's appended. Order is preserved (insertion order decides
    /// the overlap-resolution tiebreak in the query builder).
    pub fn merge(registry_groups: Vec<EntityGroup>, request_groups: Vec<EntityGroup>) -> Self {
        let mut groups = registry_groups;
        for rg in request_groups {
            if let Some(slot) = groups.iter_mut().find(|g| g.id == rg.id) {
                *slot = rg;
            } else {
                groups.push(rg);
            }
        }
        Self { groups }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, members: &[&str]) -> EntityGroup {
        EntityGroup {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            entity_type: EntityType::Manufacturer,
            members: members.iter().map(|s| s.to_string()).collect(),
            display_name: id.to_string(),
            is_active: true,
            is_built_in: false,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn contains_member_is_case_insensitive() {
        let g = group("g1", &["Abbott", "St Jude Medical"]);
        assert!(g.contains_member("abbott"));
        assert!(g.contains_member("ST JUDE MEDICAL"));
        assert!(!g.contains_member("Medtronic"));
    }

    #[test]
    fn request_group_overrides_registry_group_with_same_id() {
        let registry = vec![group("g1", &["Abbott"])];
        let request = vec![group("g1", &["Abbott", "St Jude Medical"])];
        let merged = ActiveGroupSet::merge(registry, request);
        assert_eq!(merged.groups.len(), 1);
        assert_eq!(merged.groups[0].members.len(), 2);
    }

    #[test]
    fn request_group_with_new_id_is_appended() {
        let registry = vec![group("g1", &["Abbott"])];
        let request = vec![group("g2", &["Medtronic"])];
        let merged = ActiveGroupSet::merge(registry, request);
        assert_eq!(merged.groups.len(), 2);
    }
}

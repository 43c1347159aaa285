use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// Canonical event-type codes as stored in the event store.
///
/// External filters use the FDA-facing `D/I/M/O/*` alphabet; the store uses
/// `D/IN/M/O/*`. [`EventType::from_store_code`] and [`EventType::store_code`]
/// are the only places that translation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Death,
    Injury,
    Malfunction,
    Other,
    Unknown,
}

impl EventType {
    pub fn store_code(self) -> &'static str {
        match self {
            EventType::Death => "D",
            EventType::Injury => "IN",
            EventType::Malfunction => "M",
            EventType::Other => "O",
            EventType::Unknown => "*",
        }
    }

    pub fn filter_code(self) -> &'static str {
        match self {
            EventType::Death => "D",
            EventType::Injury => "I",
            EventType::Malfunction => "M",
            EventType::Other => "O",
            EventType::Unknown => "*",
        }
    }

    /// Parse an external filter-facing code (`D/I/M/O`). `*` is reserved and
    /// is rejected rather than accepted as a selectable filter value.
    pub fn from_filter_code(code: &str) -> Option<Self> {
        match code {
            "D" => Some(EventType::Death),
            "I" => Some(EventType::Injury),
            "M" => Some(EventType::Malfunction),
            "O" => Some(EventType::Other),
            _ => None,
        }
    }

    pub fn from_store_code(code: &str) -> Self {
        match code {
            "D" => EventType::Death,
            "IN" => EventType::Injury,
            "M" => EventType::Malfunction,
            "O" => EventType::Other,
            _ => EventType::Unknown,
        }
    }
}

/// `master_events` row as produced by the ingestion pipeline (an external
/// collaborator). Immutable after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct MasterEvent {
    pub mdr_report_key: String,
    pub date_received: String,
    pub date_of_event: Option<String>,
    pub event_type: String,
    pub manufacturer_clean: String,
    pub manufacturer_name: String,
    pub product_code: String,
    pub received_year: u16,
    pub received_month: u8,
}

/// `devices` row, joined to `master_events` by `mdr_report_key` (one-to-many).
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct DeviceRow {
    pub mdr_report_key: String,
    pub brand_name: String,
    pub generic_name: String,
    pub model_number: String,
    pub manufacturer_d_clean: String,
    pub device_report_product_code: String,
    pub implant_flag: bool,
}

/// Entity level at which a signal is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityLevel {
    Manufacturer,
    Brand,
    Generic,
    Model,
}

impl EntityLevel {
    /// The next finer drill level, or `None` at the leaf (`model`).
    pub fn child(self) -> Option<EntityLevel> {
        match self {
            EntityLevel::Manufacturer => Some(EntityLevel::Brand),
            EntityLevel::Brand => Some(EntityLevel::Generic),
            EntityLevel::Generic => Some(EntityLevel::Model),
            EntityLevel::Model => None,
        }
    }

    /// The next coarser level, or `None` at the root (`manufacturer`).
    pub fn parent(self) -> Option<EntityLevel> {
        match self {
            EntityLevel::Manufacturer => None,
            EntityLevel::Brand => Some(EntityLevel::Manufacturer),
            EntityLevel::Generic => Some(EntityLevel::Brand),
            EntityLevel::Model => Some(EntityLevel::Generic),
        }
    }

    /// The raw store column backing this level (pre-group-rewrite).
    pub fn raw_column(self) -> &'static str {
        match self {
            EntityLevel::Manufacturer => "manufacturer_clean",
            EntityLevel::Brand => "brand_name",
            EntityLevel::Generic => "generic_name",
            EntityLevel::Model => "model_number",
        }
    }

    /// Whether this level's raw column lives on `devices` rather than
    /// `master_events`, i.e. whether aggregating at this level requires the
    /// device join.
    pub fn is_device_level(self) -> bool {
        !matches!(self, EntityLevel::Manufacturer)
    }

    pub fn entity_type(self) -> Option<crate::models::entity_group::EntityType> {
        match self {
            EntityLevel::Manufacturer => Some(crate::models::entity_group::EntityType::Manufacturer),
            EntityLevel::Brand => Some(crate::models::entity_group::EntityType::Brand),
            EntityLevel::Generic => Some(crate::models::entity_group::EntityType::GenericName),
            EntityLevel::Model => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_store_code() {
        for et in [
            EventType::Death,
            EventType::Injury,
            EventType::Malfunction,
            EventType::Other,
        ] {
            assert_eq!(EventType::from_store_code(et.store_code()), et);
        }
    }

    #[test]
    fn injury_filter_code_maps_to_in_store_code() {
        let et = EventType::from_filter_code("I").unwrap();
        assert_eq!(et.store_code(), "IN");
    }

    #[test]
    fn unknown_filter_code_is_reserved_not_selectable() {
        assert!(EventType::from_filter_code("*").is_none());
        assert!(EventType::from_filter_code("X").is_none());
    }

    #[test]
    fn entity_level_drill_chain_ends_at_model() {
        assert_eq!(EntityLevel::Manufacturer.child(), Some(EntityLevel::Brand));
        assert_eq!(EntityLevel::Brand.child(), Some(EntityLevel::Generic));
        assert_eq!(EntityLevel::Generic.child(), Some(EntityLevel::Model));
        assert_eq!(EntityLevel::Model.child(), None);
    }

    #[test]
    fn entity_level_parent_chain_ends_at_manufacturer() {
        assert_eq!(EntityLevel::Model.parent(), Some(EntityLevel::Generic));
        assert_eq!(EntityLevel::Generic.parent(), Some(EntityLevel::Brand));
        assert_eq!(EntityLevel::Brand.parent(), Some(EntityLevel::Manufacturer));
        assert_eq!(EntityLevel::Manufacturer.parent(), None);
    }
}

use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

use crate::models::entity_group::{EntityGroup, EntityType};

/// Persistence for the Entity Group Registry. Config-plane state, kept in
/// SQLite rather than the columnar event store — mirrors how dashboards,
/// alert rules, and SLOs are stored separately from `wide_events`.
pub struct ConfigDb {
    conn: Mutex<Connection>,
}

impl ConfigDb {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entity_groups (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                description  TEXT,
                entity_type  TEXT NOT NULL CHECK(entity_type IN ('manufacturer','brand','generic_name')),
                members      TEXT NOT NULL,
                display_name TEXT NOT NULL,
                is_active    INTEGER NOT NULL DEFAULT 1,
                is_built_in  INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_entity_groups_type_active
                ON entity_groups(entity_type, is_active);
            ",
        )?;
        Ok(())
    }

    fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<EntityGroup> {
        let entity_type_str: String = row.get(3)?;
        let members_json: String = row.get(4)?;
        let entity_type = EntityType::from_str_opt(&entity_type_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown entity_type '{entity_type_str}'").into(),
            )
        })?;
        let members: Vec<String> = serde_json::from_str(&members_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(EntityGroup {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            entity_type,
            members,
            display_name: row.get(5)?,
            is_active: row.get::<_, i64>(6)? != 0,
            is_built_in: row.get::<_, i64>(7)? != 0,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    const SELECT_COLUMNS: &'static str =
        "id, name, description, entity_type, members, display_name, is_active, is_built_in, created_at, updated_at";

    pub fn list_entity_groups(
        &self,
        entity_type: Option<EntityType>,
        include_built_in: bool,
        active_only: bool,
    ) -> anyhow::Result<Vec<EntityGroup>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!("SELECT {} FROM entity_groups WHERE 1=1", Self::SELECT_COLUMNS);
        if entity_type.is_some() {
            sql.push_str(" AND entity_type = ?1");
        }
        if !include_built_in {
            sql.push_str(" AND is_built_in = 0");
        }
        if active_only {
            sql.push_str(" AND is_active = 1");
        }
        sql.push_str(" ORDER BY created_at ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = if let Some(et) = entity_type {
            stmt.query_map(params![et.as_str()], Self::row_to_group)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], Self::row_to_group)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    pub fn get_entity_group(&self, id: &str) -> anyhow::Result<Option<EntityGroup>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM entity_groups WHERE id = ?1", Self::SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        Ok(stmt.query_row(params![id], Self::row_to_group).optional()?)
    }

    pub fn insert_entity_group(&self, group: &EntityGroup) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let members_json = serde_json::to_string(&group.members)?;
        conn.execute(
            "INSERT INTO entity_groups
                (id, name, description, entity_type, members, display_name, is_active, is_built_in)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                group.id,
                group.name,
                group.description,
                group.entity_type.as_str(),
                members_json,
                group.display_name,
                group.is_active as i64,
                group.is_built_in as i64,
            ],
        )?;
        Ok(())
    }

    pub fn update_entity_group(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
        members: &[String],
        display_name: &str,
    ) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let members_json = serde_json::to_string(members)?;
        let count = conn.execute(
            "UPDATE entity_groups
             SET name = ?2, description = ?3, members = ?4, display_name = ?5,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?1 AND is_built_in = 0",
            params![id, name, description, members_json, display_name],
        )?;
        Ok(count > 0)
    }

    pub fn set_entity_group_active(&self, id: &str, active: bool) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE entity_groups SET is_active = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?1",
            params![id, active as i64],
        )?;
        Ok(count > 0)
    }

    pub fn delete_entity_group(&self, id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM entity_groups WHERE id = ?1 AND is_built_in = 0",
            params![id],
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_group(id: &str, entity_type: EntityType, members: &[&str]) -> EntityGroup {
        EntityGroup {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            entity_type,
            members: members.iter().map(|s| s.to_string()).collect(),
            display_name: id.to_string(),
            is_active: true,
            is_built_in: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let db = ConfigDb::open(":memory:").unwrap();
        let g = test_group("g1", EntityType::Manufacturer, &["Abbott", "St Jude Medical"]);
        db.insert_entity_group(&g).unwrap();

        let fetched = db.get_entity_group("g1").unwrap().unwrap();
        assert_eq!(fetched.members, vec!["Abbott", "St Jude Medical"]);
        assert_eq!(fetched.entity_type, EntityType::Manufacturer);
    }

    #[test]
    fn built_in_group_cannot_be_updated_or_deleted() {
        let db = ConfigDb::open(":memory:").unwrap();
        let mut g = test_group("builtin1", EntityType::Brand, &["X"]);
        g.is_built_in = true;
        db.insert_entity_group(&g).unwrap();

        let updated = db
            .update_entity_group("builtin1", "new name", None, &["Y".to_string()], "Y")
            .unwrap();
        assert!(!updated);

        let deleted = db.delete_entity_group("builtin1").unwrap();
        assert!(!deleted);
    }

    #[test]
    fn list_filters_by_entity_type_and_active() {
        let db = ConfigDb::open(":memory:").unwrap();
        db.insert_entity_group(&test_group("g1", EntityType::Manufacturer, &["A"]))
            .unwrap();
        db.insert_entity_group(&test_group("g2", EntityType::Brand, &["B"]))
            .unwrap();

        let manufacturers = db
            .list_entity_groups(Some(EntityType::Manufacturer), true, false)
            .unwrap();
        assert_eq!(manufacturers.len(), 1);
        assert_eq!(manufacturers[0].id, "g1");
    }

    #[test]
    fn deactivate_then_reactivate() {
        let db = ConfigDb::open(":memory:").unwrap();
        db.insert_entity_group(&test_group("g1", EntityType::Manufacturer, &["A"]))
            .unwrap();

        assert!(db.set_entity_group_active("g1", false).unwrap());
        let g = db.get_entity_group("g1").unwrap().unwrap();
        assert!(!g.is_active);

        assert!(db.set_entity_group_active("g1", true).unwrap());
        let g = db.get_entity_group("g1").unwrap().unwrap();
        assert!(g.is_active);
    }
}

use crate::deduplication::NaturalKey;
use crate::entities::{Contract, Record, RegistryKind};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Event for the audit trail: every create, update, delete and login
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Open (or create) the registry database and make sure every table exists.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Registry tables: one per kind, record body stored as JSON.
    // natural_key is indexed but NOT unique: uniqueness is a registry rule,
    // checked before every write, so older duplicate rows can still be loaded
    // and reported.
    // ==========================================================================
    for kind in RegistryKind::ALL {
        let table = kind.table_name();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    natural_key TEXT NOT NULL,
                    data TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )"
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_natural_key ON {table}(natural_key)"
            ),
            [],
        )?;
    }

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// RECORDS
// ============================================================================

fn timestamps<T: Record>(record: &T) -> (String, String) {
    let meta = record.meta();
    let now = Utc::now();
    (
        meta.created_at.unwrap_or(now).to_rfc3339(),
        meta.updated_at.unwrap_or(now).to_rfc3339(),
    )
}

/// Insert a record. The caller assigns identity (`RecordMeta::init`) first.
pub fn insert_record<T: Record>(conn: &Connection, record: &T) -> Result<()> {
    let data = serde_json::to_string(record)
        .with_context(|| format!("Failed to serialize {}", T::KIND))?;
    let (created_at, updated_at) = timestamps(record);

    conn.execute(
        &format!(
            "INSERT INTO {} (id, natural_key, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            T::KIND.table_name()
        ),
        params![
            record.id(),
            record.natural_key().storage_key(),
            data,
            created_at,
            updated_at
        ],
    )
    .with_context(|| format!("Failed to insert {} {}", T::KIND, record.id()))?;

    Ok(())
}

/// Replace a stored record. Returns false when no row has that id.
pub fn update_record<T: Record>(conn: &Connection, record: &T) -> Result<bool> {
    let data = serde_json::to_string(record)
        .with_context(|| format!("Failed to serialize {}", T::KIND))?;
    let (_, updated_at) = timestamps(record);

    let changed = conn.execute(
        &format!(
            "UPDATE {} SET natural_key = ?2, data = ?3, updated_at = ?4 WHERE id = ?1",
            T::KIND.table_name()
        ),
        params![
            record.id(),
            record.natural_key().storage_key(),
            data,
            updated_at
        ],
    )?;

    Ok(changed > 0)
}

/// Delete by id. Returns false when no row has that id.
pub fn delete_record(conn: &Connection, kind: RegistryKind, id: &str) -> Result<bool> {
    let changed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", kind.table_name()),
        params![id],
    )?;
    Ok(changed > 0)
}

fn decode<T: Record>(data: &str) -> Result<T> {
    serde_json::from_str(data).with_context(|| format!("Corrupt {} row", T::KIND))
}

pub fn get_record<T: Record>(conn: &Connection, id: &str) -> Result<Option<T>> {
    let data: Option<String> = conn
        .query_row(
            &format!("SELECT data FROM {} WHERE id = ?1", T::KIND.table_name()),
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    data.as_deref().map(decode).transpose()
}

/// Every record of a kind, in insertion order.
pub fn list_records<T: Record>(conn: &Connection) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT data FROM {} ORDER BY created_at, rowid",
        T::KIND.table_name()
    ))?;

    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.iter().map(|data| decode(data)).collect()
}

/// Records holding a natural key, optionally ignoring one id (edit mode).
pub fn find_by_natural_key<T: Record>(
    conn: &Connection,
    key: &NaturalKey,
    exclude_id: Option<&str>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT data FROM {} WHERE natural_key = ?1 AND id != ?2 ORDER BY created_at, rowid",
        T::KIND.table_name()
    ))?;

    let rows = stmt
        .query_map(
            params![key.storage_key(), exclude_id.unwrap_or("")],
            |row| row.get::<_, String>(0),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    rows.iter().map(|data| decode(data)).collect()
}

pub fn count_records(conn: &Connection, kind: RegistryKind) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", kind.table_name()),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Record count per registry kind (dashboard totals).
pub fn registry_counts(conn: &Connection) -> Result<BTreeMap<String, i64>> {
    let mut counts = BTreeMap::new();
    for kind in RegistryKind::ALL {
        counts.insert(kind.as_str().to_string(), count_records(conn, kind)?);
    }
    Ok(counts)
}

/// Next contract display sequence, zero-padded ("00001").
pub fn next_contract_sequence(conn: &Connection) -> Result<String> {
    let highest = list_records::<Contract>(conn)?
        .iter()
        .filter_map(|c| c.sequence.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    Ok(format!("{:05}", highest + 1))
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BiddingModality, Entity, Municipality};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn stored_entity(conn: &Connection, cnpj: &str) -> Entity {
        let mut e = Entity::sample(cnpj);
        e.meta.init();
        insert_record(conn, &e).unwrap();
        e
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_db();
        setup_database(&conn).unwrap();
        assert_eq!(count_records(&conn, RegistryKind::Entity).unwrap(), 0);
    }

    #[test]
    fn test_insert_get_update_delete() {
        let conn = test_db();
        let mut e = stored_entity(&conn, "11.222.333/0001-81");

        let loaded: Entity = get_record(&conn, e.id()).unwrap().unwrap();
        assert_eq!(loaded, e);

        e.corporate_name = "Prefeitura Municipal de Campinas".to_string();
        e.meta.touch();
        assert!(update_record(&conn, &e).unwrap());
        let loaded: Entity = get_record(&conn, e.id()).unwrap().unwrap();
        assert_eq!(loaded.corporate_name, "Prefeitura Municipal de Campinas");

        assert!(delete_record(&conn, RegistryKind::Entity, e.id()).unwrap());
        assert!(!delete_record(&conn, RegistryKind::Entity, e.id()).unwrap());
        assert!(get_record::<Entity>(&conn, e.id()).unwrap().is_none());
    }

    #[test]
    fn test_update_missing_row() {
        let conn = test_db();
        let mut e = Entity::sample("11.222.333/0001-81");
        e.meta.init();
        assert!(!update_record(&conn, &e).unwrap());
    }

    #[test]
    fn test_find_by_natural_key_uses_normalized_key() {
        let conn = test_db();
        let first = stored_entity(&conn, "11.222.333/0001-81");
        stored_entity(&conn, "11.444.777/0001-61");

        let key = NaturalKey::cnpj("11222333000181");
        let found: Vec<Entity> = find_by_natural_key(&conn, &key, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), first.id());

        let excluded: Vec<Entity> = find_by_natural_key(&conn, &key, Some(first.id())).unwrap();
        assert!(excluded.is_empty());
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let conn = test_db();
        for name in ["Pregão", "Concorrência", "Tomada de Preços"] {
            let mut m = BiddingModality::new(name, "");
            m.meta.init();
            insert_record(&conn, &m).unwrap();
        }
        let all: Vec<BiddingModality> = list_records(&conn).unwrap();
        let names: Vec<&str> = all.iter().map(|m| m.description.as_str()).collect();
        assert_eq!(names, vec!["Pregão", "Concorrência", "Tomada de Preços"]);
    }

    #[test]
    fn test_registry_counts_cover_every_kind() {
        let conn = test_db();
        stored_entity(&conn, "11.222.333/0001-81");
        let mut m = Municipality::new("Campinas", "3509502", 1_139_047, 90.0);
        m.meta.init();
        insert_record(&conn, &m).unwrap();

        let counts = registry_counts(&conn).unwrap();
        assert_eq!(counts.len(), RegistryKind::ALL.len());
        assert_eq!(counts[RegistryKind::Entity.as_str()], 1);
        assert_eq!(counts[RegistryKind::Municipality.as_str()], 1);
        assert_eq!(counts[RegistryKind::Contract.as_str()], 0);
    }

    #[test]
    fn test_next_contract_sequence() {
        let conn = test_db();
        assert_eq!(next_contract_sequence(&conn).unwrap(), "00001");

        let mut c = Contract::sample("001", "2024");
        c.sequence = "00007".to_string();
        c.meta.init();
        insert_record(&conn, &c).unwrap();
        assert_eq!(next_contract_sequence(&conn).unwrap(), "00008");
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "created",
            "entities",
            "test_id_123",
            serde_json::json!({"cnpj": "11222333000181"}),
            "11144477735",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "entities", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "created");
        assert_eq!(events[0].actor, "11144477735");
        assert_eq!(events[0].data["cnpj"], "11222333000181");
    }
}

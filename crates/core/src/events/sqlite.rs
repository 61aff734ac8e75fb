use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{ConversionEvent, EventError, EventFilter, EventRecord, EventStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS conversion_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        request_id TEXT,
        caller TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conversion_events_timestamp ON conversion_events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_conversion_events_request_id ON conversion_events(request_id);
    CREATE INDEX IF NOT EXISTS idx_conversion_events_event_type ON conversion_events(event_type);
    CREATE INDEX IF NOT EXISTS idx_conversion_events_caller ON conversion_events(caller);
"#;

/// SQLite-backed event store.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Opens (or creates) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, EventError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EventError::Database(e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| EventError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// In-memory store, for tests.
    pub fn in_memory() -> Result<Self, EventError> {
        let conn = Connection::open_in_memory().map_err(|e| EventError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, EventError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| EventError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, EventError> {
        self.conn
            .lock()
            .map_err(|_| EventError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &EventFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref request_id) = filter.request_id {
            conditions.push("request_id = ?");
            params.push(Box::new(request_id.clone()));
        }

        if let Some(ref event_type) = filter.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.clone()));
        }

        if let Some(ref caller) = filter.caller {
            conditions.push("caller = ?");
            params.push(Box::new(caller.clone()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("timestamp >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl EventStore for SqliteEventStore {
    fn insert(&self, record: &EventRecord) -> Result<i64, EventError> {
        let conn = self.lock()?;

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| EventError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO conversion_events (timestamp, event_type, request_id, caller, data) VALUES (?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.request_id,
                record.caller,
                data_json,
            ],
        )
        .map_err(|e| EventError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT id, timestamp, event_type, request_id, caller, data FROM conversion_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| EventError::Database(e.to_string()))?;

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| EventError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, timestamp, event_type, request_id, caller, data_json) =
                row.map_err(|e| EventError::Database(e.to_string()))?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| EventError::Database(format!("Invalid timestamp: {}", e)))?
                .into();
            let data: ConversionEvent = serde_json::from_str(&data_json)
                .map_err(|e| EventError::Serialization(e.to_string()))?;

            records.push(EventRecord {
                id,
                timestamp,
                event_type,
                request_id,
                caller,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &EventFilter) -> Result<i64, EventError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM conversion_events {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| EventError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::ErrorKind;
    use chrono::Duration;

    fn record(event: ConversionEvent) -> EventRecord {
        EventRecord {
            id: 0,
            timestamp: Utc::now(),
            event_type: event.event_type().to_string(),
            request_id: event.request_id().map(String::from),
            caller: event.caller().map(String::from),
            data: event,
        }
    }

    fn succeeded(request_id: &str, caller: &str) -> EventRecord {
        record(ConversionEvent::ConversionSucceeded {
            request_id: request_id.to_string(),
            caller: caller.to_string(),
            source: "png".to_string(),
            target: "jpg".to_string(),
            adapter: "image".to_string(),
            input_bytes: 1000,
            output_bytes: 400,
            duration_ms: 12,
            aux_keys: vec![],
        })
    }

    fn failed(request_id: &str, caller: &str) -> EventRecord {
        record(ConversionEvent::ConversionFailed {
            request_id: request_id.to_string(),
            caller: caller.to_string(),
            source: "docx".to_string(),
            target: "mp4".to_string(),
            adapter: None,
            input_bytes: 1000,
            duration_ms: 0,
            error_kind: ErrorKind::UnsupportedConversion,
        })
    }

    #[test]
    fn test_insert_and_query() {
        let store = SqliteEventStore::in_memory().unwrap();
        let id = store.insert(&succeeded("r-1", "alice")).unwrap();
        assert!(id > 0);

        let results = store.query(&EventFilter::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].event_type, "conversion_succeeded");
        assert_eq!(results[0].caller.as_deref(), Some("alice"));
    }

    #[test]
    fn test_query_filters() {
        let store = SqliteEventStore::in_memory().unwrap();
        store.insert(&succeeded("r-1", "alice")).unwrap();
        store.insert(&failed("r-2", "alice")).unwrap();
        store.insert(&failed("r-3", "bob")).unwrap();

        let results = store
            .query(&EventFilter::new().with_event_type("conversion_failed"))
            .unwrap();
        assert_eq!(results.len(), 2);

        let results = store.query(&EventFilter::new().with_caller("alice")).unwrap();
        assert_eq!(results.len(), 2);

        let results = store.query(&EventFilter::new().with_request_id("r-3")).unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].data,
            ConversionEvent::ConversionFailed {
                error_kind: ErrorKind::UnsupportedConversion,
                ..
            }
        ));
    }

    #[test]
    fn test_query_with_time_range() {
        let store = SqliteEventStore::in_memory().unwrap();
        let now = Utc::now();

        let mut old = succeeded("r-old", "alice");
        old.timestamp = now - Duration::hours(2);
        store.insert(&old).unwrap();
        store.insert(&succeeded("r-new", "alice")).unwrap();

        let filter = EventFilter::new().with_time_range(Some(now - Duration::hours(1)), None);
        let results = store.query(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].request_id.as_deref(), Some("r-new"));
    }

    #[test]
    fn test_pagination_and_count() {
        let store = SqliteEventStore::in_memory().unwrap();
        for i in 0..5 {
            store.insert(&succeeded(&format!("r-{}", i), "alice")).unwrap();
        }

        assert_eq!(store.query(&EventFilter::new().with_limit(2)).unwrap().len(), 2);
        assert_eq!(
            store
                .query(&EventFilter::new().with_limit(2).with_offset(4))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(store.count(&EventFilter::new()).unwrap(), 5);
        assert_eq!(
            store
                .count(&EventFilter::new().with_event_type("conversion_failed"))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("events.db");

        let store = SqliteEventStore::new(&db_path).unwrap();
        store.insert(&succeeded("r-1", "alice")).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.count(&EventFilter::new()).unwrap(), 1);
    }
}

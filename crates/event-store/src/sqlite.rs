//! Embedded tier — a single-file SQLite database created lazily in the local
//! data directory. Suitable for single-instance deployments only (WAL file
//! locking, no multi-process coordination).

use crate::backend::{EventQuery, FunnelCounts, StorageBackend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadpulse_core::types::{Event, NewEvent, StorageTier, CONVERSION_EVENT_TYPES};
use leadpulse_core::{LeadPulseError, LeadPulseResult};
use std::path::Path;

/// Schema DDL; idempotent thanks to `IF NOT EXISTS`, and executed on every
/// open since a stateless deployment may re-open the store per process.
/// Timestamps are unix microseconds so range predicates compare integers.
const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS events (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type   TEXT NOT NULL,
    inquiry_id   TEXT,
    session_id   TEXT,
    course       TEXT,
    timestamp    INTEGER NOT NULL,
    metadata     TEXT,
    utm_source   TEXT,
    utm_medium   TEXT,
    utm_campaign TEXT,
    created_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS events_inquiry_idx ON events(inquiry_id);
CREATE INDEX IF NOT EXISTS events_type_idx    ON events(event_type);
";

const SELECT_COLUMNS: &str = "id, event_type, inquiry_id, session_id, course, \
     timestamp, metadata, utm_source, utm_medium, utm_campaign, created_at";

/// Event store backed by one local SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) `events.db` under `data_dir` and run schema
    /// initialisation.
    pub async fn open(data_dir: impl AsRef<Path>) -> LeadPulseResult<Self> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let conn = tokio_rusqlite::Connection::open(dir.join("events.db"))
            .await
            .map_err(storage_err)?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store — useful for testing.
    pub async fn open_in_memory() -> LeadPulseResult<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(storage_err)?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> LeadPulseResult<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    fn conversion_in_list() -> String {
        CONVERSION_EVENT_TYPES
            .iter()
            .map(|t| format!("'{t}'"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
        let metadata: Option<String> = row.get(6)?;
        Ok(Event {
            id: row.get(0)?,
            event_type: row.get(1)?,
            inquiry_id: row.get(2)?,
            session_id: row.get(3)?,
            course: row.get(4)?,
            timestamp: decode_micros(row.get(5)?)?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            utm_source: row.get(7)?,
            utm_medium: row.get(8)?,
            utm_campaign: row.get(9)?,
            created_at: decode_micros(row.get(10)?)?,
        })
    }
}

fn storage_err(e: tokio_rusqlite::Error) -> LeadPulseError {
    LeadPulseError::Storage(e.to_string())
}

fn decode_micros(value: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, value))
}

#[async_trait]
impl StorageBackend for SqliteStore {
    async fn append(&self, event: NewEvent) -> LeadPulseResult<i64> {
        let created_at = Utc::now();
        let timestamp = event.timestamp.unwrap_or(created_at);
        let metadata = event.metadata.as_ref().map(|m| m.to_string());

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO events (event_type, inquiry_id, session_id, course, \
                     timestamp, metadata, utm_source, utm_medium, utm_campaign, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        event.event_type,
                        event.inquiry_id,
                        event.session_id,
                        event.course,
                        timestamp.timestamp_micros(),
                        metadata,
                        event.utm_source,
                        event.utm_medium,
                        event.utm_campaign,
                        created_at.timestamp_micros(),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(storage_err)
    }

    async fn query(&self, query: &EventQuery) -> LeadPulseResult<Vec<Event>> {
        let mut conditions: Vec<&'static str> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(et) = &query.event_type {
            conditions.push("event_type = ? COLLATE NOCASE");
            values.push(et.clone().into());
        }
        if let Some(iq) = &query.inquiry_id {
            conditions.push("inquiry_id = ?");
            values.push(iq.clone().into());
        }
        if let Some(start) = query.start {
            conditions.push("timestamp >= ?");
            values.push(start.timestamp_micros().into());
        }
        if let Some(end) = query.end {
            conditions.push("timestamp <= ?");
            values.push(end.timestamp_micros().into());
        }

        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM events");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        // Limit applies to the ordered result, not the scan.
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        values.push((query.effective_limit() as i64).into());

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
                    SqliteStore::decode_row(row)
                })?;
                let mut events = Vec::new();
                for row in rows {
                    events.push(row?);
                }
                Ok(events)
            })
            .await
            .map_err(storage_err)
    }

    async fn funnel_counts(&self, query: &EventQuery) -> LeadPulseResult<FunnelCounts> {
        let in_list = Self::conversion_in_list();
        let mut conditions = vec!["inquiry_id IS NOT NULL".to_string()];
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(start) = query.start {
            conditions.push("timestamp >= ?".to_string());
            values.push(start.timestamp_micros().into());
        }
        if let Some(end) = query.end {
            conditions.push("timestamp <= ?".to_string());
            values.push(end.timestamp_micros().into());
        }

        let sql = format!(
            "SELECT COUNT(DISTINCT inquiry_id), \
             COUNT(DISTINCT CASE WHEN lower(event_type) IN ({in_list}) THEN inquiry_id END), \
             COALESCE(SUM(CASE WHEN lower(event_type) IN ({in_list}) THEN 1 ELSE 0 END), 0) \
             FROM events WHERE {}",
            conditions.join(" AND ")
        );

        self.conn
            .call(move |conn| {
                conn.query_row(&sql, rusqlite::params_from_iter(values), |row| {
                    Ok(FunnelCounts {
                        inquiries: row.get::<_, i64>(0)? as u64,
                        converted: row.get::<_, i64>(1)? as u64,
                        payments: row.get::<_, i64>(2)? as u64,
                    })
                })
                .map_err(Into::into)
            })
            .await
            .map_err(storage_err)
    }

    fn tier(&self) -> StorageTier {
        StorageTier::Embedded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(event_type: &str, inquiry_id: Option<&str>, ts: &str) -> NewEvent {
        NewEvent {
            event_type: event_type.to_string(),
            inquiry_id: inquiry_id.map(str::to_string),
            timestamp: Some(ts.parse().unwrap()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_append_returns_rowid_and_roundtrips() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let id = store
            .append(NewEvent {
                event_type: "payment".to_string(),
                inquiry_id: Some("A1".to_string()),
                course: Some("PMP".to_string()),
                timestamp: Some("2024-03-01T10:00:00Z".parse().unwrap()),
                metadata: Some(serde_json::json!({"amount": 4500})),
                utm_campaign: Some("spring".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(id, 1);

        let events = store.query(&EventQuery::default()).await.unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.id, 1);
        assert_eq!(e.event_type, "payment");
        assert_eq!(e.inquiry_id.as_deref(), Some("A1"));
        assert_eq!(e.metadata, Some(serde_json::json!({"amount": 4500})));
        assert_eq!(e.utm_campaign.as_deref(), Some("spring"));
        assert_eq!(
            e.timestamp,
            chrono::Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_nulls_are_preserved() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .append(NewEvent {
                event_type: "pageview".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let events = store.query(&EventQuery::default()).await.unwrap();
        assert_eq!(events[0].inquiry_id, None);
        assert_eq!(events[0].metadata, None);
        // Missing timestamp defaulted to ingestion time.
        assert_eq!(events[0].timestamp, events[0].created_at);
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .append(event("inquiry", Some("A1"), "2024-03-01T10:00:00Z"))
            .await
            .unwrap();
        store
            .append(event("payment", Some("A1"), "2024-03-03T10:00:00Z"))
            .await
            .unwrap();
        store
            .append(event("inquiry", Some("B2"), "2024-03-02T10:00:00Z"))
            .await
            .unwrap();

        let all = store.query(&EventQuery::default()).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let only_a1 = store
            .query(&EventQuery {
                inquiry_id: Some("A1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(only_a1.len(), 2);

        let limited = store
            .query(&EventQuery {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, 2);
    }

    #[tokio::test]
    async fn test_funnel_counts_matches_volatile_semantics() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .append(event("inquiry", Some("A1"), "2024-03-01T10:00:00Z"))
            .await
            .unwrap();
        store
            .append(event("inquiry", Some("A1"), "2024-03-01T10:05:00Z"))
            .await
            .unwrap();
        store
            .append(event("PAID", Some("A1"), "2024-03-02T10:00:00Z"))
            .await
            .unwrap();
        store
            .append(event("pageview", None, "2024-03-02T10:00:00Z"))
            .await
            .unwrap();

        let counts = store.funnel_counts(&EventQuery::default()).await.unwrap();
        assert_eq!(
            counts,
            FunnelCounts {
                inquiries: 1,
                converted: 1,
                payments: 1
            }
        );
    }

    #[tokio::test]
    async fn test_open_creates_data_dir_and_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");
        {
            let store = SqliteStore::open(&data_dir).await.unwrap();
            store
                .append(event("inquiry", Some("A1"), "2024-03-01T10:00:00Z"))
                .await
                .unwrap();
        }
        // Second open runs the idempotent schema again and sees the row.
        let store = SqliteStore::open(&data_dir).await.unwrap();
        let events = store.query(&EventQuery::default()).await.unwrap();
        assert_eq!(events.len(), 1);
    }
}

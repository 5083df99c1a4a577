//! Durable tier — ClickHouse over HTTP. Preferred because it survives
//! restarts and serves multiple concurrent instances; the client multiplexes
//! parallel queries safely.

use crate::backend::{EventQuery, FunnelCounts, StorageBackend};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use leadpulse_core::types::{Event, NewEvent, StorageTier, CONVERSION_EVENT_TYPES};
use leadpulse_core::{LeadPulseError, LeadPulseResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;

const CH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// ClickHouse has no server-side autoincrement, so ids come from a
/// process-wide monotonic generator: ingestion-time microseconds, bumped past
/// the previous id when two appends land in the same microsecond.
struct IdGen {
    last: AtomicI64,
}

impl IdGen {
    fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    fn next(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(last.max(now - 1) + 1)
            })
            .unwrap_or(now - 1);
        prev.max(now - 1) + 1
    }
}

/// Row shape for JSONEachRow inserts.
#[derive(Serialize)]
struct InsertRow<'a> {
    id: i64,
    event_type: &'a str,
    inquiry_id: Option<&'a str>,
    session_id: Option<&'a str>,
    course: Option<&'a str>,
    timestamp: String,
    metadata: Option<String>,
    utm_source: Option<&'a str>,
    utm_medium: Option<&'a str>,
    utm_campaign: Option<&'a str>,
    created_at: String,
}

/// Row shape for selects; timestamps come back as strings via `toString`.
#[derive(clickhouse::Row, Deserialize)]
struct FetchRow {
    id: i64,
    event_type: String,
    inquiry_id: Option<String>,
    session_id: Option<String>,
    course: Option<String>,
    timestamp: String,
    metadata: Option<String>,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    created_at: String,
}

#[derive(clickhouse::Row, Deserialize)]
struct FunnelRow {
    inquiries: u64,
    converted: u64,
    payments: u64,
}

enum Bind {
    Str(String),
    Micros(i64),
}

pub struct ClickHouseStore {
    client: clickhouse::Client,
    ids: IdGen,
}

impl ClickHouseStore {
    pub async fn connect(url: &str, database: &str) -> LeadPulseResult<Self> {
        let client = clickhouse::Client::default()
            .with_url(url)
            .with_database(database);

        Self::ensure_schema(&client).await?;

        Ok(Self {
            client,
            ids: IdGen::new(),
        })
    }

    /// Idempotent DDL, run on every open — the store may be re-opened per
    /// process in a stateless deployment.
    async fn ensure_schema(client: &clickhouse::Client) -> LeadPulseResult<()> {
        client
            .query(
                "CREATE TABLE IF NOT EXISTS events (
                    id Int64,
                    event_type String,
                    inquiry_id Nullable(String),
                    session_id Nullable(String),
                    course Nullable(String),
                    timestamp DateTime64(6),
                    metadata Nullable(String),
                    utm_source Nullable(String),
                    utm_medium Nullable(String),
                    utm_campaign Nullable(String),
                    created_at DateTime64(6),
                    INDEX events_inquiry_idx inquiry_id TYPE bloom_filter GRANULARITY 4
                ) ENGINE = MergeTree()
                ORDER BY (event_type, timestamp)",
            )
            .execute()
            .await
            .map_err(storage_err)?;

        info!("ClickHouse events schema verified");
        Ok(())
    }

    fn conversion_in_list() -> String {
        CONVERSION_EVENT_TYPES
            .iter()
            .map(|t| format!("'{t}'"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn time_conditions(query: &EventQuery, conditions: &mut Vec<String>, binds: &mut Vec<Bind>) {
        if let Some(start) = query.start {
            conditions.push("timestamp >= fromUnixTimestamp64Micro(?)".to_string());
            binds.push(Bind::Micros(start.timestamp_micros()));
        }
        if let Some(end) = query.end {
            conditions.push("timestamp <= fromUnixTimestamp64Micro(?)".to_string());
            binds.push(Bind::Micros(end.timestamp_micros()));
        }
    }
}

fn storage_err(e: clickhouse::error::Error) -> LeadPulseError {
    LeadPulseError::Storage(e.to_string())
}

fn parse_ch_time(raw: &str) -> LeadPulseResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| dt.and_utc())
        .map_err(|e| LeadPulseError::Storage(format!("bad timestamp '{raw}': {e}")))
}

impl TryFrom<FetchRow> for Event {
    type Error = LeadPulseError;

    fn try_from(row: FetchRow) -> LeadPulseResult<Event> {
        Ok(Event {
            id: row.id,
            event_type: row.event_type,
            inquiry_id: row.inquiry_id,
            session_id: row.session_id,
            course: row.course,
            timestamp: parse_ch_time(&row.timestamp)?,
            metadata: row.metadata.and_then(|m| serde_json::from_str(&m).ok()),
            utm_source: row.utm_source,
            utm_medium: row.utm_medium,
            utm_campaign: row.utm_campaign,
            created_at: parse_ch_time(&row.created_at)?,
        })
    }
}

#[async_trait]
impl StorageBackend for ClickHouseStore {
    async fn append(&self, event: NewEvent) -> LeadPulseResult<i64> {
        let id = self.ids.next();
        let created_at = Utc::now();
        let timestamp = event.timestamp.unwrap_or(created_at);

        let row = InsertRow {
            id,
            event_type: &event.event_type,
            inquiry_id: event.inquiry_id.as_deref(),
            session_id: event.session_id.as_deref(),
            course: event.course.as_deref(),
            timestamp: timestamp.format(CH_TIME_FORMAT).to_string(),
            metadata: event.metadata.as_ref().map(|m| m.to_string()),
            utm_source: event.utm_source.as_deref(),
            utm_medium: event.utm_medium.as_deref(),
            utm_campaign: event.utm_campaign.as_deref(),
            created_at: created_at.format(CH_TIME_FORMAT).to_string(),
        };

        let json = serde_json::to_string(&row)?;
        let insert_sql = format!("INSERT INTO events FORMAT JSONEachRow {json}");

        self.client
            .query(&insert_sql)
            .execute()
            .await
            .map_err(storage_err)?;

        Ok(id)
    }

    async fn query(&self, query: &EventQuery) -> LeadPulseResult<Vec<Event>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<Bind> = Vec::new();

        if let Some(et) = &query.event_type {
            conditions.push("lower(event_type) = lower(?)".to_string());
            binds.push(Bind::Str(et.clone()));
        }
        if let Some(iq) = &query.inquiry_id {
            conditions.push("inquiry_id = ?".to_string());
            binds.push(Bind::Str(iq.clone()));
        }
        Self::time_conditions(query, &mut conditions, &mut binds);

        let mut sql = String::from(
            "SELECT id, event_type, inquiry_id, session_id, course, \
             toString(timestamp) AS timestamp, metadata, \
             utm_source, utm_medium, utm_campaign, \
             toString(created_at) AS created_at FROM events",
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");

        let mut q = self.client.query(&sql);
        for bind in binds {
            q = match bind {
                Bind::Str(s) => q.bind(s),
                Bind::Micros(v) => q.bind(v),
            };
        }
        q = q.bind(query.effective_limit() as u64);

        let rows = q.fetch_all::<FetchRow>().await.map_err(storage_err)?;
        rows.into_iter().map(Event::try_from).collect()
    }

    async fn funnel_counts(&self, query: &EventQuery) -> LeadPulseResult<FunnelCounts> {
        let in_list = Self::conversion_in_list();
        let mut conditions = vec!["inquiry_id IS NOT NULL".to_string()];
        let mut binds: Vec<Bind> = Vec::new();
        Self::time_conditions(query, &mut conditions, &mut binds);

        // Aggregation stays inside ClickHouse; only three counters cross the
        // wire.
        let sql = format!(
            "SELECT uniqExact(inquiry_id) AS inquiries, \
             uniqExactIf(inquiry_id, lower(event_type) IN ({in_list})) AS converted, \
             countIf(lower(event_type) IN ({in_list})) AS payments \
             FROM events WHERE {}",
            conditions.join(" AND ")
        );

        let mut q = self.client.query(&sql);
        for bind in binds {
            q = match bind {
                Bind::Str(s) => q.bind(s),
                Bind::Micros(v) => q.bind(v),
            };
        }

        let row = q.fetch_one::<FunnelRow>().await.map_err(storage_err)?;
        Ok(FunnelCounts {
            inquiries: row.inquiries,
            converted: row.converted,
            payments: row.payments,
        })
    }

    fn tier(&self) -> StorageTier {
        StorageTier::Durable
    }
}

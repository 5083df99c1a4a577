//! Volatile tier — an in-process append-only list. Data is lost on restart;
//! an accepted degradation for single-instance deployments without any
//! database available.

use crate::backend::{EventQuery, FunnelCounts, StorageBackend};
use async_trait::async_trait;
use chrono::Utc;
use leadpulse_core::types::{is_conversion_event, Event, NewEvent, StorageTier};
use leadpulse_core::LeadPulseResult;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct MemoryStore {
    events: RwLock<Vec<Event>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(0),
        }
    }

    fn matches(event: &Event, query: &EventQuery) -> bool {
        if let Some(et) = &query.event_type {
            if !event.event_type.eq_ignore_ascii_case(et) {
                return false;
            }
        }
        if let Some(iq) = &query.inquiry_id {
            if event.inquiry_id.as_deref() != Some(iq.as_str()) {
                return false;
            }
        }
        if let Some(start) = query.start {
            if event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = query.end {
            if event.timestamp > end {
                return false;
            }
        }
        true
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    async fn append(&self, event: NewEvent) -> LeadPulseResult<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created_at = Utc::now();
        let stored = Event {
            id,
            event_type: event.event_type,
            inquiry_id: event.inquiry_id,
            session_id: event.session_id,
            course: event.course,
            timestamp: event.timestamp.unwrap_or(created_at),
            metadata: event.metadata,
            utm_source: event.utm_source,
            utm_medium: event.utm_medium,
            utm_campaign: event.utm_campaign,
            created_at,
        };
        self.events.write().push(stored);
        Ok(id)
    }

    async fn query(&self, query: &EventQuery) -> LeadPulseResult<Vec<Event>> {
        let mut matched: Vec<Event> = self
            .events
            .read()
            .iter()
            .filter(|e| Self::matches(e, query))
            .cloned()
            .collect();
        // Newest first; id breaks ties between equal timestamps.
        matched.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        matched.truncate(query.effective_limit());
        Ok(matched)
    }

    async fn funnel_counts(&self, query: &EventQuery) -> LeadPulseResult<FunnelCounts> {
        let events = self.events.read();
        let mut inquiries: HashSet<String> = HashSet::new();
        let mut converted: HashSet<String> = HashSet::new();
        let mut payments = 0u64;

        let range = EventQuery::range(query.start, query.end);
        for event in events.iter().filter(|e| Self::matches(e, &range)) {
            let Some(inquiry_id) = &event.inquiry_id else {
                continue;
            };
            inquiries.insert(inquiry_id.clone());
            if is_conversion_event(&event.event_type) {
                converted.insert(inquiry_id.clone());
                payments += 1;
            }
        }

        Ok(FunnelCounts {
            inquiries: inquiries.len() as u64,
            converted: converted.len() as u64,
            payments,
        })
    }

    fn tier(&self) -> StorageTier {
        StorageTier::Volatile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn event(event_type: &str, inquiry_id: Option<&str>, ts: &str) -> NewEvent {
        NewEvent {
            event_type: event_type.to_string(),
            inquiry_id: inquiry_id.map(str::to_string),
            timestamp: Some(ts.parse().unwrap()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_append_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let a = store
            .append(event("inquiry", Some("A1"), "2024-03-01T10:00:00Z"))
            .await
            .unwrap();
        let b = store
            .append(event("inquiry", Some("A2"), "2024-03-01T11:00:00Z"))
            .await
            .unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn test_query_orders_newest_first_and_limits_after_ordering() {
        let store = MemoryStore::new();
        for hour in 0..5 {
            store
                .append(event(
                    "inquiry",
                    Some("A1"),
                    &format!("2024-03-01T{hour:02}:00:00Z"),
                ))
                .await
                .unwrap();
        }
        let results = store
            .query(&EventQuery {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        // The two newest events, not the two first-inserted ones.
        assert_eq!(results[0].timestamp.hour(), 4);
        assert_eq!(results[1].timestamp.hour(), 3);
    }

    #[tokio::test]
    async fn test_query_conjunctive_predicate() {
        let store = MemoryStore::new();
        store
            .append(event("inquiry", Some("A1"), "2024-03-01T10:00:00Z"))
            .await
            .unwrap();
        store
            .append(event("payment", Some("A1"), "2024-03-02T10:00:00Z"))
            .await
            .unwrap();
        store
            .append(event("payment", Some("B2"), "2024-03-02T11:00:00Z"))
            .await
            .unwrap();

        let results = store
            .query(&EventQuery {
                event_type: Some("payment".to_string()),
                inquiry_id: Some("A1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].inquiry_id.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_query_time_bounds_are_inclusive() {
        let store = MemoryStore::new();
        store
            .append(event("inquiry", Some("A1"), "2024-03-01T00:00:00Z"))
            .await
            .unwrap();
        let start = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let results = store
            .query(&EventQuery::range(Some(start), Some(end)))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_funnel_counts_distinct_inquiries() {
        let store = MemoryStore::new();
        store
            .append(event("inquiry", Some("A1"), "2024-03-01T10:00:00Z"))
            .await
            .unwrap();
        store
            .append(event("inquiry", Some("A1"), "2024-03-01T10:05:00Z"))
            .await
            .unwrap();
        store
            .append(event("paid", Some("A1"), "2024-03-02T10:00:00Z"))
            .await
            .unwrap();
        // No inquiry id: ignored by the funnel.
        store
            .append(event("pageview", None, "2024-03-02T10:00:00Z"))
            .await
            .unwrap();

        let counts = store
            .funnel_counts(&EventQuery::default())
            .await
            .unwrap();
        assert_eq!(
            counts,
            FunnelCounts {
                inquiries: 1,
                converted: 1,
                payments: 1
            }
        );
    }
}

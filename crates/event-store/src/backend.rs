//! Uniform write/query contract implemented by every storage tier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadpulse_core::types::{Event, NewEvent, StorageTier};
use leadpulse_core::LeadPulseResult;
use serde::{Deserialize, Serialize};

/// Default result cap when the caller does not supply one.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Conjunctive criteria for event queries. Absent fields never constrain.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub event_type: Option<String>,
    pub inquiry_id: Option<String>,
    /// Inclusive lower bound on the occurrence timestamp.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the occurrence timestamp.
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventQuery {
    /// Restrict to a time range only.
    pub fn range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start,
            end,
            ..Default::default()
        }
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_QUERY_LIMIT)
    }
}

/// Raw funnel tallies, computed inside the store so the durable tier never
/// ships its full table to the client. Only events carrying an `inquiry_id`
/// participate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelCounts {
    /// Distinct inquiry ids across all events in range.
    pub inquiries: u64,
    /// Distinct inquiry ids among conversion events.
    pub converted: u64,
    /// Raw (non-distinct) count of conversion events.
    pub payments: u64,
}

/// One interchangeable event-storage backend.
///
/// The tier is chosen once at startup and fixed for the process lifetime;
/// results must be identical across tiers for the same stored events.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Append one event, assigning its id and ingestion time. Optional
    /// fields are stored as NULLs; only I/O failure errors.
    async fn append(&self, event: NewEvent) -> LeadPulseResult<i64>;

    /// Matching events, newest-first. The limit caps the result count and is
    /// applied after ordering.
    async fn query(&self, query: &EventQuery) -> LeadPulseResult<Vec<Event>>;

    /// Funnel tallies over the query's time range.
    async fn funnel_counts(&self, query: &EventQuery) -> LeadPulseResult<FunnelCounts>;

    fn tier(&self) -> StorageTier;
}

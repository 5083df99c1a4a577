//! Append-only event log with three interchangeable storage tiers.
//!
//! The tier is selected once at startup by configuration: ClickHouse when an
//! endpoint is configured, otherwise a single-file SQLite database, otherwise
//! process memory. The write/query contract is identical regardless of tier;
//! callers learn which tier served them through [`EventStore::tier`].

pub mod backend;
pub mod clickhouse;
pub mod memory;
pub mod sqlite;

pub use backend::{EventQuery, FunnelCounts, StorageBackend, DEFAULT_QUERY_LIMIT};
pub use self::clickhouse::ClickHouseStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use leadpulse_core::config::{EventStoreConfig, StoreMode};
use leadpulse_core::types::{Event, NewEvent, StorageTier};
use leadpulse_core::{LeadPulseError, LeadPulseResult};
use std::sync::Arc;
use tracing::{info, warn};

/// Handle to the selected storage tier, shared across request handlers.
#[derive(Clone)]
pub struct EventStore {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("tier", &self.backend.tier())
            .finish()
    }
}

impl EventStore {
    /// Select and open a tier per configuration. The choice is explicit and
    /// fixed for the process lifetime.
    pub async fn open(config: &EventStoreConfig) -> LeadPulseResult<Self> {
        let backend: Arc<dyn StorageBackend> = match config.mode {
            StoreMode::Durable => {
                let url = config.clickhouse_url.as_deref().ok_or_else(|| {
                    LeadPulseError::Config(
                        "event_store.mode = durable requires event_store.clickhouse_url".to_string(),
                    )
                })?;
                Arc::new(ClickHouseStore::connect(url, &config.database).await?)
            }
            StoreMode::Embedded => Arc::new(SqliteStore::open(&config.data_dir).await?),
            StoreMode::Volatile => Arc::new(MemoryStore::new()),
            StoreMode::Auto => match config.clickhouse_url.as_deref() {
                Some(url) => Arc::new(ClickHouseStore::connect(url, &config.database).await?),
                None => match SqliteStore::open(&config.data_dir).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        warn!(
                            error = %e,
                            data_dir = %config.data_dir,
                            "Embedded event store unavailable, falling back to \
                             process memory; events will not survive restart"
                        );
                        Arc::new(MemoryStore::new())
                    }
                },
            },
        };

        let store = Self { backend };
        match store.tier() {
            StorageTier::Volatile => warn!(
                tier = %store.tier(),
                "Event store running in volatile mode"
            ),
            tier => info!(tier = %tier, "Event store ready"),
        }
        Ok(store)
    }

    /// Wrap an already-constructed backend. Useful for tests and custom
    /// tiers.
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// A purely in-memory store — useful for tests and offline tooling.
    pub fn volatile() -> Self {
        Self::with_backend(Arc::new(MemoryStore::new()))
    }

    pub async fn append(&self, event: NewEvent) -> LeadPulseResult<i64> {
        let id = self.backend.append(event).await?;
        metrics::counter!("events.appended").increment(1);
        Ok(id)
    }

    pub async fn query(&self, query: &EventQuery) -> LeadPulseResult<Vec<Event>> {
        self.backend.query(query).await
    }

    pub async fn funnel_counts(&self, query: &EventQuery) -> LeadPulseResult<FunnelCounts> {
        self.backend.funnel_counts(query).await
    }

    pub fn tier(&self) -> StorageTier {
        self.backend.tier()
    }
}

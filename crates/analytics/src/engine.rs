//! Orchestrates one analytics request: ledger fetch → filter → aggregate,
//! with short-lived memoization and best-effort funnel augmentation.

use crate::attribution::{attribute, CampaignRollup};
use crate::filter;
use crate::funnel::FunnelSummary;
use crate::summary::{summarize, SummaryReport};
use crate::timeseries::{
    daily_conversions, daily_funnel, daily_inquiries, daily_revenue, FunnelSeries, TimeSeries,
    TimeSeriesMetric,
};
use leadpulse_core::config::CacheConfig;
use leadpulse_core::types::{Event, FilterSpec, LedgerRecord};
use leadpulse_core::LeadPulseResult;
use leadpulse_cache::ResultCache;
use leadpulse_event_store::{EventQuery, EventStore};
use leadpulse_ledger::LedgerReader;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cap on events materialized for series bucketing. Generous for a funnel
/// that sees hundreds of inquiries a month.
const SERIES_SCAN_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSeriesResponse {
    Single(TimeSeries),
    Funnel(FunnelSeries),
}

pub struct AnalyticsEngine {
    reader: LedgerReader,
    store: EventStore,
    summary_cache: ResultCache<SummaryReport>,
    series_cache: ResultCache<TimeSeriesResponse>,
    attribution_cache: ResultCache<Vec<CampaignRollup>>,
}

impl AnalyticsEngine {
    pub fn new(reader: LedgerReader, store: EventStore, cache: &CacheConfig) -> Self {
        Self {
            reader,
            store,
            summary_cache: ResultCache::new(cache.ttl_secs),
            series_cache: ResultCache::new(cache.ttl_secs),
            attribution_cache: ResultCache::new(cache.ttl_secs),
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Summary KPIs with per-dimension rollups. The funnel is best-effort: a
    /// store failure degrades the summary by omission, never fails it.
    pub async fn summary(&self, spec: &FilterSpec) -> LeadPulseResult<SummaryReport> {
        let key = format!("summary:{}", spec.cache_key());
        if let Some(hit) = self.summary_cache.get(&key) {
            return Ok(hit);
        }
        metrics::counter!("analytics.cache_miss").increment(1);

        let records = self.filtered_ledger(spec).await?;
        let mut report = summarize(&records);

        let range = EventQuery::range(spec.start_bound(), spec.end_bound());
        match self.store.funnel_counts(&range).await {
            Ok(counts) => report.funnel = Some(FunnelSummary::from_counts(counts)),
            Err(e) => {
                warn!(error = %e, "Funnel computation failed; returning summary without it");
            }
        }

        self.summary_cache.set(key, report.clone());
        Ok(report)
    }

    /// One day-bucketed series for the requested metric.
    pub async fn timeseries(
        &self,
        metric: TimeSeriesMetric,
        spec: &FilterSpec,
    ) -> LeadPulseResult<TimeSeriesResponse> {
        let key = format!("timeseries:{metric:?}:{}", spec.cache_key());
        if let Some(hit) = self.series_cache.get(&key) {
            return Ok(hit);
        }
        metrics::counter!("analytics.cache_miss").increment(1);

        let response = match metric {
            TimeSeriesMetric::DailyRevenue => {
                let records = self.filtered_ledger(spec).await?;
                TimeSeriesResponse::Single(daily_revenue(&records))
            }
            TimeSeriesMetric::DailyInquiries => {
                TimeSeriesResponse::Single(daily_inquiries(&self.events_in_range(spec).await?))
            }
            TimeSeriesMetric::DailyConversions => {
                TimeSeriesResponse::Single(daily_conversions(&self.events_in_range(spec).await?))
            }
            TimeSeriesMetric::DailyFunnel => {
                TimeSeriesResponse::Funnel(daily_funnel(&self.events_in_range(spec).await?))
            }
        };

        self.series_cache.set(key, response.clone());
        Ok(response)
    }

    /// Campaign → source/medium → content/term rollups over the filtered
    /// ledger.
    pub async fn attribution(&self, spec: &FilterSpec) -> LeadPulseResult<Vec<CampaignRollup>> {
        let key = format!("attribution:{}", spec.cache_key());
        if let Some(hit) = self.attribution_cache.get(&key) {
            return Ok(hit);
        }
        metrics::counter!("analytics.cache_miss").increment(1);

        let records = self.filtered_ledger(spec).await?;
        let rollups = attribute(&records);
        self.attribution_cache.set(key, rollups.clone());
        Ok(rollups)
    }

    /// Sweep expired cache entries; called from the periodic maintenance
    /// task.
    pub fn run_maintenance(&self) {
        self.summary_cache.evict_expired();
        self.series_cache.evict_expired();
        self.attribution_cache.evict_expired();
    }

    async fn filtered_ledger(&self, spec: &FilterSpec) -> LeadPulseResult<Vec<LedgerRecord>> {
        let records = self.reader.fetch_all().await?;
        Ok(filter::apply(&records, spec))
    }

    async fn events_in_range(&self, spec: &FilterSpec) -> LeadPulseResult<Vec<Event>> {
        self.store
            .query(&EventQuery {
                start: spec.start_bound(),
                end: spec.end_bound(),
                limit: Some(SERIES_SCAN_LIMIT),
                ..Default::default()
            })
            .await
    }
}

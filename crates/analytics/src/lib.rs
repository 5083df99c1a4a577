//! Filtering and aggregation — the canonical implementation both the server
//! path and any local consumer call into.

pub mod attribution;
pub mod engine;
pub mod filter;
pub mod funnel;
pub mod summary;
pub mod timeseries;

pub use attribution::{attribute, CampaignRollup};
pub use engine::{AnalyticsEngine, TimeSeriesResponse};
pub use filter::{apply, Filterable};
pub use funnel::FunnelSummary;
pub use summary::{summarize, SummaryReport};
pub use timeseries::{FunnelSeries, TimeSeries, TimeSeriesMetric};

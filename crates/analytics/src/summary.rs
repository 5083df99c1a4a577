//! Summary KPIs over the filtered ledger — revenue totals, status counts,
//! and per-dimension revenue rollups.

use crate::funnel::FunnelSummary;
use leadpulse_core::types::{LeadStatus, LedgerRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Sum of `amount` over paid records, MAD.
    pub total_revenue: f64,
    /// Sum of `amount` over pending records, MAD.
    pub pending_revenue: f64,
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    /// `total_revenue / successful_transactions`, 0 when none, 2 dp.
    pub average_order_value: f64,
    pub revenue_per_course: BTreeMap<String, f64>,
    pub revenue_per_payment_method: BTreeMap<String, f64>,
    pub revenue_per_language: BTreeMap<String, f64>,
    /// Best-effort: omitted when the event store is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funnel: Option<FunnelSummary>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Reduce a filtered record set to summary KPIs. Pure; the funnel field is
/// attached separately by the engine.
pub fn summarize(records: &[LedgerRecord]) -> SummaryReport {
    let mut total_revenue = 0.0;
    let mut pending_revenue = 0.0;
    let mut successful = 0u64;
    let mut failed = 0u64;
    let mut per_course: BTreeMap<String, f64> = BTreeMap::new();
    let mut per_method: BTreeMap<String, f64> = BTreeMap::new();
    let mut per_language: BTreeMap<String, f64> = BTreeMap::new();

    for record in records {
        match record.status {
            LeadStatus::Paid => {
                total_revenue += record.amount;
                successful += 1;

                let course = if record.normalized_course.is_empty() {
                    "Other".to_string()
                } else {
                    record.normalized_course.clone()
                };
                let language = if record.language.is_empty() {
                    "unknown".to_string()
                } else {
                    record.language.clone()
                };
                *per_course.entry(course).or_insert(0.0) += record.amount;
                *per_method
                    .entry(record.payment_method.as_str().to_string())
                    .or_insert(0.0) += record.amount;
                *per_language.entry(language).or_insert(0.0) += record.amount;
            }
            LeadStatus::Pending => pending_revenue += record.amount,
            LeadStatus::Failed => failed += 1,
            LeadStatus::Canceled => {}
        }
    }

    let average_order_value = if successful > 0 {
        round2(total_revenue / successful as f64)
    } else {
        0.0
    };

    SummaryReport {
        total_revenue,
        pending_revenue,
        total_transactions: records.len() as u64,
        successful_transactions: successful,
        failed_transactions: failed,
        average_order_value,
        revenue_per_course: per_course,
        revenue_per_payment_method: per_method,
        revenue_per_language: per_language,
        funnel: None,
    }
}

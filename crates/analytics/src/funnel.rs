//! Funnel KPIs — inquiries → converted → payments, derived from the event
//! stream. Only events carrying an `inquiry_id` participate.

use leadpulse_core::types::{is_conversion_event, Event};
use leadpulse_event_store::FunnelCounts;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FunnelSummary {
    /// Distinct inquiry ids seen in range.
    pub inquiries: u64,
    /// Distinct inquiry ids with at least one conversion event.
    pub converted: u64,
    /// Raw conversion-event count (not deduplicated).
    pub payments: u64,
    /// `converted / inquiries`, 0 when there are no inquiries, 4 dp.
    pub conversion_rate: f64,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

impl FunnelSummary {
    /// Build the KPI tuple from store-computed tallies.
    pub fn from_counts(counts: FunnelCounts) -> Self {
        let conversion_rate = if counts.inquiries > 0 {
            round4(counts.converted as f64 / counts.inquiries as f64)
        } else {
            0.0
        };
        Self {
            inquiries: counts.inquiries,
            converted: counts.converted,
            payments: counts.payments,
            conversion_rate,
        }
    }

    /// Count an already-materialized event slice. Must agree with every
    /// storage tier's `funnel_counts`.
    pub fn from_events(events: &[Event]) -> Self {
        let mut inquiries: HashSet<&str> = HashSet::new();
        let mut converted: HashSet<&str> = HashSet::new();
        let mut payments = 0u64;

        for event in events {
            let Some(inquiry_id) = event.inquiry_id.as_deref() else {
                continue;
            };
            inquiries.insert(inquiry_id);
            if is_conversion_event(&event.event_type) {
                converted.insert(inquiry_id);
                payments += 1;
            }
        }

        Self::from_counts(FunnelCounts {
            inquiries: inquiries.len() as u64,
            converted: converted.len() as u64,
            payments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, inquiry_id: Option<&str>) -> Event {
        Event {
            id: 0,
            event_type: event_type.to_string(),
            inquiry_id: inquiry_id.map(str::to_string),
            session_id: None,
            course: None,
            timestamp: "2024-03-01T10:00:00Z".parse().unwrap(),
            metadata: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            created_at: "2024-03-01T10:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_duplicate_inquiry_events_count_once() {
        let events = vec![
            event("inquiry", Some("A1")),
            event("inquiry", Some("A1")),
            event("paid", Some("A1")),
        ];
        let funnel = FunnelSummary::from_events(&events);
        assert_eq!(funnel.inquiries, 1);
        assert_eq!(funnel.converted, 1);
        assert_eq!(funnel.payments, 1);
        assert_eq!(funnel.conversion_rate, 1.0);
    }

    #[test]
    fn test_rate_is_zero_iff_no_inquiries() {
        let empty = FunnelSummary::from_events(&[]);
        assert_eq!(empty.inquiries, 0);
        assert_eq!(empty.conversion_rate, 0.0);

        // Events without inquiry ids do not create inquiries.
        let anonymous = FunnelSummary::from_events(&[event("payment", None)]);
        assert_eq!(anonymous.inquiries, 0);
        assert_eq!(anonymous.conversion_rate, 0.0);
    }

    #[test]
    fn test_rate_stays_within_unit_interval_and_rounds() {
        let events = vec![
            event("inquiry", Some("A")),
            event("inquiry", Some("B")),
            event("inquiry", Some("C")),
            event("payment_success", Some("A")),
        ];
        let funnel = FunnelSummary::from_events(&events);
        assert_eq!(funnel.conversion_rate, 0.3333);
        assert!(funnel.conversion_rate >= 0.0 && funnel.conversion_rate <= 1.0);
    }

    #[test]
    fn test_payments_are_not_deduplicated() {
        let events = vec![
            event("inquiry", Some("A")),
            event("payment", Some("A")),
            event("payment", Some("A")),
        ];
        let funnel = FunnelSummary::from_events(&events);
        assert_eq!(funnel.converted, 1);
        assert_eq!(funnel.payments, 2);
    }
}

//! Day-bucketed time-series. Labels are `YYYY-MM-DD`, ascending and
//! distinct; gaps are allowed except in the two-sided funnel series, which is
//! zero-filled over the union of dates.

use chrono::NaiveDate;
use leadpulse_core::types::{is_conversion_event, Event, LeadStatus, LedgerRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSeriesMetric {
    DailyRevenue,
    DailyInquiries,
    DailyConversions,
    DailyFunnel,
}

impl TimeSeriesMetric {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "daily_revenue" => Some(Self::DailyRevenue),
            "daily_inquiries" => Some(Self::DailyInquiries),
            "daily_conversions" => Some(Self::DailyConversions),
            "daily_funnel" => Some(Self::DailyFunnel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub labels: Vec<String>,
    pub series: Vec<f64>,
}

/// Two aligned series over the union of dates present in either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelSeries {
    pub labels: Vec<String>,
    pub series: FunnelSeriesValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelSeriesValues {
    pub inquiries: Vec<f64>,
    pub conversions: Vec<f64>,
}

fn label(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn to_series(buckets: BTreeMap<NaiveDate, f64>) -> TimeSeries {
    let mut labels = Vec::with_capacity(buckets.len());
    let mut series = Vec::with_capacity(buckets.len());
    for (date, value) in buckets {
        labels.push(label(date));
        series.push(value);
    }
    TimeSeries { labels, series }
}

/// Paid revenue per day, bucketed on the date portion of the row timestamp.
/// Rows without a parseable timestamp cannot be bucketed and are skipped.
pub fn daily_revenue(records: &[LedgerRecord]) -> TimeSeries {
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in records {
        if record.status != LeadStatus::Paid {
            continue;
        }
        let Some(ts) = record.timestamp else {
            continue;
        };
        *buckets.entry(ts.date_naive()).or_insert(0.0) += record.amount;
    }
    to_series(buckets)
}

fn daily_distinct<F>(events: &[Event], include: F) -> BTreeMap<NaiveDate, f64>
where
    F: Fn(&Event) -> bool,
{
    let mut buckets: BTreeMap<NaiveDate, HashSet<&str>> = BTreeMap::new();
    for event in events {
        let Some(inquiry_id) = event.inquiry_id.as_deref() else {
            continue;
        };
        if !include(event) {
            continue;
        }
        buckets
            .entry(event.timestamp.date_naive())
            .or_default()
            .insert(inquiry_id);
    }
    buckets
        .into_iter()
        .map(|(date, ids)| (date, ids.len() as f64))
        .collect()
}

/// Distinct inquiry ids per day, same distinctness rule as the funnel KPI.
pub fn daily_inquiries(events: &[Event]) -> TimeSeries {
    to_series(daily_distinct(events, |_| true))
}

/// Distinct converting inquiry ids per day.
pub fn daily_conversions(events: &[Event]) -> TimeSeries {
    to_series(daily_distinct(events, |e| is_conversion_event(&e.event_type)))
}

/// Inquiries and conversions aligned over the union of their dates. A date
/// present on one side only contributes an explicit 0 on the other, never a
/// gap.
pub fn daily_funnel(events: &[Event]) -> FunnelSeries {
    let inquiries = daily_distinct(events, |_| true);
    let conversions = daily_distinct(events, |e| is_conversion_event(&e.event_type));

    let dates: BTreeSet<NaiveDate> = inquiries
        .keys()
        .chain(conversions.keys())
        .copied()
        .collect();

    let mut labels = Vec::with_capacity(dates.len());
    let mut inquiry_series = Vec::with_capacity(dates.len());
    let mut conversion_series = Vec::with_capacity(dates.len());
    for date in dates {
        labels.push(label(date));
        inquiry_series.push(inquiries.get(&date).copied().unwrap_or(0.0));
        conversion_series.push(conversions.get(&date).copied().unwrap_or(0.0));
    }

    FunnelSeries {
        labels,
        series: FunnelSeriesValues {
            inquiries: inquiry_series,
            conversions: conversion_series,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadpulse_core::types::PaymentMethod;

    fn paid(amount: f64, ts: Option<&str>) -> LedgerRecord {
        LedgerRecord {
            timestamp: ts.map(|s| s.parse().unwrap()),
            inquiry_id: "A1".to_string(),
            transaction_id: String::new(),
            status: LeadStatus::Paid,
            payment_method: PaymentMethod::Card,
            amount,
            final_amount: amount,
            course: "PMP".to_string(),
            normalized_course: "PMP".to_string(),
            language: "fr".to_string(),
            customer_name: String::new(),
            customer_email: String::new(),
            customer_phone: String::new(),
            utm_source: String::new(),
            utm_medium: String::new(),
            utm_campaign: String::new(),
            utm_content: String::new(),
            utm_term: String::new(),
        }
    }

    fn event(event_type: &str, inquiry_id: &str, ts: &str) -> Event {
        Event {
            id: 0,
            event_type: event_type.to_string(),
            inquiry_id: Some(inquiry_id.to_string()),
            session_id: None,
            course: None,
            timestamp: ts.parse().unwrap(),
            metadata: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            created_at: ts.parse().unwrap(),
        }
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!(
            TimeSeriesMetric::parse("daily_revenue"),
            Some(TimeSeriesMetric::DailyRevenue)
        );
        assert_eq!(TimeSeriesMetric::parse("weekly_revenue"), None);
    }

    #[test]
    fn test_daily_revenue_buckets_paid_by_date() {
        let records = vec![
            paid(200.0, Some("2024-03-01T09:00:00Z")),
            paid(300.0, Some("2024-03-01T18:00:00Z")),
            paid(150.0, Some("2024-03-03T10:00:00Z")),
            // Unparseable timestamp: cannot be bucketed.
            paid(999.0, None),
        ];
        let series = daily_revenue(&records);
        assert_eq!(series.labels, vec!["2024-03-01", "2024-03-03"]);
        assert_eq!(series.series, vec![500.0, 150.0]);
    }

    #[test]
    fn test_daily_inquiries_deduplicates_per_day() {
        let events = vec![
            event("inquiry", "A", "2024-03-01T09:00:00Z"),
            event("inquiry", "A", "2024-03-01T10:00:00Z"),
            event("inquiry", "B", "2024-03-01T11:00:00Z"),
        ];
        let series = daily_inquiries(&events);
        assert_eq!(series.labels, vec!["2024-03-01"]);
        assert_eq!(series.series, vec![2.0]);
    }

    #[test]
    fn test_daily_funnel_zero_fills_the_union() {
        let events = vec![
            event("inquiry", "A", "2024-03-01T09:00:00Z"),
            event("payment", "A", "2024-03-02T09:00:00Z"),
            event("inquiry", "B", "2024-03-03T09:00:00Z"),
        ];
        let funnel = daily_funnel(&events);
        assert_eq!(funnel.labels, vec!["2024-03-01", "2024-03-02", "2024-03-03"]);
        // 03-02 has an inquiry id via the payment event, so inquiries=1 there.
        assert_eq!(funnel.series.inquiries, vec![1.0, 1.0, 1.0]);
        assert_eq!(funnel.series.conversions, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_daily_funnel_labels_are_union_of_parts() {
        let events = vec![
            event("inquiry", "A", "2024-03-01T09:00:00Z"),
            event("payment", "B", "2024-03-05T09:00:00Z"),
        ];
        let funnel = daily_funnel(&events);
        let inquiry_labels = daily_inquiries(&events).labels;
        let conversion_labels = daily_conversions(&events).labels;

        let mut union: Vec<String> = inquiry_labels;
        for l in conversion_labels {
            if !union.contains(&l) {
                union.push(l);
            }
        }
        union.sort();
        assert_eq!(funnel.labels, union);
        assert_eq!(funnel.labels.len(), funnel.series.inquiries.len());
        assert_eq!(funnel.labels.len(), funnel.series.conversions.len());
    }
}

//! The canonical filter predicate. Every consumer — server aggregation and
//! any secondary path over locally cached data — calls into this module, so
//! inclusion decisions can never diverge.

use chrono::{DateTime, Utc};
use leadpulse_core::types::{Event, FilterSpec, LedgerRecord};

/// A record the filter engine can evaluate. Fields a record type does not
/// carry return `None` and fail any constraint set on them.
pub trait Filterable {
    fn timestamp(&self) -> Option<DateTime<Utc>>;
    fn course(&self) -> Option<&str>;
    fn payment_method(&self) -> Option<&str>;
    fn language(&self) -> Option<&str>;
    fn utm_campaign(&self) -> Option<&str>;
    fn event_type(&self) -> Option<&str>;
    fn inquiry_id(&self) -> Option<&str>;
}

impl Filterable for LedgerRecord {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
    fn course(&self) -> Option<&str> {
        Some(&self.normalized_course)
    }
    fn payment_method(&self) -> Option<&str> {
        Some(self.payment_method.as_str())
    }
    fn language(&self) -> Option<&str> {
        Some(&self.language)
    }
    fn utm_campaign(&self) -> Option<&str> {
        Some(&self.utm_campaign)
    }
    fn event_type(&self) -> Option<&str> {
        None
    }
    fn inquiry_id(&self) -> Option<&str> {
        Some(&self.inquiry_id)
    }
}

impl Filterable for Event {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.timestamp)
    }
    fn course(&self) -> Option<&str> {
        self.course.as_deref()
    }
    fn payment_method(&self) -> Option<&str> {
        None
    }
    fn language(&self) -> Option<&str> {
        None
    }
    fn utm_campaign(&self) -> Option<&str> {
        self.utm_campaign.as_deref()
    }
    fn event_type(&self) -> Option<&str> {
        Some(&self.event_type)
    }
    fn inquiry_id(&self) -> Option<&str> {
        self.inquiry_id.as_deref()
    }
}

fn satisfies(constraint: Option<&str>, actual: Option<&str>) -> bool {
    match constraint {
        None => true,
        Some(want) => actual.is_some_and(|got| got.eq_ignore_ascii_case(want)),
    }
}

/// Whether one record satisfies every present constraint (logical AND).
/// Absent constraints never exclude. A record whose timestamp could not be
/// parsed fails any date-bounded filter: we cannot prove it is in range.
pub fn matches<T: Filterable>(record: &T, spec: &FilterSpec) -> bool {
    if spec.start.is_some() || spec.end.is_some() {
        let Some(ts) = record.timestamp() else {
            return false;
        };
        if let Some(start) = spec.start_bound() {
            if ts < start {
                return false;
            }
        }
        if let Some(end) = spec.end_bound() {
            if ts > end {
                return false;
            }
        }
    }

    satisfies(spec.course.as_deref(), record.course())
        && satisfies(spec.payment_method.as_deref(), record.payment_method())
        && satisfies(spec.language.as_deref(), record.language())
        && satisfies(spec.utm_campaign.as_deref(), record.utm_campaign())
        && satisfies(spec.event_type.as_deref(), record.event_type())
        && satisfies(spec.inquiry_id.as_deref(), record.inquiry_id())
}

/// The subset of `records` matching `spec`, in input order.
pub fn apply<T: Filterable + Clone>(records: &[T], spec: &FilterSpec) -> Vec<T> {
    records
        .iter()
        .filter(|record| matches(*record, spec))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use leadpulse_core::types::{LeadStatus, PaymentMethod};

    fn record(ts: Option<&str>, course: &str, language: &str) -> LedgerRecord {
        LedgerRecord {
            timestamp: ts.map(|s| s.parse().unwrap()),
            inquiry_id: "A1".to_string(),
            transaction_id: String::new(),
            status: LeadStatus::Paid,
            payment_method: PaymentMethod::Card,
            amount: 100.0,
            final_amount: 100.0,
            course: course.to_string(),
            normalized_course: course.to_string(),
            language: language.to_string(),
            customer_name: String::new(),
            customer_email: String::new(),
            customer_phone: String::new(),
            utm_source: String::new(),
            utm_medium: String::new(),
            utm_campaign: "spring".to_string(),
            utm_content: String::new(),
            utm_term: String::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_spec_is_identity() {
        let records = vec![
            record(Some("2024-03-01T10:00:00Z"), "PMP", "fr"),
            record(None, "QSE", "ar"),
        ];
        let out = apply(&records, &FilterSpec::default());
        assert_eq!(out.len(), records.len());
    }

    #[test]
    fn test_constraints_are_conjunctive() {
        let records = vec![
            record(Some("2024-03-01T10:00:00Z"), "PMP", "fr"),
            record(Some("2024-03-01T10:00:00Z"), "PMP", "ar"),
            record(Some("2024-03-01T10:00:00Z"), "QSE", "fr"),
        ];
        let spec = FilterSpec {
            course: Some("PMP".to_string()),
            language: Some("fr".to_string()),
            ..Default::default()
        };
        assert_eq!(apply(&records, &spec).len(), 1);
    }

    #[test]
    fn test_unparseable_timestamp_fails_any_date_bound() {
        let records = vec![record(None, "PMP", "fr")];

        let start_only = FilterSpec {
            start: Some(date(2020, 1, 1)),
            ..Default::default()
        };
        let end_only = FilterSpec {
            end: Some(date(2030, 1, 1)),
            ..Default::default()
        };
        assert!(apply(&records, &start_only).is_empty());
        assert!(apply(&records, &end_only).is_empty());
    }

    #[test]
    fn test_end_bound_includes_whole_day() {
        let records = vec![record(Some("2024-03-15T22:30:00Z"), "PMP", "fr")];
        let spec = FilterSpec {
            end: Some(date(2024, 3, 15)),
            ..Default::default()
        };
        assert_eq!(apply(&records, &spec).len(), 1);
    }

    #[test]
    fn test_event_and_ledger_share_inclusion_decisions() {
        let ts = "2024-03-15T10:00:00Z";
        let ledger = vec![record(Some(ts), "PMP", "fr")];
        let events = vec![Event {
            id: 1,
            event_type: "inquiry".to_string(),
            inquiry_id: Some("A1".to_string()),
            session_id: None,
            course: Some("PMP".to_string()),
            timestamp: ts.parse().unwrap(),
            metadata: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: Some("spring".to_string()),
            created_at: ts.parse().unwrap(),
        }];

        let spec = FilterSpec {
            start: Some(date(2024, 3, 15)),
            end: Some(date(2024, 3, 15)),
            utm_campaign: Some("spring".to_string()),
            ..Default::default()
        };
        assert_eq!(apply(&ledger, &spec).len(), 1);
        assert_eq!(apply(&events, &spec).len(), 1);
    }

    #[test]
    fn test_missing_field_fails_present_constraint() {
        // Ledger rows carry no event type, so an event-type constraint
        // excludes them.
        let records = vec![record(Some("2024-03-01T10:00:00Z"), "PMP", "fr")];
        let spec = FilterSpec {
            event_type: Some("payment".to_string()),
            ..Default::default()
        };
        assert!(apply(&records, &spec).is_empty());
    }
}

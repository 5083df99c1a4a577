//! Fetches the external ledger and normalizes every row into a typed
//! [`LedgerRecord`]. A malformed row never fails the batch — numbers coerce
//! to 0, dates to `None`, missing text to its declared default.

use crate::normalize::{normalize_course, parse_amount, parse_date};
use crate::source::{LedgerSource, RawRow};
use leadpulse_core::config::LedgerConfig;
use leadpulse_core::types::{LeadStatus, LedgerRecord, PaymentMethod};
use leadpulse_core::LeadPulseResult;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct LedgerReader {
    source: Arc<dyn LedgerSource>,
    default_language: String,
}

impl LedgerReader {
    pub fn new(source: Arc<dyn LedgerSource>, config: &LedgerConfig) -> Self {
        Self {
            source,
            default_language: config.default_language.clone(),
        }
    }

    /// Fetch and normalize the full ledger. Only an unreachable collaborator
    /// fails the call; individual rows always normalize.
    pub async fn fetch_all(&self) -> LeadPulseResult<Vec<LedgerRecord>> {
        let rows = self.source.fetch_rows().await?;
        let records = rows.iter().map(|row| self.normalize_row(row)).collect::<Vec<_>>();
        debug!(records = records.len(), "Ledger normalized");
        Ok(records)
    }

    /// Apply every normalization rule to one raw row.
    pub fn normalize_row(&self, row: &RawRow) -> LedgerRecord {
        let course = text(row, &["course", "formation"]);
        let amount = parse_amount(&text(row, &["amount", "montant"]));
        let final_amount_raw = text(row, &["final_amount", "finalAmount"]);
        let final_amount = if final_amount_raw.is_empty() {
            amount
        } else {
            parse_amount(&final_amount_raw)
        };
        let language = {
            let raw = text(row, &["language", "lang", "langue"]).to_lowercase();
            if raw.is_empty() {
                self.default_language.clone()
            } else {
                raw
            }
        };

        LedgerRecord {
            timestamp: parse_date(&text(row, &["timestamp", "date", "created_at"])),
            inquiry_id: text(row, &["inquiry_id", "inquiryId", "lead_id"]),
            transaction_id: text(row, &["transaction_id", "transactionId"]),
            status: LeadStatus::parse(&text(row, &["status", "statut"])),
            payment_method: PaymentMethod::parse(&text(row, &["payment_method", "paymentMethod", "payment"])),
            amount,
            final_amount,
            normalized_course: normalize_course(&course),
            course,
            language,
            customer_name: text(row, &["customer_name", "name", "nom"]),
            customer_email: text(row, &["customer_email", "email"]),
            customer_phone: text(row, &["customer_phone", "phone", "tel"]),
            utm_source: text(row, &["utm_source"]),
            utm_medium: text(row, &["utm_medium"]),
            utm_campaign: text(row, &["utm_campaign"]),
            utm_content: text(row, &["utm_content"]),
            utm_term: text(row, &["utm_term"]),
        }
    }
}

/// First non-empty cell among the header aliases, trimmed. Numbers and
/// booleans stringify; anything else is an empty string.
fn text(row: &RawRow, keys: &[&str]) -> String {
    for key in keys {
        let value = match row.get(*key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        };
        if !value.is_empty() {
            return value;
        }
    }
    String::new()
}

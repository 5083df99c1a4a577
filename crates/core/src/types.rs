use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Event types that count as a conversion in funnel computations.
/// Matched case-insensitively; the set is closed.
pub const CONVERSION_EVENT_TYPES: [&str; 6] = [
    "payment",
    "payment_success",
    "paid",
    "converted",
    "completed",
    "transaction_success",
];

/// Whether an event type belongs to the conversion set.
pub fn is_conversion_event(event_type: &str) -> bool {
    let folded = event_type.trim().to_ascii_lowercase();
    CONVERSION_EVENT_TYPES.contains(&folded.as_str())
}

/// Storage tier that served a write or query. Reported back to callers so a
/// volatile write is never mistaken for a durable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    Durable,
    Embedded,
    Volatile,
}

impl StorageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Durable => "durable",
            StorageTier::Embedded => "embedded",
            StorageTier::Volatile => "volatile",
        }
    }
}

impl std::fmt::Display for StorageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded behavioral event. Append-only: created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Server-assigned, monotonically increasing within a process.
    pub id: i64,
    pub event_type: String,
    /// Correlation key grouping events for one prospective customer.
    pub inquiry_id: Option<String>,
    pub session_id: Option<String>,
    pub course: Option<String>,
    /// Caller-supplied occurrence time. Not necessarily monotonic.
    pub timestamp: DateTime<Utc>,
    /// Opaque payload, stored serialized.
    pub metadata: Option<serde_json::Value>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    /// Server-assigned ingestion time.
    pub created_at: DateTime<Utc>,
}

/// Ingestion payload for one event. Optional fields are stored as NULLs,
/// never rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub inquiry_id: Option<String>,
    pub session_id: Option<String>,
    pub course: Option<String>,
    /// Occurrence time; defaults to ingestion time when absent.
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

/// Lead/payment status, case-folded once at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Paid,
    Pending,
    Failed,
    Canceled,
}

impl LeadStatus {
    /// Parse a raw spreadsheet value. Unrecognized or missing values default
    /// to `Pending`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paid" => LeadStatus::Paid,
            "failed" => LeadStatus::Failed,
            "canceled" | "cancelled" => LeadStatus::Canceled,
            _ => LeadStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Paid => "paid",
            LeadStatus::Pending => "pending",
            LeadStatus::Failed => "failed",
            LeadStatus::Canceled => "canceled",
        }
    }
}

/// Payment method. The source data is not a closed enum; raw values are
/// matched by substring/alias and anything unrecognized lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashPlus,
    Card,
    Cash,
    BankTransfer,
    Other,
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Self {
        let folded = raw.trim().to_ascii_lowercase();
        if folded.is_empty() {
            return PaymentMethod::Other;
        }
        // "cashplus" must be checked before the bare "cash" substring.
        if folded.contains("cashplus") || folded.contains("cash plus") {
            PaymentMethod::CashPlus
        } else if folded.contains("card") || folded.contains("visa") || folded.contains("cb") {
            PaymentMethod::Card
        } else if folded.contains("bank") || folded.contains("transfer") || folded.contains("virement") {
            PaymentMethod::BankTransfer
        } else if folded.contains("cash") || folded.contains("espece") || folded.contains("espèce") {
            PaymentMethod::Cash
        } else {
            PaymentMethod::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashPlus => "cashplus",
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Other => "other",
        }
    }
}

/// One normalized lead/payment row from the external ledger.
///
/// Only the Ledger Reader constructs these; normalization (course mapping,
/// status/method folding, numeric/date coercion) happens exactly once there,
/// so every downstream consumer compares with plain equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Parsed row timestamp; `None` when the raw value was unparseable.
    pub timestamp: Option<DateTime<Utc>>,
    pub inquiry_id: String,
    pub transaction_id: String,
    pub status: LeadStatus,
    pub payment_method: PaymentMethod,
    /// Amount in MAD; 0.0 when the raw value failed to parse.
    pub amount: f64,
    pub final_amount: f64,
    /// Raw course text as entered in the sheet.
    pub course: String,
    /// Canonical course bucket derived from `course`.
    pub normalized_course: String,
    /// Lowercased two-letter code (ar/fr/en).
    pub language: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub utm_content: String,
    pub utm_term: String,
}

/// Caller-supplied filter criteria. An absent field means "no constraint",
/// never "match empty".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Inclusive start date (expanded to 00:00:00).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    /// Inclusive end date (expanded to 23:59:59).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inquiry_id: Option<String>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.course.is_none()
            && self.payment_method.is_none()
            && self.language.is_none()
            && self.utm_campaign.is_none()
            && self.event_type.is_none()
            && self.inquiry_id.is_none()
    }

    /// Inclusive lower bound as a UTC instant.
    pub fn start_bound(&self) -> Option<DateTime<Utc>> {
        self.start
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// Inclusive upper bound (end of day) as a UTC instant.
    pub fn end_bound(&self) -> Option<DateTime<Utc>> {
        self.end
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .map(|dt| dt.and_utc())
    }

    /// Deterministic cache key. Struct field order is fixed, so two
    /// logically identical filters always serialize identically.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

//! Pure normalization rules for raw spreadsheet values. Applied exactly once
//! at ingestion; every downstream consumer compares with plain equality.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Map free-text course names onto the canonical set. Unrecognized non-empty
/// values pass through trimmed, so the function is idempotent.
pub fn normalize_course(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "Other".to_string();
    }
    let folded = trimmed.to_lowercase();
    if folded.contains("pmp") {
        "PMP".to_string()
    } else if folded.contains("planning") {
        "Planning".to_string()
    } else if folded.contains("qse") {
        "QSE".to_string()
    } else if folded.contains("soft") {
        "Soft Skills".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a spreadsheet date cell. Accepts RFC 3339 plus the formats the
/// sheet exports produce; anything else is `None` — never "now".
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Parse an amount cell in MAD. Tolerates thousands separators, a decimal
/// comma, and currency suffixes; malformed values coerce to `0.0`.
pub fn parse_amount(raw: &str) -> f64 {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.contains('.') {
        // "4,500.00" — the comma is a thousands separator.
        cleaned.retain(|c| c != ',');
    } else {
        // "4500,00" — the comma is the decimal mark.
        cleaned = cleaned.replace(',', ".");
    }
    cleaned.parse().unwrap_or(0.0)
}

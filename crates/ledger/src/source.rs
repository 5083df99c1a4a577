//! The spreadsheet collaborator boundary. Rows arrive schema-less, keyed by
//! header name; everything past this trait is typed.

use async_trait::async_trait;
use leadpulse_core::{LeadPulseError, LeadPulseResult};
use std::time::Duration;
use tracing::debug;

/// One raw spreadsheet row: column header -> cell value.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// External source of lead/payment rows.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Fetch the current row set. An unreachable collaborator is an
    /// `Upstream` error; no partial row set is ever returned.
    async fn fetch_rows(&self) -> LeadPulseResult<Vec<RawRow>>;
}

/// Fetches rows from the JSON row-array endpoint the sheet collaborator
/// exposes (an Apps Script web app in the reference deployment).
pub struct HttpLedgerSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLedgerSource {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> LeadPulseResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LeadPulseError::Upstream(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl LedgerSource for HttpLedgerSource {
    async fn fetch_rows(&self) -> LeadPulseResult<Vec<RawRow>> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LeadPulseError::Upstream(e.to_string()))?;

        let rows: Vec<RawRow> = response
            .json()
            .await
            .map_err(|e| LeadPulseError::Upstream(format!("unusable ledger payload: {e}")))?;

        debug!(rows = rows.len(), "Fetched ledger rows");
        Ok(rows)
    }
}

/// Fixed in-memory row set — the collaborator double for tests and offline
/// tooling.
pub struct FixtureSource {
    rows: Vec<RawRow>,
}

impl FixtureSource {
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }
}

#[async_trait]
impl LedgerSource for FixtureSource {
    async fn fetch_rows(&self) -> LeadPulseResult<Vec<RawRow>> {
        Ok(self.rows.clone())
    }
}

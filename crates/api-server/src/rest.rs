//! REST handlers for event ingestion and analytics queries.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use leadpulse_analytics::{AnalyticsEngine, CampaignRollup, SummaryReport, TimeSeriesMetric, TimeSeriesResponse};
use leadpulse_core::types::{Event, FilterSpec, NewEvent};
use leadpulse_core::LeadPulseError;
use leadpulse_event_store::EventQuery;
use leadpulse_ledger::normalize::parse_date;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Maximum string field length (event type, inquiry id, etc.).
const MAX_FIELD_LEN: usize = 256;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalyticsEngine>,
    pub node_id: String,
    pub start_time: Instant,
    pub default_query_limit: usize,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn validation_error(message: impl Into<String>) -> ApiError {
    let message = message.into();
    metrics::counter!("api.validation_errors").increment(1);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "validation_error".to_string(),
            message,
        }),
    )
}

/// Map engine errors onto the wire. Validation is the caller's fault,
/// upstream means the ledger collaborator, everything else is internal.
fn engine_error(e: LeadPulseError) -> ApiError {
    let (status, code) = match &e {
        LeadPulseError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        LeadPulseError::Upstream(_) => (StatusCode::BAD_GATEWAY, "ledger_unreachable"),
        LeadPulseError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    if status.is_server_error() {
        error!(error = %e, "Request failed");
    } else {
        warn!(error = %e, "Request rejected");
    }
    metrics::counter!("api.errors").increment(1);
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: e.to_string(),
        }),
    )
}

/// `YYYY-MM-DD`, or a validation error naming the field.
fn parse_day(field: &str, raw: &Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| validation_error(format!("'{field}' must be YYYY-MM-DD, got '{s}'"))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// ─── Event ingestion ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    pub event_type: Option<String>,
    pub inquiry_id: Option<String>,
    pub session_id: Option<String>,
    pub course: Option<String>,
    /// ISO-8601 occurrence time; absent or unparseable values silently
    /// default to ingestion time.
    pub timestamp: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

#[derive(Serialize)]
pub struct IngestEventResponse {
    pub id: i64,
    /// Which storage tier served the write — volatile writes are at risk.
    pub persistence: String,
}

/// POST /v1/events — record one behavioral event.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(request): Json<IngestEventRequest>,
) -> Result<Json<IngestEventResponse>, ApiError> {
    let event_type = match non_empty(request.event_type) {
        Some(et) => et,
        None => return Err(validation_error("'event_type' must not be empty")),
    };
    if event_type.len() > MAX_FIELD_LEN {
        return Err(validation_error("'event_type' exceeds maximum length"));
    }

    let event = NewEvent {
        event_type,
        inquiry_id: non_empty(request.inquiry_id),
        session_id: non_empty(request.session_id),
        course: non_empty(request.course),
        timestamp: request.timestamp.as_deref().and_then(parse_date),
        metadata: request.metadata,
        utm_source: non_empty(request.utm_source),
        utm_medium: non_empty(request.utm_medium),
        utm_campaign: non_empty(request.utm_campaign),
    };

    let store = state.engine.store();
    let id = store.append(event).await.map_err(engine_error)?;
    Ok(Json(IngestEventResponse {
        id,
        persistence: store.tier().to_string(),
    }))
}

// ─── Event query ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EventQueryParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub event_type: Option<String>,
    pub inquiry_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub persistence: String,
    pub events: Vec<Event>,
}

/// GET /v1/events — matching events, newest first.
pub async fn query_events(
    State(state): State<AppState>,
    Query(params): Query<EventQueryParams>,
) -> Result<Json<EventsResponse>, ApiError> {
    let start = parse_day("start", &params.start)?;
    let end = parse_day("end", &params.end)?;

    let query = EventQuery {
        event_type: non_empty(params.event_type),
        inquiry_id: non_empty(params.inquiry_id),
        start: start.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc()),
        end: end.and_then(|d| d.and_hms_opt(23, 59, 59)).map(|dt| dt.and_utc()),
        limit: Some(params.limit.unwrap_or(state.default_query_limit)),
    };

    let store = state.engine.store();
    let events = store.query(&query).await.map_err(engine_error)?;
    Ok(Json(EventsResponse {
        persistence: store.tier().to_string(),
        events,
    }))
}

// ─── Analytics ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub course: Option<String>,
    pub payment_method: Option<String>,
    pub language: Option<String>,
    pub utm_campaign: Option<String>,
}

impl SummaryParams {
    fn into_filter(self) -> Result<FilterSpec, ApiError> {
        Ok(FilterSpec {
            start: parse_day("start", &self.start)?,
            end: parse_day("end", &self.end)?,
            course: non_empty(self.course),
            payment_method: non_empty(self.payment_method),
            language: non_empty(self.language),
            utm_campaign: non_empty(self.utm_campaign),
            event_type: None,
            inquiry_id: None,
        })
    }
}

/// GET /v1/analytics/summary — KPIs, rollups, best-effort funnel.
pub async fn summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<SummaryReport>, ApiError> {
    let spec = params.into_filter()?;
    let report = state.engine.summary(&spec).await.map_err(engine_error)?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesParams {
    pub metric: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// GET /v1/analytics/timeseries — one day-bucketed series.
pub async fn timeseries(
    State(state): State<AppState>,
    Query(params): Query<TimeSeriesParams>,
) -> Result<Json<TimeSeriesResponse>, ApiError> {
    let Some(metric) = TimeSeriesMetric::parse(&params.metric) else {
        return Err(validation_error(format!(
            "unknown metric '{}' (expected daily_revenue, daily_inquiries, \
             daily_conversions or daily_funnel)",
            params.metric
        )));
    };
    let spec = FilterSpec {
        start: parse_day("start", &params.start)?,
        end: parse_day("end", &params.end)?,
        ..Default::default()
    };
    let response = state
        .engine
        .timeseries(metric, &spec)
        .await
        .map_err(engine_error)?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct AttributionParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// GET /v1/analytics/attribution — campaign rollups.
pub async fn attribution(
    State(state): State<AppState>,
    Query(params): Query<AttributionParams>,
) -> Result<Json<Vec<CampaignRollup>>, ApiError> {
    let spec = FilterSpec {
        start: parse_day("start", &params.start)?,
        end: parse_day("end", &params.end)?,
        ..Default::default()
    };
    let rollups = state
        .engine
        .attribution(&spec)
        .await
        .map_err(engine_error)?;
    Ok(Json(rollups))
}

// ─── Operational probes ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub persistence: String,
    pub uptime_secs: u64,
}

/// GET /health — health check with the active storage tier.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        persistence: state.engine.store().tier().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — readiness probe.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use transmute_core::{EventFilter, EventRecord};

use crate::state::AppState;

/// Maximum allowed limit for event queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for event queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the events endpoint
#[derive(Debug, Deserialize)]
pub struct EventQueryParams {
    pub request_id: Option<String>,
    /// e.g. `conversion_failed`
    pub event_type: Option<String>,
    pub caller: Option<String>,
    /// Events at or after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Events at or before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of events to return (default 100, max 1000)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventQueryResponse {
    pub events: Vec<EventRecord>,
    /// Total number of matching events, ignoring pagination
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct EventErrorResponse {
    pub error: String,
}

type EventQueryError = (StatusCode, Json<EventErrorResponse>);

fn query_error(status: StatusCode, error: String) -> EventQueryError {
    (status, Json(EventErrorResponse { error }))
}

/// Query persisted conversion events, newest first
pub async fn query_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventQueryParams>,
) -> Result<Json<EventQueryResponse>, EventQueryError> {
    let store = state.event_store().ok_or_else(|| {
        query_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Event persistence is disabled".to_string(),
        )
    })?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut base_filter = EventFilter::new();
    if let Some(ref request_id) = params.request_id {
        base_filter = base_filter.with_request_id(request_id);
    }
    if let Some(ref event_type) = params.event_type {
        base_filter = base_filter.with_event_type(event_type);
    }
    if let Some(ref caller) = params.caller {
        base_filter = base_filter.with_caller(caller);
    }
    if params.from.is_some() || params.to.is_some() {
        base_filter = base_filter.with_time_range(params.from, params.to);
    }

    let query_filter = base_filter.clone().with_limit(limit).with_offset(offset);

    let events = store.query(&query_filter).map_err(|e| {
        query_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to query events: {}", e),
        )
    })?;

    let total = store.count(&base_filter).map_err(|e| {
        query_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to count events: {}", e),
        )
    })?;

    Ok(Json(EventQueryResponse {
        events,
        total,
        limit,
        offset,
    }))
}

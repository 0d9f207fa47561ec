//! REST API endpoints for the smartroom bridge.
//!
//! # Endpoints
//!
//! - `GET /api/health` - Service health and bus connection
//! - `GET /api/latest-data` - Latest stored sample, or `{}`
//! - `POST /api/output/{device}` - Switch an actuator (`{"status": 0|1}`)
//! - `GET /api/output` - Last known state of every actuator
//! - `GET /api/thresholds` / `POST /api/thresholds` - Control thresholds
//! - `GET /api/activity` - Combined sample and actuator log, paginated
//!
//! # Lock Acquisition
//!
//! - **`state.store`** (Mutex): Held only for the duration of a query.
//! - Command handlers never hold the store lock while waiting for the broker.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]:
//! `{"success": false, "error": "..."}`. Invalid input maps to 400, a command
//! the broker did not accept to 502, an unacknowledged command to 504 and a
//! storage failure to 500.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime};

use smartroom_store::{ActivityFilter, ActivityPage, ActivityQuery, StatusFilter};
use smartroom_types::{ActuatorStates, Thresholds};

use crate::bus::PublishError;
use crate::dispatcher::CommandError;
use crate::state::AppState;

/// Largest page the activity endpoint returns.
pub const MAX_ACTIVITY_LIMIT: u32 = 500;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        // Sensor data
        .route("/api/latest-data", get(latest_data))
        .route("/api/activity", get(get_activity))
        // Commands
        .route("/api/output", get(get_outputs))
        .route("/api/output/{device}", post(set_output))
        .route("/api/thresholds", get(get_thresholds).post(set_thresholds))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Whether the bridge currently holds a broker connection.
    pub bus_connected: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        bus_connected: state.dispatcher.bus_connected(),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Latest stored sample, or an empty object before the first one.
async fn latest_data(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let latest = {
        let store = state.store.lock().await;
        store.latest_sample()?
    };

    let body = match latest {
        Some(sample) => {
            serde_json::to_value(sample).map_err(|e| AppError::Internal(e.to_string()))?
        }
        None => json!({}),
    };
    Ok(Json(body))
}

/// Switch an actuator.
///
/// The response only confirms that the broker accepted the command. The
/// resulting actuator event is recorded when the device echoes its status.
async fn set_output(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = body?;
    let status = body.get("status").unwrap_or(&Value::Null);
    let status = state.dispatcher.set_actuator(&device, status).await?;

    Ok(Json(json!({
        "success": true,
        "device": device,
        "status": status,
    })))
}

/// Last known state of every actuator.
async fn get_outputs(State(state): State<Arc<AppState>>) -> Json<ActuatorStates> {
    Json(state.dispatcher.actuator_states().await)
}

/// Current threshold pair.
async fn get_thresholds(State(state): State<Arc<AppState>>) -> Json<Thresholds> {
    Json(state.dispatcher.thresholds().await)
}

/// Replace the threshold pair and publish it.
async fn set_thresholds(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = body?;
    let thresholds = state.dispatcher.set_thresholds(&body).await?;

    Ok(Json(json!({
        "success": true,
        "thresholds": thresholds,
    })))
}

/// Query parameters for the activity log.
#[derive(Debug, Deserialize, Default)]
pub struct ActivityParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// RFC 3339 lower bound (inclusive).
    pub since: Option<String>,
    /// RFC 3339 upper bound (inclusive).
    pub until: Option<String>,
    /// First whole day (`YYYY-MM-DD`, UTC).
    pub start: Option<String>,
    /// Last whole day (`YYYY-MM-DD`, UTC).
    pub end: Option<String>,
    /// `all`, `sensor`, `rgb_led`, `minifan` or `auto`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// `all`, `on`, `off`, `detected` or `none`.
    pub status: Option<String>,
    pub keyword: Option<String>,
}

impl ActivityParams {
    /// Validate the parameters and build the store query.
    pub fn to_query(&self) -> Result<ActivityQuery, AppError> {
        let mut query = ActivityQuery::new();

        if let Some(page) = self.page {
            query = query.page(page);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit.min(MAX_ACTIVITY_LIMIT));
        }

        let since = match (&self.since, &self.start) {
            (Some(since), _) => Some(parse_timestamp("since", since)?),
            (None, Some(start)) => Some(start_of_day(parse_day("start", start)?)),
            (None, None) => None,
        };
        let until = match (&self.until, &self.end) {
            (Some(until), _) => Some(parse_timestamp("until", until)?),
            (None, Some(end)) => Some(end_of_day(parse_day("end", end)?)?),
            (None, None) => None,
        };

        if let (Some(since), Some(until)) = (since, until)
            && since > until
        {
            return Err(AppError::BadRequest(
                "Invalid time range: start must not be after end".to_string(),
            ));
        }
        if let Some(since) = since {
            query = query.since(since);
        }
        if let Some(until) = until {
            query = query.until(until);
        }

        if let Some(kind) = &self.kind {
            let kind = ActivityFilter::parse(kind)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid type: {}", kind)))?;
            query = query.kind(kind);
        }
        if let Some(status) = &self.status {
            let status = StatusFilter::parse(status)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid status: {}", status)))?;
            query = query.status(status);
        }
        if let Some(keyword) = &self.keyword {
            query = query.keyword(keyword.trim());
        }

        Ok(query)
    }
}

fn parse_timestamp(name: &str, value: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|_| AppError::BadRequest(format!("Invalid {}: {}", name, value)))
}

fn parse_day(name: &str, value: &str) -> Result<Date, AppError> {
    let invalid = || AppError::BadRequest(format!("Invalid {}: {}", name, value));

    let mut parts = value.splitn(3, '-');
    let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };

    let year = year.parse::<i32>().map_err(|_| invalid())?;
    let month = month
        .parse::<u8>()
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .ok_or_else(invalid)?;
    let day = day.parse::<u8>().map_err(|_| invalid())?;

    Date::from_calendar_date(year, month, day).map_err(|_| invalid())
}

fn start_of_day(date: Date) -> OffsetDateTime {
    date.midnight().assume_utc()
}

fn end_of_day(date: Date) -> Result<OffsetDateTime, AppError> {
    let next = date
        .next_day()
        .ok_or_else(|| AppError::BadRequest(format!("Invalid end: {}", date)))?;
    Ok(start_of_day(next) - time::Duration::milliseconds(1))
}

/// Combined activity log, newest first.
///
/// # Errors
///
/// - Returns [`AppError::BadRequest`] for unknown filters, unparseable dates or
///   a reversed time range
/// - Returns [`AppError::Store`] if the database query fails
async fn get_activity(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActivityParams>,
) -> Result<Json<ActivityPage>, AppError> {
    let query = params.to_query()?;

    let store = state.store.lock().await;
    let page = store.query_activity(&query)?;
    Ok(Json(page))
}

// ==========================================================================
// Error Handling
// ==========================================================================

/// API error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Command(CommandError),
    Store(smartroom_store::Error),
    Internal(String),
}

impl From<smartroom_store::Error> for AppError {
    fn from(e: smartroom_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::BadRequest(e.body_text())
    }
}

impl From<CommandError> for AppError {
    fn from(e: CommandError) -> Self {
        AppError::Command(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let mut failed = Vec::new();

        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Command(e) => {
                let status = match &e {
                    CommandError::InvalidDevice(_) | CommandError::Validation(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    CommandError::Publish(publish) if publish.is_timeout() => {
                        StatusCode::GATEWAY_TIMEOUT
                    }
                    CommandError::Publish(publish) => {
                        if let PublishError::Partial(_) = publish {
                            failed = publish.failed_topics();
                        }
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, e.to_string())
            }
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let mut body = json!({
            "success": false,
            "error": message,
        });
        if !failed.is_empty() {
            body["failed"] = failed.iter().map(|topic| Value::from(topic.feed())).collect();
        }

        (status, Json(body)).into_response()
    }
}

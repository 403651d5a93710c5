//! Dashboard Routes
//!
//! Read-only views of the live feeds.
//!
//! - GET /api/v1/reading - Current reading and health report
//! - GET /api/v1/alerts - Most recent alerts, newest first
//! - GET /api/v1/system - System info with derived liveness
//! - GET /api/v1/notification - Latest-notification banner
//! - GET /api/v1/history - Chart series for TDS and flow

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{
    AlertsResponse, HistoryResponse, NotificationResponse, ReadingResponse, SeriesResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::feeds::FeedState;
use crate::model::SystemInfo;

/// Unwrap a feed state, mapping loading and failure to 503
fn ready<T>(feed: &str, state: FeedState<T>) -> ApiResult<T> {
    match state {
        FeedState::Ready(value) => Ok(value),
        FeedState::Loading => Err(ApiError::ServiceUnavailable(format!(
            "{} feed is loading",
            feed
        ))),
        FeedState::Failed(e) => Err(ApiError::ServiceUnavailable(format!(
            "{} feed failed: {}",
            feed, e
        ))),
    }
}

/// GET /api/v1/reading
pub async fn get_reading(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReadingResponse>> {
    let current = ready("reading", state.session.reading_report())?;
    let (reading, health) = match current {
        Some((reading, report)) => (Some(reading), Some(report)),
        None => (None, None),
    };
    Ok(Json(ReadingResponse { reading, health }))
}

/// GET /api/v1/alerts
pub async fn get_alerts(State(state): State<Arc<AppState>>) -> ApiResult<Json<AlertsResponse>> {
    let alerts = ready("alerts", state.session.alerts())?;
    Ok(Json(AlertsResponse {
        total: alerts.len(),
        alerts,
    }))
}

/// GET /api/v1/system
pub async fn get_system(State(state): State<Arc<AppState>>) -> ApiResult<Json<SystemInfo>> {
    Ok(Json(ready("system", state.session.system())?))
}

/// GET /api/v1/notification
pub async fn get_notification(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<NotificationResponse>> {
    let notification = ready("notification", state.session.notification())?;
    Ok(Json(NotificationResponse { notification }))
}

/// GET /api/v1/history
pub async fn get_history(State(state): State<Arc<AppState>>) -> ApiResult<Json<HistoryResponse>> {
    let history = ready("history", state.session.history())?;
    Ok(Json(HistoryResponse {
        tds: SeriesResponse::from(&history.tds),
        flow: SeriesResponse::from(&history.flow),
    }))
}

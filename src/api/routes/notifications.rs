//! Notification Routes
//!
//! - GET /api/v1/notifications - Support and permission status
//! - GET /api/v1/notifications/preferences - Current preferences
//! - PUT /api/v1/notifications/preferences - Toggle the alert sound
//! - POST /api/v1/notifications/permission - Answer the permission prompt
//! - POST /api/v1/notifications/test - Send a test notification
//! - POST /api/v1/notifications/:tag/click - Click a shown notification
//! - POST /api/v1/push - Inbound push payload

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    ClickResponse, DeliveryResponse, PermissionRequest, PermissionResponse, PreferencesRequest,
};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::notify::{
    Delivery, Notification, NotificationStatus, Notifier, PreferencesView, PushPayload,
};

/// GET /api/v1/notifications
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<NotificationStatus> {
    Json(state.adapter.status().await)
}

/// GET /api/v1/notifications/preferences
pub async fn get_preferences(State(state): State<Arc<AppState>>) -> Json<PreferencesView> {
    Json(state.preferences.view())
}

/// PUT /api/v1/notifications/preferences
pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreferencesRequest>,
) -> Json<PreferencesView> {
    state.preferences.set_sound_enabled(req.sound_enabled);
    Json(state.preferences.view())
}

/// POST /api/v1/notifications/permission
///
/// A denial is final; moving to granted sends the welcome notification.
pub async fn request_permission(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PermissionRequest>,
) -> ApiResult<Json<PermissionResponse>> {
    let permission = state.adapter.request_permission(req.permission).await;
    Ok(Json(PermissionResponse {
        permission,
        status: state.adapter.status().await,
    }))
}

/// POST /api/v1/notifications/test
pub async fn send_test(State(state): State<Arc<AppState>>) -> Json<DeliveryResponse> {
    let delivery = state.adapter.send_test().await;
    Json(DeliveryResponse {
        tag: Notification::test().tag,
        delivery,
    })
}

/// POST /api/v1/notifications/:tag/click
pub async fn click(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Json<ClickResponse> {
    Json(state.foreground.click(&tag, None).await.into())
}

/// POST /api/v1/push
///
/// Accepts a JSON payload merged over defaults, or plain text used as the
/// body. Shown on connected dashboards when notifications are enabled.
pub async fn receive_push(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Json<DeliveryResponse> {
    let notification = PushPayload::parse(&body).into_notification();

    let delivery = if state.adapter.status().await.enabled {
        state.foreground.try_send(&notification).await
    } else {
        Delivery::Skipped("permission not granted".to_string())
    };
    tracing::info!(tag = %notification.tag, ?delivery, "Push payload received");

    Json(DeliveryResponse {
        tag: notification.tag,
        delivery,
    })
}

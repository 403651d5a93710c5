//! Water Monitor REST API
//!
//! HTTP API layer for the monitor, built with Axum.
//!
//! # Endpoints
//!
//! ## Dashboard
//! - `GET /api/v1/reading` - Current reading with health report
//! - `GET /api/v1/alerts` - Most recent alerts
//! - `GET /api/v1/system` - System info and liveness
//! - `GET /api/v1/notification` - Latest-notification banner
//! - `GET /api/v1/history` - Chart series
//!
//! ## Settings
//! - `PUT /api/v1/settings` - Write the expected flow rate
//!
//! ## Notifications
//! - `GET /api/v1/notifications` - Support and permission status
//! - `GET /api/v1/notifications/preferences` - Preferences
//! - `PUT /api/v1/notifications/preferences` - Update preferences
//! - `POST /api/v1/notifications/permission` - Answer the permission prompt
//! - `POST /api/v1/notifications/test` - Send a test notification
//! - `POST /api/v1/notifications/:tag/click` - Click a notification
//! - `POST /api/v1/push` - Inbound push payload
//! - `POST /api/v1/sync/:tag` - Background sync
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Real-time feed, notification and health streaming
//!
//! # Example
//!
//! ```rust,ignore
//! use water_monitor::api::{serve, AppParts, AppState};
//! use water_monitor::clock::SystemClock;
//! use water_monitor::config::Config;
//! use water_monitor::store::{FirebaseStore, StorePtr};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let store: StorePtr = Arc::new(FirebaseStore::new(config.store.firebase())?);
//!     let parts = AppParts::start(&config, store, Arc::new(SystemClock)).await?;
//!
//!     serve(AppState::new(parts, config.api.clone()), &config.api).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use crate::config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use state::{AppParts, AppState, StartupError};

use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let api_routes = Router::new()
        // Dashboard routes
        .route("/reading", get(routes::dashboard::get_reading))
        .route("/alerts", get(routes::dashboard::get_alerts))
        .route("/system", get(routes::dashboard::get_system))
        .route("/notification", get(routes::dashboard::get_notification))
        .route("/history", get(routes::dashboard::get_history))
        // Settings routes
        .route("/settings", put(routes::settings::update_settings))
        // Notification routes
        .route("/notifications", get(routes::notifications::get_status))
        .route(
            "/notifications/preferences",
            get(routes::notifications::get_preferences)
                .put(routes::notifications::update_preferences),
        )
        .route(
            "/notifications/permission",
            post(routes::notifications::request_permission),
        )
        .route("/notifications/test", post(routes::notifications::send_test))
        .route("/notifications/:tag/click", post(routes::notifications::click))
        .route("/push", post(routes::notifications::receive_push))
        // Background sync
        .route("/sync/:tag", post(routes::sync::trigger_sync));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Permissive without configured origins, otherwise only those origins
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Water monitor API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Water monitor API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::alerting::{CommandSound, Escalation, Silent, SoundPtr, TerminalBell};
use crate::clock::Clock;
use crate::config::{AlertingConfig, ApiConfig, Config, SoundBackend};
use crate::monitor::{MonitorSession, SessionOptions};
use crate::notify::{
    DeliveryAdapter, ForegroundNotifier, NotificationPreferences, NotifierPtr, WebPushAgent,
    WebPushConfig,
};
use crate::settings::SettingsWriter;
use crate::store::{StoreError, StorePtr};
use crate::websocket::{ConnectionHub, HubConfig};

/// Shared application state for all handlers
pub struct AppState {
    /// Running monitor session with every feed
    pub session: Arc<MonitorSession>,
    /// WebSocket connection hub for dashboards
    pub hub: ConnectionHub,
    /// Foreground surface, also handles clicks
    pub foreground: Arc<ForegroundNotifier>,
    /// Permission-gated delivery
    pub adapter: Arc<DeliveryAdapter>,
    pub preferences: Arc<NotificationPreferences>,
    /// The expected flow write
    pub settings: Arc<SettingsWriter>,
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

/// Everything the API needs from a running monitor
pub struct AppParts {
    pub session: Arc<MonitorSession>,
    pub hub: ConnectionHub,
    pub foreground: Arc<ForegroundNotifier>,
    pub adapter: Arc<DeliveryAdapter>,
    pub preferences: Arc<NotificationPreferences>,
    pub settings: Arc<SettingsWriter>,
}

/// Errors while wiring a session together
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to start monitor session: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to build push client: {0}")]
    PushClient(#[from] reqwest::Error),
}

impl AppParts {
    /// Wire delivery, alerting and feeds from `config` and start the session
    pub async fn start(
        config: &Config,
        store: StorePtr,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StartupError> {
        let hub = ConnectionHub::new(HubConfig {
            max_connections: config.api.max_ws_connections,
            ..HubConfig::default()
        });

        let notifications = &config.notifications;
        let foreground = Arc::new(ForegroundNotifier::new(
            hub.clone(),
            Duration::from_secs(notifications.auto_dismiss_secs),
        ));

        let agent = WebPushAgent::new(WebPushConfig {
            enabled: notifications.push.enabled,
            endpoint: notifications.push.endpoint.clone(),
            auth_token: notifications.push.auth_token.clone(),
            request_timeout_ms: notifications.push.request_timeout_ms,
            max_retries: notifications.push.max_retries,
        })?;
        let background: Option<NotifierPtr> = if agent.is_active() {
            tracing::info!(endpoint = %notifications.push.endpoint, "Background push agent active");
            Some(Arc::new(agent))
        } else {
            None
        };

        let adapter = Arc::new(DeliveryAdapter::new(
            notifications.supported,
            notifications.permission,
            foreground.clone(),
            background,
        ));
        let preferences = Arc::new(NotificationPreferences::new(notifications.sound_enabled));
        let escalation = Escalation::new(
            adapter.clone(),
            sound_for(&config.alerting),
            preferences.clone(),
        );

        let settings = Arc::new(SettingsWriter::new(
            store.clone(),
            config.paths.system.as_str(),
            clock.clone(),
        ));

        let session = MonitorSession::start(
            store,
            SessionOptions::from_config(config),
            escalation,
            hub.clone(),
            clock,
        )
        .await?;

        Ok(Self {
            session: Arc::new(session),
            hub,
            foreground,
            adapter,
            preferences,
            settings,
        })
    }
}

/// Pick the alert sound backend
fn sound_for(config: &AlertingConfig) -> SoundPtr {
    match config.sound {
        SoundBackend::Bell => Arc::new(TerminalBell),
        SoundBackend::None => Arc::new(Silent),
        SoundBackend::Command => match config.sound_command.split_first() {
            Some((program, args)) => Arc::new(CommandSound::new(program.clone(), args.to_vec())),
            None => {
                tracing::warn!("sound = \"command\" without sound_command, using the terminal bell");
                Arc::new(TerminalBell)
            }
        },
    }
}

impl AppState {
    pub fn new(parts: AppParts, config: ApiConfig) -> Self {
        Self {
            session: parts.session,
            hub: parts.hub,
            foreground: parts.foreground,
            adapter: parts.adapter,
            preferences: parts.preferences,
            settings: parts.settings,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn ws_connection_count(&self) -> usize {
        self.hub.connection_count().await
    }
}

//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `WATER_MONITOR_*` environment overrides.
//! Endpoint, project and credential values are passed through untouched.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::notify::Permission;
use crate::status::Thresholds;
use crate::store::FirebaseConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub feeds: FeedsConfig,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub alerting: AlertingConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Firebase,
    /// In-process store, for demos and local testing
    Memory,
}

/// Realtime database connection
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Project identifier, informational only
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_store_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_database_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_store_timeout() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_backoff() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: default_database_url(),
            project_id: None,
            auth_token: None,
            request_timeout_ms: default_store_timeout(),
            max_retries: default_max_retries(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl StoreConfig {
    pub fn firebase(&self) -> FirebaseConfig {
        FirebaseConfig {
            database_url: self.database_url.clone(),
            auth_token: self.auth_token.clone(),
            request_timeout_ms: self.request_timeout_ms,
            max_retries: self.max_retries,
            max_backoff_secs: self.max_backoff_secs,
        }
    }
}

/// Store paths the monitor reads and writes
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_current_reading_path")]
    pub current_reading: String,

    #[serde(default = "default_history_path")]
    pub history: String,

    #[serde(default = "default_alerts_path")]
    pub alerts: String,

    #[serde(default = "default_system_path")]
    pub system: String,

    #[serde(default = "default_latest_notification_path")]
    pub latest_notification: String,
}

fn default_current_reading_path() -> String {
    "readings/current".to_string()
}

fn default_history_path() -> String {
    "sensorData".to_string()
}

fn default_alerts_path() -> String {
    "alerts".to_string()
}

fn default_system_path() -> String {
    "system".to_string()
}

fn default_latest_notification_path() -> String {
    "notifications/latest".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            current_reading: default_current_reading_path(),
            history: default_history_path(),
            alerts: default_alerts_path(),
            system: default_system_path(),
            latest_notification: default_latest_notification_path(),
        }
    }
}

/// Feed windows and liveness
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    #[serde(default = "default_alert_limit")]
    pub alert_limit: usize,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Seconds without a system update before the device counts as offline
    #[serde(default = "default_offline_after")]
    pub offline_after_secs: i64,
}

fn default_alert_limit() -> usize {
    10
}

fn default_history_limit() -> usize {
    20
}

fn default_offline_after() -> i64 {
    60
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            alert_limit: default_alert_limit(),
            history_limit: default_history_limit(),
            offline_after_secs: default_offline_after(),
        }
    }
}

/// Sound backend for high-urgency alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SoundBackend {
    #[default]
    Bell,
    Command,
    None,
}

/// Alert escalation behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    /// Fire the reading-status trigger only when a critical status is entered
    #[serde(default = "default_true")]
    pub edge_triggered: bool,

    /// Notify the latest alert already present when the session starts
    #[serde(default = "default_true")]
    pub notify_existing_on_start: bool,

    #[serde(default)]
    pub sound: SoundBackend,

    /// Program and arguments for `sound = "command"`
    #[serde(default)]
    pub sound_command: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            edge_triggered: true,
            notify_existing_on_start: true,
            sound: SoundBackend::default(),
            sound_command: Vec::new(),
        }
    }
}

/// Notification delivery
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Whether the deployment can show notifications at all
    #[serde(default = "default_true")]
    pub supported: bool,

    /// Permission at startup
    #[serde(default)]
    pub permission: Permission,

    #[serde(default = "default_true")]
    pub sound_enabled: bool,

    #[serde(default = "default_auto_dismiss")]
    pub auto_dismiss_secs: u64,

    #[serde(default)]
    pub push: PushConfig,
}

fn default_auto_dismiss() -> u64 {
    10
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            supported: true,
            permission: Permission::default(),
            sound_enabled: true,
            auto_dismiss_secs: default_auto_dismiss(),
            push: PushConfig::default(),
        }
    }
}

/// Background push agent
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_push_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_push_timeout() -> u64 {
    5000
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            auth_token: None,
            request_timeout_ms: default_push_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_ws_connections")]
    pub max_ws_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_ws_connections() -> usize {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            request_timeout_secs: default_request_timeout(),
            max_ws_connections: default_max_ws_connections(),
        }
    }
}

impl ApiConfig {
    /// Socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("water-monitor").join("config.toml")),
            Some(PathBuf::from("/etc/water-monitor/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `WATER_MONITOR_*` overrides from `lookup`
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Store overrides
        if let Some(url) = lookup("WATER_MONITOR_DATABASE_URL") {
            self.store.database_url = url;
        }
        if let Some(token) = lookup("WATER_MONITOR_AUTH_TOKEN") {
            self.store.auth_token = Some(token);
        }
        if let Some(project) = lookup("WATER_MONITOR_PROJECT_ID") {
            self.store.project_id = Some(project);
        }
        match lookup("WATER_MONITOR_STORE_BACKEND").as_deref() {
            Some("memory") => self.store.backend = StoreBackend::Memory,
            Some("firebase") => self.store.backend = StoreBackend::Firebase,
            _ => {}
        }

        // API overrides
        if let Some(host) = lookup("WATER_MONITOR_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("WATER_MONITOR_API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }

        // Notification overrides
        if let Some(endpoint) = lookup("WATER_MONITOR_PUSH_ENDPOINT") {
            self.notifications.push.endpoint = endpoint;
            self.notifications.push.enabled = true;
        }

        // Logging overrides
        if let Some(level) = lookup("WATER_MONITOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("WATER_MONITOR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Water Monitor Configuration
#
# Environment variables override these settings:
# - WATER_MONITOR_DATABASE_URL
# - WATER_MONITOR_AUTH_TOKEN
# - WATER_MONITOR_PROJECT_ID
# - WATER_MONITOR_STORE_BACKEND
# - WATER_MONITOR_API_HOST
# - WATER_MONITOR_API_PORT
# - WATER_MONITOR_PUSH_ENDPOINT
# - WATER_MONITOR_LOG_LEVEL
# - WATER_MONITOR_LOG_FORMAT

[store]
# Backend: firebase or memory
backend = "firebase"

# Realtime database URL
database_url = "https://your-project-default-rtdb.firebaseio.com"

# project_id = "your-project"
# auth_token = ""

# Timeout for reads and writes (ms)
request_timeout_ms = 10000

# Write attempts before giving up
max_retries = 3

# Upper bound on the subscription reconnect delay (seconds)
max_backoff_secs = 30

[paths]
current_reading = "readings/current"
history = "sensorData"
alerts = "alerts"
system = "system"
latest_notification = "notifications/latest"

[feeds]
# Most recent alerts kept
alert_limit = 10

# Most recent history points charted
history_limit = 20

# Seconds without an update before the device is shown offline
offline_after_secs = 60

[thresholds]
# TDS range considered good (ppm, inclusive)
tds_min = 50.0
tds_max = 500.0

# Flow deviation limits (% of expected, inclusive)
flow_normal_pct = 10.0
flow_minor_pct = 20.0

[alerting]
# Notify critical device status only when it is entered
edge_triggered = true

# Notify the latest pre-existing alert at startup
notify_existing_on_start = true

# Sound for high-urgency alerts: bell, command or none
sound = "bell"
# sound_command = ["paplay", "/usr/share/sounds/freedesktop/stereo/alarm-clock-elapsed.oga"]

[notifications]
supported = true

# Permission at startup: default, granted or denied
permission = "default"

sound_enabled = true

# Foreground notifications close after this many seconds
auto_dismiss_secs = 10

[notifications.push]
# Background push agent
enabled = false
endpoint = ""
# auth_token = ""
request_timeout_ms = 5000
max_retries = 3

[api]
host = "0.0.0.0"
port = 8080
cors_origins = ["http://localhost:3000"]
request_timeout_secs = 30
max_ws_connections = 100

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/water-monitor/water-monitor.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.paths.current_reading, "readings/current");
        assert_eq!(config.paths.history, "sensorData");
        assert_eq!(config.feeds.alert_limit, 10);
        assert_eq!(config.feeds.history_limit, 20);
        assert_eq!(config.feeds.offline_after_secs, 60);
        assert!(config.alerting.edge_triggered);
        assert!(config.alerting.notify_existing_on_start);
        assert_eq!(config.notifications.permission, Permission::Default);
        assert_eq!(config.notifications.auto_dismiss_secs, 10);
        assert_eq!(config.thresholds, Thresholds::default());
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Firebase);
        assert_eq!(config.thresholds.tds_max, 500.0);
        assert_eq!(config.alerting.sound, SoundBackend::Bell);
        assert!(!config.notifications.push.enabled);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[store]
backend = "memory"

[alerting]
edge_triggered = false

[notifications]
permission = "granted"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(!config.alerting.edge_triggered);
        assert_eq!(config.notifications.permission, Permission::Granted);
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_load_errors() {
        let missing = Config::load(Path::new("/nonexistent/water-monitor.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store\nbackend = ").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("WATER_MONITOR_DATABASE_URL", "https://demo.firebaseio.com"),
            ("WATER_MONITOR_API_PORT", "9090"),
            ("WATER_MONITOR_STORE_BACKEND", "memory"),
            ("WATER_MONITOR_PUSH_ENDPOINT", "https://push.example.com/send"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.database_url, "https://demo.firebaseio.com");
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.notifications.push.enabled);
    }

    #[test]
    fn test_invalid_port_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "WATER_MONITOR_API_PORT").then(|| "nope".to_string()));
        assert_eq!(config.api.port, 8080);
    }
}

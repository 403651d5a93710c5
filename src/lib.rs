//! # Water Monitor
//!
//! Realtime sync and alerting core for a water-quality and leak-detection
//! sensor that writes into a hosted realtime database.
//!
//! ## Features
//!
//! - **Live feeds**: one subscription per store path, projected into typed state
//! - **Derived status**: TDS quality, flow deviation and drop-leak buckets
//! - **Alerting**: exactly one notification per new alert, edge-triggered
//!   device status escalation, optional alert sound
//! - **Delivery**: permission-gated, through a push endpoint or connected
//!   dashboards
//! - **Real-time**: WebSocket streaming for dashboards
//!
//! ## Modules
//!
//! - [`store`]: Realtime store trait with hosted and in-memory backends
//! - [`status`]: Pure status evaluation
//! - [`feeds`]: Subscription-backed state
//! - [`alerting`]: Deduplication and escalation
//! - [`notify`]: Notification delivery
//! - [`monitor`]: Session wiring
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use water_monitor::status::{evaluate, Thresholds};
//! use water_monitor::model::{DeviceStatus, Reading};
//!
//! let reading = Reading {
//!     tds: 620.0,
//!     flow_rate: 5.0,
//!     expected_flow: 5.0,
//!     total_volume: 12.5,
//!     timestamp: 1_700_000_000,
//!     status: DeviceStatus::Normal,
//!     drop_leakage: false,
//! };
//!
//! let report = evaluate(&reading, &Thresholds::default());
//! println!("{} (diverges: {})", report.quality.label(), report.is_divergent());
//! ```

pub mod alerting;
pub mod api;
pub mod clock;
pub mod config;
pub mod feeds;
pub mod model;
pub mod monitor;
pub mod notify;
pub mod settings;
pub mod status;
pub mod store;
pub mod websocket;

// Re-export commonly used types
pub use alerting::{AlertEngine, AlertOutcome, StatusTrigger, Urgency};

pub use api::{build_router, serve, ApiError, AppParts, AppState};

pub use clock::{Clock, ManualClock, SystemClock};

pub use config::{generate_default_config, Config, ConfigError};

pub use feeds::{Feed, FeedState};

pub use model::{Alert, DeviceStatus, LatestNotification, Reading, SystemInfo};

pub use monitor::{MonitorSession, SessionOptions};

pub use notify::{DeliveryAdapter, Notification, Permission};

pub use settings::{SettingsError, SettingsWriter};

pub use status::{evaluate, HealthReport, Thresholds};

pub use store::{FirebaseStore, MemoryStore, RealtimeStore, StoreError, StorePath, StorePtr};

pub use websocket::{ConnectionHub, ServerMessage, WsEvent};

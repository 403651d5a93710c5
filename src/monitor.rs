//! Monitor session
//!
//! Wires the store, feeds, alerting and dashboard hub into one running
//! session:
//!
//! - one task per feed subscription, each owning its cache
//! - one bridge task per feed forwarding state changes to `feeds.{name}`
//! - a health task evaluating every reading and publishing on `health`
//! - one alerting task that consumes the alert and reading subscriptions
//!   through a single `select!` loop, so engine state is never shared
//! - one delivery task draining a bounded queue of notifications, so a slow
//!   notifier never stalls the alerting loop

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::alerting::{
    AlertEngine, AlertOutcome, Escalation, Observation, PendingAlert, PendingStatus,
    StatusObservation, StatusTrigger,
};
use crate::clock::Clock;
use crate::config::{Config, FeedsConfig, PathsConfig};
use crate::feeds::{
    alerts_in_collection_order, AlertsFeed, Feed, FeedState, HistoryFeed, NotificationFeed,
    ReadingFeed, ReadingHistory, SystemFeed,
};
use crate::model::{Alert, LatestNotification, Reading, SystemInfo};
use crate::notify::Delivery;
use crate::status::{evaluate, HealthReport, Thresholds};
use crate::store::{
    QuerySpec, Snapshot, SnapshotEvent, StoreError, StorePath, StorePtr, StoreResult,
    Subscription,
};
use crate::websocket::{ConnectionHub, WsEvent};

/// Everything a session needs from configuration
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub paths: PathsConfig,
    pub feeds: FeedsConfig,
    pub thresholds: Thresholds,
    pub edge_triggered: bool,
    pub notify_existing_on_start: bool,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            feeds: config.feeds.clone(),
            thresholds: config.thresholds,
            edge_triggered: config.alerting.edge_triggered,
            notify_existing_on_start: config.alerting.notify_existing_on_start,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Alerting task is not running")]
    Stopped,
}

/// Background-sync tag that re-reads the alert collection
pub const SYNC_ALERTS_TAG: &str = "sync-alerts";

/// Notifications waiting for delivery before new ones are dropped
const DELIVERY_QUEUE: usize = 32;

type ResyncReply = oneshot::Sender<StoreResult<AlertOutcome>>;

enum AlertCommand {
    Resync(ResyncReply),
}

enum DeliveryJob {
    Alert {
        pending: PendingAlert,
        reply: Option<ResyncReply>,
    },
    Status(PendingStatus),
}

impl DeliveryJob {
    fn tag(&self) -> &str {
        match self {
            DeliveryJob::Alert { pending, .. } => &pending.notification.tag,
            DeliveryJob::Status(pending) => &pending.notification.tag,
        }
    }

    /// Drop the job, answering a waiting resync with the failure
    fn reject(self, reason: &str) {
        tracing::warn!(tag = %self.tag(), reason, "Notification dropped");
        if let DeliveryJob::Alert {
            pending,
            reply: Some(reply),
        } = self
        {
            let _ = reply.send(Ok(AlertOutcome::Dispatched {
                id: pending.id,
                urgency: pending.urgency,
                delivery: Delivery::Failed(reason.to_string()),
                sounded: false,
            }));
        }
    }
}

/// Per-feed readiness, as reported by the health endpoints
#[derive(Debug, Clone, Serialize)]
pub struct FeedHealth {
    pub feed: &'static str,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeedHealth {
    fn of<T>(feed: &'static str, state: &FeedState<T>) -> Self {
        let (label, error) = match state {
            FeedState::Loading => ("loading", None),
            FeedState::Ready(_) => ("ready", None),
            FeedState::Failed(e) => ("failed", Some(e.clone())),
        };
        Self {
            feed,
            state: label,
            error,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// A running monitor session
pub struct MonitorSession {
    reading: Feed<Option<Reading>>,
    alerts: Feed<Vec<Alert>>,
    system: Feed<SystemInfo>,
    notification: Feed<Option<LatestNotification>>,
    history: Feed<ReadingHistory>,
    thresholds: Thresholds,
    commands: mpsc::UnboundedSender<AlertCommand>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorSession {
    /// Activate every feed and start the alerting task
    pub async fn start(
        store: StorePtr,
        options: SessionOptions,
        escalation: Escalation,
        hub: ConnectionHub,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let paths = &options.paths;
        tracing::info!(store = store.name(), "Starting monitor session");

        let reading = Feed::activate(
            store.clone(),
            ReadingFeed::new(paths.current_reading.as_str()),
        )
        .await?;
        let alerts = Feed::activate(
            store.clone(),
            AlertsFeed::new(paths.alerts.as_str(), options.feeds.alert_limit),
        )
        .await?;
        let system = Feed::activate(
            store.clone(),
            SystemFeed::new(paths.system.as_str(), clock.clone(), options.feeds.offline_after_secs),
        )
        .await?;
        let notification = Feed::activate(
            store.clone(),
            NotificationFeed::new(paths.latest_notification.as_str(), clock),
        )
        .await?;
        let history = Feed::activate(
            store.clone(),
            HistoryFeed::new(paths.history.as_str(), options.feeds.history_limit),
        )
        .await?;

        let mut tasks = vec![
            spawn_bridge(reading.name(), reading.watch(), hub.clone()),
            spawn_bridge(alerts.name(), alerts.watch(), hub.clone()),
            spawn_bridge(system.name(), system.watch(), hub.clone()),
            spawn_bridge(notification.name(), notification.watch(), hub.clone()),
            spawn_bridge(history.name(), history.watch(), hub.clone()),
            spawn_health(reading.watch(), options.thresholds, hub),
        ];

        let (deliveries, delivery_rx) = mpsc::channel(DELIVERY_QUEUE);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let alerting =
            AlertingTask::start(store, &options, escalation.clone(), command_rx, deliveries)
                .await?;
        tasks.push(tokio::spawn(alerting.run()));
        tasks.push(spawn_delivery(escalation, delivery_rx));

        Ok(Self {
            reading,
            alerts,
            system,
            notification,
            history,
            thresholds: options.thresholds,
            commands,
            tasks,
        })
    }

    pub fn reading(&self) -> FeedState<Option<Reading>> {
        self.reading.state()
    }

    /// Current reading together with its health report
    pub fn reading_report(&self) -> FeedState<Option<(Reading, HealthReport)>> {
        match self.reading.state() {
            FeedState::Ready(Some(reading)) => {
                let report = evaluate(&reading, &self.thresholds);
                FeedState::Ready(Some((reading, report)))
            }
            FeedState::Ready(None) => FeedState::Ready(None),
            FeedState::Loading => FeedState::Loading,
            FeedState::Failed(e) => FeedState::Failed(e),
        }
    }

    pub fn alerts(&self) -> FeedState<Vec<Alert>> {
        self.alerts.state()
    }

    pub fn system(&self) -> FeedState<SystemInfo> {
        self.system.state()
    }

    pub fn notification(&self) -> FeedState<Option<LatestNotification>> {
        self.notification.state()
    }

    pub fn history(&self) -> FeedState<ReadingHistory> {
        self.history.state()
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn feed_health(&self) -> Vec<FeedHealth> {
        vec![
            FeedHealth::of(self.reading.name(), &self.reading.state()),
            FeedHealth::of(self.alerts.name(), &self.alerts.state()),
            FeedHealth::of(self.system.name(), &self.system.state()),
            FeedHealth::of(self.notification.name(), &self.notification.state()),
            FeedHealth::of(self.history.name(), &self.history.state()),
        ]
    }

    /// Re-read the alert collection once and run it through the engine
    pub async fn resync_alerts(&self) -> Result<AlertOutcome, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(AlertCommand::Resync(reply))
            .map_err(|_| SessionError::Stopped)?;
        let outcome = response.await.map_err(|_| SessionError::Stopped)??;
        Ok(outcome)
    }

    /// Stop every feed and task. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.reading.deactivate();
        self.alerts.deactivate();
        self.system.deactivate();
        self.notification.deactivate();
        self.history.deactivate();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Forward every state replacement of a feed to its hub topic
fn spawn_bridge<T>(
    feed: &'static str,
    mut rx: watch::Receiver<FeedState<T>>,
    hub: ConnectionHub,
) -> JoinHandle<()>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            match serde_json::to_value(&state) {
                Ok(value) => {
                    hub.broadcast(&WsEvent::feed_update(feed, value)).await;
                }
                Err(e) => tracing::error!(feed, error = %e, "Failed to encode feed state"),
            }
        }
    })
}

/// Evaluate every reading, warning on device/client divergence
fn spawn_health(
    mut rx: watch::Receiver<FeedState<Option<Reading>>>,
    thresholds: Thresholds,
    hub: ConnectionHub,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let reading = match &*rx.borrow_and_update() {
                FeedState::Ready(Some(reading)) => reading.clone(),
                _ => continue,
            };
            let report = evaluate(&reading, &thresholds);
            if report.is_divergent() {
                tracing::warn!(
                    device_status = %report.device_status,
                    divergences = ?report.divergences,
                    "Device status disagrees with derived status"
                );
            }
            hub.broadcast(&WsEvent::health(report)).await;
        }
    })
}

/// Deliver queued notifications one at a time
fn spawn_delivery(escalation: Escalation, mut jobs: mpsc::Receiver<DeliveryJob>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            match job {
                DeliveryJob::Alert { pending, reply } => {
                    let outcome = pending.deliver(&escalation).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(outcome));
                    }
                }
                DeliveryJob::Status(pending) => {
                    pending.deliver(&escalation).await;
                }
            }
        }
        tracing::debug!("Delivery task stopped");
    })
}

enum Wake {
    Alerts(Option<SnapshotEvent>),
    Reading(Option<SnapshotEvent>),
    Command(Option<AlertCommand>),
}

/// Owns the alert engine and status trigger
struct AlertingTask {
    store: StorePtr,
    alerts_path: StorePath,
    alerts_query: QuerySpec,
    alerts: Subscription,
    readings: Subscription,
    engine: AlertEngine,
    trigger: StatusTrigger,
    commands: mpsc::UnboundedReceiver<AlertCommand>,
    deliveries: mpsc::Sender<DeliveryJob>,
}

impl AlertingTask {
    async fn start(
        store: StorePtr,
        options: &SessionOptions,
        escalation: Escalation,
        commands: mpsc::UnboundedReceiver<AlertCommand>,
        deliveries: mpsc::Sender<DeliveryJob>,
    ) -> StoreResult<Self> {
        let alerts_path = StorePath::new(&options.paths.alerts);
        let alerts_query = AlertsFeed::query_for(options.feeds.alert_limit);
        let alerts = store.subscribe(&alerts_path, alerts_query.clone()).await?;
        let readings = store
            .subscribe(&StorePath::new(&options.paths.current_reading), QuerySpec::all())
            .await?;

        Ok(Self {
            store,
            alerts_path,
            alerts_query,
            alerts,
            readings,
            engine: AlertEngine::new(escalation.clone())
                .notify_existing_on_start(options.notify_existing_on_start),
            trigger: StatusTrigger::new(escalation, options.edge_triggered),
            commands,
            deliveries,
        })
    }

    async fn run(mut self) {
        let mut alerts_open = true;
        let mut readings_open = true;

        loop {
            let wake = tokio::select! {
                event = self.alerts.next(), if alerts_open => Wake::Alerts(event),
                event = self.readings.next(), if readings_open => Wake::Reading(event),
                command = self.commands.recv() => Wake::Command(command),
            };

            match wake {
                Wake::Alerts(Some(SnapshotEvent::Value(snapshot))) => {
                    self.handle_alerts_snapshot(&snapshot);
                }
                Wake::Alerts(Some(SnapshotEvent::Error(e))) => {
                    tracing::warn!(error = %e, "Alert subscription error");
                }
                Wake::Alerts(None) => {
                    tracing::debug!("Alert subscription ended");
                    alerts_open = false;
                }
                Wake::Reading(Some(SnapshotEvent::Value(snapshot))) => {
                    self.handle_reading_snapshot(&snapshot);
                }
                Wake::Reading(Some(SnapshotEvent::Error(e))) => {
                    tracing::warn!(error = %e, "Reading subscription error");
                }
                Wake::Reading(None) => {
                    tracing::debug!("Reading subscription ended");
                    readings_open = false;
                }
                Wake::Command(Some(AlertCommand::Resync(reply))) => {
                    self.resync(reply).await;
                }
                Wake::Command(None) => break,
            }
        }
        tracing::debug!("Alerting task stopped");
    }

    fn handle_alerts_snapshot(&mut self, snapshot: &Snapshot) {
        let alerts = alerts_in_collection_order(snapshot);
        match self.engine.observe(&alerts) {
            Observation::Settled(outcome) => {
                tracing::debug!(?outcome, "Alerts snapshot handled");
            }
            Observation::Notify(pending) => {
                self.enqueue(DeliveryJob::Alert {
                    pending,
                    reply: None,
                });
            }
        }
    }

    fn handle_reading_snapshot(&mut self, snapshot: &Snapshot) {
        match snapshot.decode::<Reading>() {
            Ok(reading) => match self.trigger.observe(reading.as_ref()) {
                StatusObservation::Settled(outcome) => {
                    tracing::trace!(?outcome, "Reading snapshot handled");
                }
                StatusObservation::Fire(pending) => self.enqueue(DeliveryJob::Status(pending)),
            },
            Err(e) => tracing::warn!(error = %e, "Malformed reading snapshot"),
        }
    }

    async fn resync(&mut self, reply: ResyncReply) {
        let snapshot = match self.store.get(&self.alerts_path, &self.alerts_query).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let alerts = alerts_in_collection_order(&snapshot);
        match self.engine.observe(&alerts) {
            Observation::Settled(outcome) => {
                tracing::info!(?outcome, "Alerts resynced");
                let _ = reply.send(Ok(outcome));
            }
            Observation::Notify(pending) => {
                tracing::info!(alert_id = %pending.id, "Alerts resynced with a new alert");
                self.enqueue(DeliveryJob::Alert {
                    pending,
                    reply: Some(reply),
                });
            }
        }
    }

    /// Hand a notification to the delivery task without waiting on it
    fn enqueue(&self, job: DeliveryJob) {
        match self.deliveries.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => job.reject("delivery queue full"),
            Err(mpsc::error::TrySendError::Closed(job)) => job.reject("delivery task stopped"),
        }
    }
}

//! Hosted realtime database client
//!
//! REST client for the hosted database:
//!
//! - `GET  {url}/{path}.json` for point reads
//! - `PATCH {url}/{path}.json` for atomic multi-field updates
//! - `GET  {url}/{path}.json` with `Accept: text/event-stream` for
//!   subscriptions
//!
//! Each subscription owns a background task that mirrors the streamed tree
//! locally and emits a full snapshot whenever it changes. Transient failures
//! emit an error event and reconnect with backoff; rules denials and revoked
//! credentials end the subscription with an error event.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::{StoreError, StoreResult};
use super::sse::{SseDecoder, StreamEvent};
use super::tree;
use super::{QuerySpec, RealtimeStore, Snapshot, SnapshotEvent, StorePath, Subscription};

/// Connection settings for the hosted database
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Database base URL (e.g., "https://my-project-default-rtdb.firebaseio.com")
    pub database_url: String,
    /// Database secret or ID token, sent as the `auth` query parameter
    pub auth_token: Option<String>,
    /// Timeout for point reads and writes in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum attempts for a write
    pub max_retries: u32,
    /// Upper bound on the reconnect delay for subscriptions
    pub max_backoff_secs: u64,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            database_url: "http://localhost:9000".to_string(),
            auth_token: None,
            request_timeout_ms: 10_000,
            max_retries: 3,
            max_backoff_secs: 30,
        }
    }
}

/// Hosted realtime database backend
pub struct FirebaseStore {
    client: Client,
    stream_client: Client,
    config: FirebaseConfig,
}

impl FirebaseStore {
    pub fn new(config: FirebaseConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        // Streams stay open indefinitely, so only the connect phase is bounded.
        let stream_client = Client::builder()
            .connect_timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            stream_client,
            config,
        })
    }

    pub fn config(&self) -> &FirebaseConfig {
        &self.config
    }

    /// REST URL for `path` with auth and query parameters
    pub fn url_for(&self, path: &StorePath, query: &QuerySpec) -> String {
        let base = self.config.database_url.trim_end_matches('/');
        let mut url = if path.is_root() {
            format!("{}/.json", base)
        } else {
            format!("{}/{}.json", base, path.as_str())
        };

        let mut params: Vec<String> = Vec::new();
        if let Some(token) = &self.config.auth_token {
            params.push(format!("auth={}", urlencoding::encode(token)));
        }
        if let Some(child) = &query.order_by_child {
            let quoted = format!("\"{}\"", child);
            params.push(format!("orderBy={}", urlencoding::encode(&quoted)));
        } else if query.limit_to_last.is_some() {
            params.push(format!("orderBy={}", urlencoding::encode("\"$key\"")));
        }
        if let Some(limit) = query.limit_to_last {
            params.push(format!("limitToLast={}", limit));
        }

        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    /// PATCH with retry logic
    async fn send_patch(&self, url: &str, body: &Map<String, Value>) -> StoreResult<()> {
        let mut last_error = StoreError::Unavailable("no attempts made".to_string());

        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                // Backoff: 1s, 4s, 9s...
                let delay = Duration::from_secs((attempt as u64).pow(2));
                tokio::time::sleep(delay).await;
            }

            match self.client.patch(url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        let delay = retry_after(
                            response.headers().get("Retry-After"),
                            self.config.max_backoff_secs,
                        );
                        tokio::time::sleep(delay).await;
                        last_error = StoreError::RateLimited;
                        continue;
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        let error = status_error(status, text);
                        if !error.is_transient() {
                            return Err(error);
                        }
                        last_error = error;
                    }
                }
                Err(e) => {
                    last_error = e.into();
                    continue;
                }
            }
        }

        Err(last_error)
    }
}

/// Map a non-success HTTP status to a store error
fn status_error(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(message),
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited,
        s if s.is_server_error() => StoreError::Unavailable(format!("{}: {}", s.as_u16(), message)),
        s => StoreError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

/// Delay requested by a 429 response, capped at `max_secs`
fn retry_after(header: Option<&reqwest::header::HeaderValue>, max_secs: u64) -> Duration {
    let secs = header
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0);
    Duration::from_secs(secs.min(max_secs.max(1)))
}

/// Reconnect delay after `attempt` consecutive failures
fn reconnect_delay(attempt: u32, max_secs: u64) -> Duration {
    let secs = (attempt.max(1) as u64).saturating_pow(2).min(max_secs.max(1));
    Duration::from_secs(secs)
}

#[async_trait]
impl RealtimeStore for FirebaseStore {
    fn name(&self) -> &str {
        "firebase"
    }

    async fn get(&self, path: &StorePath, query: &QuerySpec) -> StoreResult<Snapshot> {
        path.validate()?;
        let url = self.url_for(path, query);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let value: Value = response.json().await?;
        let value = tree::normalize(Some(&value)).map(|v| tree::apply_query(v, query));
        Ok(Snapshot::new(path.clone(), query.clone(), value))
    }

    async fn update(&self, path: &StorePath, fields: Map<String, Value>) -> StoreResult<()> {
        path.validate()?;
        let url = self.url_for(path, &QuerySpec::all());
        self.send_patch(&url, &fields).await
    }

    async fn subscribe(&self, path: &StorePath, query: QuerySpec) -> StoreResult<Subscription> {
        path.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = StreamWorker {
            client: self.stream_client.clone(),
            url: self.url_for(path, &query),
            path: path.clone(),
            query,
            sender: tx,
            max_backoff_secs: self.config.max_backoff_secs,
            last_emitted: None,
        };
        let task = tokio::spawn(worker.run());

        Ok(Subscription::new(path.clone(), rx).with_task(task))
    }
}

// ============================================
// Streaming subscription worker
// ============================================

enum StreamEnd {
    /// Server closed the connection; reconnect
    Closed,
    /// Subscriber went away; stop
    Detached,
}

struct StreamWorker {
    client: Client,
    url: String,
    path: StorePath,
    query: QuerySpec,
    sender: mpsc::UnboundedSender<SnapshotEvent>,
    max_backoff_secs: u64,
    last_emitted: Option<Option<Value>>,
}

impl StreamWorker {
    async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            let interrupted = match self.stream_once(&mut failures).await {
                Ok(StreamEnd::Detached) => return,
                Ok(StreamEnd::Closed) => {
                    debug!(path = %self.path, "Stream closed by server, reconnecting");
                    StoreError::Unavailable("stream closed by server".to_string())
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        path = %self.path,
                        error = %e,
                        attempt = failures.saturating_add(1),
                        "Stream interrupted"
                    );
                    e
                }
                Err(e) => {
                    warn!(path = %self.path, error = %e, "Subscription cancelled");
                    let _ = self.sender.send(SnapshotEvent::Error(e));
                    return;
                }
            };
            failures = failures.saturating_add(1);

            // The mirrored tree is gone; the next snapshot must be emitted
            // even if it matches the last one.
            self.last_emitted = None;
            if self.sender.send(SnapshotEvent::Error(interrupted)).is_err() {
                return;
            }
            tokio::time::sleep(reconnect_delay(failures, self.max_backoff_secs)).await;
        }
    }

    async fn stream_once(&mut self, failures: &mut u32) -> StoreResult<StreamEnd> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        info!(path = %self.path, "Stream connected");
        *failures = 0;

        let mut decoder = SseDecoder::new();
        let mut local = Value::Null;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for raw in decoder.feed(&chunk) {
                match StreamEvent::parse(&raw)? {
                    event @ (StreamEvent::Put { .. } | StreamEvent::Patch { .. }) => {
                        event.apply(&mut local)?;
                        if !self.emit(&local) {
                            return Ok(StreamEnd::Detached);
                        }
                    }
                    StreamEvent::KeepAlive => {}
                    StreamEvent::Cancel(reason) => {
                        return Err(StoreError::PermissionDenied(reason));
                    }
                    StreamEvent::AuthRevoked => {
                        return Err(StoreError::PermissionDenied("auth revoked".to_string()));
                    }
                    StreamEvent::Unknown(name) => {
                        debug!(path = %self.path, event = %name, "Ignoring stream event");
                    }
                }
            }
        }

        Ok(StreamEnd::Closed)
    }

    /// Send a snapshot unless it matches the previous one. Returns false
    /// once the subscriber is gone.
    fn emit(&mut self, local: &Value) -> bool {
        let value = tree::normalize(Some(local)).map(|v| tree::apply_query(v, &self.query));
        if self.last_emitted.as_ref() == Some(&value) {
            return true;
        }
        self.last_emitted = Some(value.clone());

        let snapshot = Snapshot::new(self.path.clone(), self.query.clone(), value);
        self.sender.send(SnapshotEvent::Value(snapshot)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Bytes,
        extract::State,
        http::{header, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::get,
        Router,
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn store_for(url: &str) -> FirebaseStore {
        FirebaseStore::new(FirebaseConfig {
            database_url: url.to_string(),
            max_retries: 1,
            ..Default::default()
        })
        .unwrap()
    }

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_url_building() {
        let store = FirebaseStore::new(FirebaseConfig {
            database_url: "https://demo.firebaseio.com/".to_string(),
            auth_token: Some("s3cr/t".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            store.url_for(&StorePath::new("system"), &QuerySpec::all()),
            "https://demo.firebaseio.com/system.json?auth=s3cr%2Ft"
        );

        let query = QuerySpec::all().order_by_child("timestamp").limit_to_last(10);
        assert_eq!(
            store.url_for(&StorePath::new("alerts"), &query),
            "https://demo.firebaseio.com/alerts.json?auth=s3cr%2Ft&orderBy=%22timestamp%22&limitToLast=10"
        );

        assert_eq!(
            store.url_for(&StorePath::root(), &QuerySpec::all()),
            "https://demo.firebaseio.com/.json?auth=s3cr%2Ft"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new()),
            StoreError::PermissionDenied(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, String::new()),
            StoreError::PermissionDenied(_)
        ));
        assert!(status_error(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad".into()),
            StoreError::Api { status: 400, .. }
        ));
    }

    #[test]
    fn test_reconnect_delay_is_capped() {
        assert_eq!(reconnect_delay(0, 30), Duration::from_secs(1));
        assert_eq!(reconnect_delay(2, 30), Duration::from_secs(4));
        assert_eq!(reconnect_delay(10, 30), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_is_capped() {
        use reqwest::header::HeaderValue;

        let header = HeaderValue::from_static("3600");
        assert_eq!(retry_after(Some(&header), 30), Duration::from_secs(30));
        assert_eq!(retry_after(Some(&HeaderValue::from_static("2")), 30), Duration::from_secs(2));
        assert_eq!(retry_after(None, 30), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_get_reads_value() {
        let app = Router::new().route(
            "/system.json",
            get(|| async { axum::Json(json!({"online": true, "lastUpdate": 1_700_000_000})) }),
        );
        let store = store_for(&spawn_server(app).await);

        let snap = store.get(&StorePath::new("system"), &QuerySpec::all()).await.unwrap();
        assert_eq!(snap.value, Some(json!({"online": true, "lastUpdate": 1_700_000_000})));
    }

    #[tokio::test]
    async fn test_get_absent_path_is_none() {
        let app = Router::new().route("/missing.json", get(|| async { axum::Json(Value::Null) }));
        let store = store_for(&spawn_server(app).await);

        let snap = store.get(&StorePath::new("missing"), &QuerySpec::all()).await.unwrap();
        assert!(!snap.exists());
    }

    #[tokio::test]
    async fn test_get_permission_denied() {
        let app = Router::new().route(
            "/alerts.json",
            get(|| async { (AxumStatus::UNAUTHORIZED, "Permission denied") }),
        );
        let store = store_for(&spawn_server(app).await);

        let result = store.get(&StorePath::new("alerts"), &QuerySpec::all()).await;
        assert!(matches!(result, Err(StoreError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_update_sends_patch_body() {
        let received: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let app = Router::new()
            .route(
                "/system.json",
                axum::routing::patch(
                    |State(slot): State<Arc<Mutex<Option<Value>>>>, body: Bytes| async move {
                        let value: Value = serde_json::from_slice(&body).unwrap();
                        *slot.lock().await = Some(value.clone());
                        axum::Json(value)
                    },
                ),
            )
            .with_state(received.clone());
        let store = store_for(&spawn_server(app).await);

        let fields = json!({"expectedFlowRate": 7.5, "lastUpdate": 1_700_000_000});
        store
            .update(&StorePath::new("system"), fields.as_object().unwrap().clone())
            .await
            .unwrap();

        assert_eq!(*received.lock().await, Some(fields));
    }

    #[tokio::test]
    async fn test_subscribe_streams_snapshots() {
        let app = Router::new().route(
            "/readings/current.json",
            get(|| async {
                let body = concat!(
                    "event: put\n",
                    "data: {\"path\":\"/\",\"data\":{\"tds\":100,\"status\":\"NORMAL\"}}\n\n",
                    "event: keep-alive\n",
                    "data: null\n\n",
                    "event: patch\n",
                    "data: {\"path\":\"/\",\"data\":{\"tds\":650,\"status\":\"WATER_QUALITY_ISSUE\"}}\n\n",
                );
                ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
            }),
        );
        let store = store_for(&spawn_server(app).await);

        let mut sub = store
            .subscribe(&StorePath::new("readings/current"), QuerySpec::all())
            .await
            .unwrap();

        let first = sub.next().await.unwrap();
        assert_eq!(
            first,
            SnapshotEvent::Value(Snapshot::new(
                StorePath::new("readings/current"),
                QuerySpec::all(),
                Some(json!({"tds": 100, "status": "NORMAL"})),
            ))
        );

        match sub.next().await.unwrap() {
            SnapshotEvent::Value(snap) => {
                assert_eq!(snap.value, Some(json!({"tds": 650, "status": "WATER_QUALITY_ISSUE"})));
            }
            other => panic!("unexpected event {:?}", other),
        }

        sub.unsubscribe();
    }

    #[tokio::test]
    async fn test_subscribe_cancel_ends_with_error() {
        let app = Router::new().route(
            "/alerts.json",
            get(|| async {
                let body = "event: cancel\ndata: permission_denied\n\n";
                ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
            }),
        );
        let store = store_for(&spawn_server(app).await);

        let mut sub = store
            .subscribe(&StorePath::new("alerts"), QuerySpec::all())
            .await
            .unwrap();

        assert!(matches!(
            sub.next().await,
            Some(SnapshotEvent::Error(StoreError::PermissionDenied(_)))
        ));
        assert!(sub.next().await.is_none());
    }

    async fn next_event(sub: &mut Subscription) -> SnapshotEvent {
        tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("no stream event within 5s")
            .expect("subscription ended")
    }

    fn sse(body: &'static str) -> axum::response::Response {
        ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
    }

    #[tokio::test]
    async fn test_transient_failure_reports_error_then_resumes() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/readings/current.json",
                get(|State(attempts): State<Arc<std::sync::atomic::AtomicUsize>>| async move {
                    if attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                        (AxumStatus::SERVICE_UNAVAILABLE, "down").into_response()
                    } else {
                        sse("event: put\ndata: {\"path\":\"/\",\"data\":{\"tds\":120}}\n\n")
                    }
                }),
            )
            .with_state(attempts.clone());
        let store = store_for(&spawn_server(app).await);

        let mut sub = store
            .subscribe(&StorePath::new("readings/current"), QuerySpec::all())
            .await
            .unwrap();

        assert!(matches!(
            next_event(&mut sub).await,
            SnapshotEvent::Error(StoreError::Unavailable(_))
        ));
        match next_event(&mut sub).await {
            SnapshotEvent::Value(snap) => assert_eq!(snap.value, Some(json!({"tds": 120}))),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(attempts.load(std::sync::atomic::Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_unchanged_snapshot_is_re_emitted_after_reconnect() {
        let app = Router::new().route(
            "/system.json",
            get(|| async { sse("event: put\ndata: {\"path\":\"/\",\"data\":{\"online\":true}}\n\n") }),
        );
        let store = store_for(&spawn_server(app).await);

        let mut sub = store
            .subscribe(&StorePath::new("system"), QuerySpec::all())
            .await
            .unwrap();

        assert!(matches!(next_event(&mut sub).await, SnapshotEvent::Value(_)));
        assert!(matches!(next_event(&mut sub).await, SnapshotEvent::Error(_)));
        match next_event(&mut sub).await {
            SnapshotEvent::Value(snap) => assert_eq!(snap.value, Some(json!({"online": true}))),
            other => panic!("unexpected event {:?}", other),
        }
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn test_patch_evicts_oldest_child_under_limit() {
        let app = Router::new().route(
            "/alerts.json",
            get(|| async {
                sse(concat!(
                    "event: put\n",
                    "data: {\"path\":\"/\",\"data\":{\"-A\":{\"timestamp\":1},\"-B\":{\"timestamp\":2}}}\n\n",
                    "event: patch\n",
                    "data: {\"path\":\"/\",\"data\":{\"-C\":{\"timestamp\":3}}}\n\n",
                ))
            }),
        );
        let store = store_for(&spawn_server(app).await);
        let query = QuerySpec::all().order_by_child("timestamp").limit_to_last(2);

        let mut sub = store.subscribe(&StorePath::new("alerts"), query).await.unwrap();

        match next_event(&mut sub).await {
            SnapshotEvent::Value(snap) => assert_eq!(
                snap.value,
                Some(json!({"-A": {"timestamp": 1}, "-B": {"timestamp": 2}}))
            ),
            other => panic!("unexpected event {:?}", other),
        }
        match next_event(&mut sub).await {
            SnapshotEvent::Value(snap) => {
                assert_eq!(
                    snap.value,
                    Some(json!({"-B": {"timestamp": 2}, "-C": {"timestamp": 3}}))
                );
                let keys: Vec<&str> = snap.ordered_children().into_iter().map(|(k, _)| k).collect();
                assert_eq!(keys, vec!["-B", "-C"]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        sub.unsubscribe();
    }
}

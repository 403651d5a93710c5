//! Background delivery agent
//!
//! Posts notifications to an HTTP push endpoint (a push relay or gateway)
//! so alerts still reach people when no dashboard is open.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use super::{Delivery, Notification, Notifier};

/// Longest `Retry-After` the agent will wait between attempts
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Configuration for the push endpoint
#[derive(Debug, Clone)]
pub struct WebPushConfig {
    /// Whether the agent is installed and active
    pub enabled: bool,
    /// Endpoint receiving `POST` requests with the notification JSON
    pub endpoint: String,
    /// Bearer token for the endpoint
    pub auth_token: Option<String>,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum attempts per notification
    pub max_retries: u32,
}

impl Default for WebPushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            auth_token: None,
            request_timeout_ms: 5000,
            max_retries: 3,
        }
    }
}

#[derive(Serialize)]
struct PushRequest<'a> {
    notification: &'a Notification,
}

pub struct WebPushAgent {
    client: Client,
    config: WebPushConfig,
}

impl WebPushAgent {
    pub fn new(config: WebPushConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    /// Whether the adapter should route through this agent
    pub fn is_active(&self) -> bool {
        self.config.enabled && !self.config.endpoint.is_empty()
    }

    /// POST with retry logic
    async fn send_post(&self, notification: &Notification) -> Result<(), String> {
        let body = PushRequest { notification };
        let mut last_error = String::from("no attempts made");

        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                // Backoff: 1s, 4s, 9s...
                let delay = Duration::from_secs((attempt as u64).pow(2));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.config.endpoint).json(&body);
            if let Some(token) = &self.config.auth_token {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        let delay = retry_after(response.headers().get("Retry-After"));
                        tokio::time::sleep(delay).await;
                        last_error = "rate limited".to_string();
                    } else if status.is_server_error() {
                        last_error = format!("push endpoint returned {}", status.as_u16());
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        return Err(format!("push endpoint returned {}: {}", status.as_u16(), text));
                    }
                }
                Err(e) => {
                    last_error = if e.is_timeout() {
                        "push request timed out".to_string()
                    } else if e.is_connect() {
                        "push endpoint unavailable".to_string()
                    } else {
                        e.to_string()
                    };
                }
            }
        }

        Err(last_error)
    }
}

/// Delay requested by a 429 response, capped at [`MAX_RETRY_AFTER`]
fn retry_after(header: Option<&reqwest::header::HeaderValue>) -> Duration {
    header
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::ZERO)
        .min(MAX_RETRY_AFTER)
}

#[async_trait]
impl Notifier for WebPushAgent {
    fn name(&self) -> &str {
        "web-push"
    }

    async fn try_send(&self, notification: &Notification) -> Delivery {
        if !self.is_active() {
            return Delivery::Skipped("push agent inactive".to_string());
        }

        match self.send_post(notification).await {
            Ok(()) => {
                tracing::debug!(tag = %notification.tag, "Push notification accepted");
                Delivery::Delivered
            }
            Err(reason) => {
                tracing::warn!(tag = %notification.tag, error = %reason, "Push delivery failed");
                Delivery::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode as AxumStatus, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Inbox = Arc<Mutex<Vec<Value>>>;

    async fn spawn_endpoint(status: AxumStatus) -> (String, Inbox) {
        let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/push",
                post(move |State(inbox): State<Inbox>, Json(body): Json<Value>| async move {
                    inbox.lock().await.push(body);
                    status
                }),
            )
            .with_state(inbox.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/push", addr), inbox)
    }

    fn agent(endpoint: &str) -> WebPushAgent {
        WebPushAgent::new(WebPushConfig {
            enabled: true,
            endpoint: endpoint.to_string(),
            max_retries: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_retry_after_is_capped() {
        use reqwest::header::HeaderValue;

        assert_eq!(retry_after(Some(&HeaderValue::from_static("2"))), Duration::from_secs(2));
        assert_eq!(retry_after(Some(&HeaderValue::from_static("3600"))), MAX_RETRY_AFTER);
        assert_eq!(retry_after(Some(&HeaderValue::from_static("soon"))), Duration::ZERO);
        assert_eq!(retry_after(None), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_inactive_agent_skips() {
        let agent = WebPushAgent::new(WebPushConfig::default()).unwrap();
        assert!(!agent.is_active());
        assert!(matches!(
            agent.try_send(&Notification::test()).await,
            Delivery::Skipped(_)
        ));
    }

    #[tokio::test]
    async fn test_posts_notification() {
        let (endpoint, inbox) = spawn_endpoint(AxumStatus::CREATED).await;
        let outcome = agent(&endpoint)
            .try_send(&Notification::new("LEAKAGE DETECTED", "Leak", "a1"))
            .await;

        assert_eq!(outcome, Delivery::Delivered);
        let received = inbox.lock().await;
        assert_eq!(received[0]["notification"]["tag"], "a1");
    }

    #[tokio::test]
    async fn test_client_error_is_failure() {
        let (endpoint, _inbox) = spawn_endpoint(AxumStatus::GONE).await;
        let outcome = agent(&endpoint).try_send(&Notification::test()).await;
        assert!(matches!(outcome, Delivery::Failed(reason) if reason.contains("410")));
    }
}

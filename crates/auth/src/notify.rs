//! Best-effort "user created" notifications to a downstream service.
//!
//! Delivery happens after the signup transaction commits, on a detached task
//! with its own timeout. A failed or slow notification is logged and dropped;
//! it never reaches the signup caller.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::{debug, info, warn},
};

use crate::{model::User, trust::SERVICE_KEY_HEADER};

/// Payload describing a newly registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_uuid: String,
    pub email: String,
    pub username: String,
    pub tenant_id: String,
}

impl From<&User> for UserCreated {
    fn from(user: &User) -> Self {
        Self {
            user_uuid: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            tenant_id: user.tenant_id.clone(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn user_created(&self, event: &UserCreated) -> anyhow::Result<()>;
}

/// Posts [`UserCreated`] as JSON to a fixed URL.
pub struct HttpNotificationSink {
    client: reqwest::Client,
    url: String,
    service_key: Option<Secret<String>>,
}

impl HttpNotificationSink {
    pub fn new(url: impl Into<String>, service_key: Option<Secret<String>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            service_key,
        }
    }

    /// Build from config; `None` when no notification URL is configured.
    pub fn from_config(cfg: &idgate_config::NotifyConfig) -> Option<Self> {
        let Some(url) = cfg.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            warn!("notify.url not set; user-created notifications are disabled");
            return None;
        };
        if !url.starts_with("https://") {
            warn!(url, "sending user-created notifications without TLS");
        }
        info!(url, "user-created notifications enabled");
        Some(Self::new(url, cfg.service_key.clone()))
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn user_created(&self, event: &UserCreated) -> anyhow::Result<()> {
        let mut req = self.client.post(&self.url).json(event);
        if let Some(ref key) = self.service_key {
            req = req.header(SERVICE_KEY_HEADER, key.expose_secret());
        }
        req.send().await?.error_for_status()?;
        debug!(user_id = %event.user_uuid, "user-created notification delivered");
        Ok(())
    }
}

/// Fire `event` at `sink` on a detached task bounded by `timeout`.
pub fn dispatch(sink: Arc<dyn NotificationSink>, event: UserCreated, timeout: Duration) {
    tokio::spawn(async move {
        match tokio::time::timeout(timeout, sink.user_created(&event)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                warn!(user_id = %event.user_uuid, error = %e, "user-created notification failed");
            },
            Err(_) => {
                warn!(user_id = %event.user_uuid, ?timeout, "user-created notification timed out");
            },
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        axum::{Json, Router, http::HeaderMap, routing::post},
        tokio::{net::TcpListener, sync::mpsc},
    };

    fn event() -> UserCreated {
        UserCreated {
            user_uuid: "u-1".into(),
            email: "a@x.com".into(),
            username: "alice".into(),
            tenant_id: "default".into(),
        }
    }

    /// Receiver that forwards each request (body + service-key header).
    async fn start_receiver() -> (String, mpsc::UnboundedReceiver<(UserCreated, Option<String>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/notify",
            post(move |headers: HeaderMap, Json(body): Json<UserCreated>| {
                let tx = tx.clone();
                async move {
                    let key = headers
                        .get(SERVICE_KEY_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    let _ = tx.send((body, key));
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/notify"), rx)
    }

    #[tokio::test]
    async fn http_sink_posts_json_with_service_key() {
        let (url, mut rx) = start_receiver().await;
        let sink = HttpNotificationSink::new(url, Some(Secret::new("svc".into())));

        sink.user_created(&event()).await.unwrap();

        let (body, key) = rx.recv().await.unwrap();
        assert_eq!(body, event());
        assert_eq!(key.as_deref(), Some("svc"));
    }

    #[tokio::test]
    async fn http_sink_surfaces_unreachable_endpoint() {
        let sink = HttpNotificationSink::new("http://127.0.0.1:1/notify", None);
        assert!(sink.user_created(&event()).await.is_err());
    }

    #[test]
    fn from_config_without_url_is_none() {
        assert!(HttpNotificationSink::from_config(&idgate_config::NotifyConfig::default()).is_none());
    }

    struct Hanging;

    #[async_trait]
    impl NotificationSink for Hanging {
        async fn user_created(&self, _event: &UserCreated) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatch_returns_immediately_for_hanging_sink() {
        let started = std::time::Instant::now();
        dispatch(Arc::new(Hanging), event(), Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_millis(50));
        // Let the timeout fire; nothing should panic.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

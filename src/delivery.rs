//! # Delivery — Outbox Drain Worker
//!
//! Background task that consumes [`NotificationIntent`]s from the outbox. Each
//! intent is persisted as a `notifications` row (the in-app inbox) and, when an
//! FCM server key is configured, pushed to every device token registered for the
//! recipient.
//!
//! Delivery is best-effort: failures are logged and counted in
//! `precastflow_notifications_total{result="failed"}` and never reach the request
//! that produced the intent.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PushConfig;
use crate::db::Database;
use crate::events::NotificationIntent;
use crate::prom_metrics::Metrics;

const PUSH_ATTEMPTS: u32 = 3;
const PUSH_BACKOFF_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("network error: {0}")]
    Network(String),

    #[error("FCM returned {0}: {1}")]
    Api(u16, String),
}

impl PushError {
    /// 4xx answers (bad token, bad key) will not improve on retry.
    fn is_permanent(&self) -> bool {
        matches!(self, PushError::Api(code, _) if (400..500).contains(code))
    }
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    to: &'a str,
    notification: FcmNotification<'a>,
    data: &'a std::collections::BTreeMap<String, String>,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
    click_action: &'a str,
}

/// Firebase Cloud Messaging client (legacy HTTP API).
pub struct FcmClient {
    http_client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

impl FcmClient {
    /// `None` when no server key is configured.
    pub fn from_config(config: &PushConfig) -> Result<Option<Self>, PushError> {
        let server_key = match config.fcm_server_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => return Ok(None),
        };
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PushError::Network(e.to_string()))?;
        Ok(Some(FcmClient {
            http_client,
            endpoint: config.fcm_endpoint.clone(),
            server_key,
        }))
    }

    async fn send_once(&self, token: &str, intent: &NotificationIntent) -> Result<(), PushError> {
        let message = FcmMessage {
            to: token,
            notification: FcmNotification {
                title: &intent.title,
                body: &intent.body,
                click_action: &intent.action_url,
            },
            data: &intent.payload,
        };
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&message)
            .send()
            .await
            .map_err(|e| PushError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PushError::Api(status.as_u16(), body))
        }
    }

    /// Send with up to [`PUSH_ATTEMPTS`] attempts and doubling backoff.
    pub async fn send(&self, token: &str, intent: &NotificationIntent) -> Result<(), PushError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(token, intent).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_permanent() || attempt >= PUSH_ATTEMPTS => return Err(e),
                Err(e) => {
                    let wait = Duration::from_millis(PUSH_BACKOFF_MS << (attempt - 1));
                    warn!(attempt, error = %e, ?wait, "push failed, retrying");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// Persist and push one intent. Returns whether every step succeeded.
async fn deliver(db: &Database, push: Option<&FcmClient>, intent: &NotificationIntent) -> bool {
    let recipient = intent.recipient_user_id;
    if let Err(e) = db.insert_notification(intent).await {
        warn!(recipient, error = %e, "failed to persist notification");
        return false;
    }
    let Some(push) = push else {
        return true;
    };
    let tokens = match db.get_device_tokens(recipient).await {
        Ok(t) => t,
        Err(e) => {
            warn!(recipient, error = %e, "failed to load device tokens");
            return false;
        }
    };
    let mut ok = true;
    for token in &tokens {
        if let Err(e) = push.send(token, intent).await {
            warn!(recipient, error = %e, "push delivery failed");
            ok = false;
        }
    }
    ok
}

/// Spawn the worker. It exits once every [`crate::events::Outbox`] handle is dropped
/// and the queue is drained.
pub fn spawn_delivery_worker(
    db: Database,
    mut receiver: mpsc::Receiver<NotificationIntent>,
    push: Option<FcmClient>,
    metrics: Arc<Metrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(push_enabled = push.is_some(), "notification delivery worker started");
        while let Some(intent) = receiver.recv().await {
            let result = if deliver(&db, push.as_ref(), &intent).await {
                "delivered"
            } else {
                "failed"
            };
            metrics.record_notification(result);
        }
        info!("notification delivery worker stopped");
    })
}

//! # Events — Notification Intents and the Outbox
//!
//! The progression engine describes what happened as [`Event`]s and turns them
//! into [`NotificationIntent`]s once its transaction has committed. Intents are
//! pushed onto a bounded in-process [`Outbox`] in production order; the delivery
//! worker in [`crate::delivery`] drains it.
//!
//! ## Event Types
//!
//! | Variant | Recipient |
//! |---------|-----------|
//! | `QcCompleted` | QC user of the next stage, else QC user of the checked stage |
//! | `StageAdvanced` | assignee of the next stage |
//! | `ElementStocked` | manager of the activity's stockyard |
//!
//! Publishing never blocks and never fails the caller: when the outbox is full
//! the intent is dropped, logged and counted.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::prom_metrics::Metrics;

/// Delivery-agnostic notification: `{recipient_user_id, title, body, action_url, payload}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationIntent {
    pub recipient_user_id: i64,
    pub title: String,
    pub body: String,
    pub action_url: String,
    pub payload: BTreeMap<String, String>,
}

/// Names shared by every event of one activity.
#[derive(Clone, Debug, Default)]
pub struct ActivityContext {
    pub project_id: i64,
    pub project_name: String,
    pub task_name: String,
    pub activity_id: i64,
    pub activity_name: String,
}

impl ActivityContext {
    /// `"<element type name> #<element id>"`.
    pub fn activity_name(element_type_name: &str, element_id: i64) -> String {
        format!("{} #{}", element_type_name, element_id)
    }
}

#[derive(Clone, Debug)]
pub enum Event {
    QcCompleted {
        ctx: ActivityContext,
        recipient: i64,
        stage_name: String,
    },
    StageAdvanced {
        ctx: ActivityContext,
        recipient: i64,
        next_stage_name: String,
    },
    ElementStocked {
        ctx: ActivityContext,
        recipient: i64,
        stockyard_id: i64,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::QcCompleted { .. } => "qc_completed",
            Event::StageAdvanced { .. } => "stage_advanced",
            Event::ElementStocked { .. } => "element_stocked",
        }
    }

    pub fn into_intent(self, public_base_url: &str) -> NotificationIntent {
        let kind = self.kind();
        let (ctx, recipient, title, body, mut payload) = match self {
            Event::QcCompleted {
                ctx,
                recipient,
                stage_name,
            } => {
                let body = format!(
                    "QC for {} at stage {} completed ({})",
                    ctx.activity_name, stage_name, ctx.project_name
                );
                let payload = BTreeMap::from([("stage_name".to_string(), stage_name)]);
                (ctx, recipient, "QC completed".to_string(), body, payload)
            }
            Event::StageAdvanced {
                ctx,
                recipient,
                next_stage_name,
            } => {
                let body = format!(
                    "{} from task {} is ready for {} ({})",
                    ctx.activity_name, ctx.task_name, next_stage_name, ctx.project_name
                );
                let payload = BTreeMap::from([("next_stage_name".to_string(), next_stage_name)]);
                (ctx, recipient, "New work assigned".to_string(), body, payload)
            }
            Event::ElementStocked {
                ctx,
                recipient,
                stockyard_id,
            } => {
                let body = format!(
                    "{} finished production and is waiting for the stockyard ({})",
                    ctx.activity_name, ctx.project_name
                );
                let payload =
                    BTreeMap::from([("stockyard_id".to_string(), stockyard_id.to_string())]);
                (ctx, recipient, "Element ready for stockyard".to_string(), body, payload)
            }
        };
        payload.insert("kind".into(), kind.into());
        payload.insert("project_id".into(), ctx.project_id.to_string());
        payload.insert("project_name".into(), ctx.project_name);
        payload.insert("task_name".into(), ctx.task_name);
        payload.insert("activity_id".into(), ctx.activity_id.to_string());
        payload.insert("activity_name".into(), ctx.activity_name);
        NotificationIntent {
            recipient_user_id: recipient,
            title,
            body,
            action_url: format!(
                "{}/activities/{}",
                public_base_url.trim_end_matches('/'),
                ctx.activity_id
            ),
            payload,
        }
    }
}

/// Sending half of the bounded notification queue.
#[derive(Clone)]
pub struct Outbox {
    sender: mpsc::Sender<NotificationIntent>,
    metrics: Arc<Metrics>,
}

impl Outbox {
    pub fn channel(
        capacity: usize,
        metrics: Arc<Metrics>,
    ) -> (Outbox, mpsc::Receiver<NotificationIntent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Outbox { sender, metrics }, receiver)
    }

    /// Enqueue intents in order. Must only be called after the producing
    /// transaction committed.
    pub fn publish(&self, intents: Vec<NotificationIntent>) {
        for intent in intents {
            let recipient = intent.recipient_user_id;
            match self.sender.try_send(intent) {
                Ok(()) => debug!(recipient, "notification queued"),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(recipient, "notification outbox full, dropping intent");
                    self.metrics.record_notification("dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(recipient, "notification outbox closed, dropping intent");
                    self.metrics.record_notification("dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ActivityContext {
        ActivityContext {
            project_id: 3,
            project_name: "Tower A".into(),
            task_name: "Level 4 slabs".into(),
            activity_id: 42,
            activity_name: ActivityContext::activity_name("Slab", 7),
        }
    }

    #[test]
    fn activity_name_format() {
        assert_eq!(ActivityContext::activity_name("Beam", 12), "Beam #12");
    }

    #[test]
    fn stage_advanced_intent_carries_payload() {
        let intent = Event::StageAdvanced {
            ctx: ctx(),
            recipient: 9,
            next_stage_name: "Curing".into(),
        }
        .into_intent("http://host:7010/");
        assert_eq!(intent.recipient_user_id, 9);
        assert_eq!(intent.action_url, "http://host:7010/activities/42");
        assert_eq!(intent.payload["next_stage_name"], "Curing");
        assert_eq!(intent.payload["project_name"], "Tower A");
        assert_eq!(intent.payload["task_name"], "Level 4 slabs");
        assert_eq!(intent.payload["activity_name"], "Slab #7");
        assert_eq!(intent.payload["kind"], "stage_advanced");
    }

    #[test]
    fn stocked_intent_names_yard() {
        let intent = Event::ElementStocked {
            ctx: ctx(),
            recipient: 5,
            stockyard_id: 7,
        }
        .into_intent("http://host");
        assert_eq!(intent.payload["stockyard_id"], "7");
        assert_eq!(intent.payload["kind"], "element_stocked");
    }

    #[tokio::test]
    async fn publish_preserves_order() {
        let (outbox, mut rx) = Outbox::channel(8, Arc::new(Metrics::new()));
        let intents: Vec<_> = [1, 2, 3]
            .into_iter()
            .map(|r| {
                Event::QcCompleted {
                    ctx: ctx(),
                    recipient: r,
                    stage_name: "Casting".into(),
                }
                .into_intent("http://host")
            })
            .collect();
        outbox.publish(intents);
        for expected in [1, 2, 3] {
            assert_eq!(rx.recv().await.unwrap().recipient_user_id, expected);
        }
    }

    #[tokio::test]
    async fn publish_drops_when_full() {
        let metrics = Arc::new(Metrics::new());
        let (outbox, mut rx) = Outbox::channel(1, metrics.clone());
        let make = |r| {
            Event::QcCompleted {
                ctx: ctx(),
                recipient: r,
                stage_name: "Casting".into(),
            }
            .into_intent("http://host")
        };
        outbox.publish(vec![make(1), make(2)]);
        assert_eq!(rx.recv().await.unwrap().recipient_user_id, 1);
        assert!(rx.try_recv().is_err());
        assert!(metrics.encode().contains("result=\"dropped\""));
    }
}

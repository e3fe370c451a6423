//! Notification inbox rows and push device tokens.

use anyhow::Result;

use super::{Database, NotificationRow};
use crate::events::NotificationIntent;

impl Database {
    pub async fn insert_notification(&self, intent: &NotificationIntent) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO notifications (user_id, title, body, action_url, payload)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(intent.recipient_user_id)
        .bind(&intent.title)
        .bind(&intent.body)
        .bind(&intent.action_url)
        .bind(serde_json::to_value(&intent.payload)?)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Most recent notifications for a user, newest first.
    pub async fn get_notifications(&self, user_id: i64, limit: i64) -> Result<Vec<NotificationRow>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, user_id, title, body, action_url, payload, read, created_at
             FROM notifications WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_device_tokens(&self, user_id: i64) -> Result<Vec<String>> {
        let tokens = sqlx::query_scalar::<_, String>(
            "SELECT fcm_token FROM user_devices WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }
}

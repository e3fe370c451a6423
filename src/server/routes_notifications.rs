//! Notification inbox.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::AppState;
use crate::error::CoreResult;

const INBOX_LIMIT: i64 = 50;

pub(super) async fn handler_notifications(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> CoreResult<impl IntoResponse> {
    let notifications = state.db.get_notifications(user.user_id, INBOX_LIMIT).await?;
    Ok(Json(serde_json::json!({ "notifications": notifications })))
}

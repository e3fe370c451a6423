//! Task API: adopting a task's elements into production.

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::middleware_auth::RequireAuth;
use super::AppState;
use crate::error::CoreResult;
use crate::progression::adoption::{adopt_elements, Adoption};

#[derive(Deserialize)]
pub(super) struct AdoptPayload {
    element_ids: Vec<i64>,
    #[serde(default)]
    stockyard_id: Option<i64>,
}

pub(super) async fn handler_adopt_elements(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(task_id): AxumPath<i64>,
    Json(payload): Json<AdoptPayload>,
) -> CoreResult<(StatusCode, Json<Adoption>)> {
    info!(task_id, actor = user.user_id, "adopting elements");
    let adoption =
        adopt_elements(&state.db, task_id, &payload.element_ids, payload.stockyard_id).await?;
    Ok((StatusCode::CREATED, Json(adoption)))
}

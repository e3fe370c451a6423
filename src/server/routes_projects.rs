//! Project read models: view projection, production history, precast stock.

use axum::extract::{Path as AxumPath, State};
use axum::Json;
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::AppState;
use crate::db::{PrecastStockRow, ProductionEventRow};
use crate::error::{CoreError, CoreResult};
use crate::progression::view::{load_project_views, ActivityView};

pub(super) async fn handler_project_views(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(project_id): AxumPath<i64>,
) -> CoreResult<Json<Vec<ActivityView>>> {
    Ok(Json(
        load_project_views(&state.db, project_id, user.user_id).await?,
    ))
}

async fn require_project(state: &AppState, project_id: i64) -> CoreResult<()> {
    if state.db.project_exists(project_id).await? {
        Ok(())
    } else {
        Err(CoreError::NotFound(format!("project {}", project_id)))
    }
}

/// The caller's own audit events in the project, newest first.
pub(super) async fn handler_production_history(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(project_id): AxumPath<i64>,
) -> CoreResult<Json<Vec<ProductionEventRow>>> {
    require_project(&state, project_id).await?;
    Ok(Json(
        state
            .db
            .get_production_history(project_id, user.user_id)
            .await?,
    ))
}

pub(super) async fn handler_precast_stock(
    State(state): State<Arc<AppState>>,
    RequireAuth(_user): RequireAuth,
    AxumPath(project_id): AxumPath<i64>,
) -> CoreResult<Json<Vec<PrecastStockRow>>> {
    require_project(&state, project_id).await?;
    Ok(Json(state.db.get_precast_stock(project_id).await?))
}

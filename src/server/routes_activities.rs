//! Activity API: status writes, QC submissions and activity reads.

use axum::extract::{Path as AxumPath, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::AppState;
use crate::db::{ActivityRow, NewQcAnswer, QcAnswerRow};
use crate::error::{CoreError, CoreResult};
use crate::progression::history::{group_by_stage, StageHistory};
use crate::progression::{Channel, Status, TransitionReport, TransitionRequest};

#[derive(Deserialize)]
pub(super) struct StatusPayload {
    status: Status,
}

#[derive(Deserialize)]
pub(super) struct QcStatusPayload {
    activity_id: i64,
    status: Status,
}

#[derive(Deserialize)]
pub(super) struct QcSubmissionPayload {
    #[serde(default)]
    answers: Vec<NewQcAnswer>,
    status: QcStatusPayload,
}

pub(super) async fn handler_status_update(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(activity_id): AxumPath<i64>,
    Json(payload): Json<StatusPayload>,
) -> CoreResult<Json<TransitionReport>> {
    let report = state
        .engine
        .submit(&TransitionRequest {
            activity_id,
            actor: user.user_id,
            new_status: payload.status,
            channel: Channel::StatusUpdate,
            answers: Vec::new(),
        })
        .await?;
    Ok(Json(report))
}

pub(super) async fn handler_qc_answers(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<QcSubmissionPayload>,
) -> CoreResult<Json<TransitionReport>> {
    let report = state
        .engine
        .submit(&TransitionRequest {
            activity_id: payload.status.activity_id,
            actor: user.user_id,
            new_status: payload.status.status,
            channel: Channel::QcSubmission,
            answers: payload.answers,
        })
        .await?;
    Ok(Json(report))
}

async fn require_activity(state: &AppState, activity_id: i64) -> CoreResult<ActivityRow> {
    state
        .db
        .get_activity(activity_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("activity {}", activity_id)))
}

pub(super) async fn handler_activity_get(
    State(state): State<Arc<AppState>>,
    RequireAuth(_user): RequireAuth,
    AxumPath(activity_id): AxumPath<i64>,
) -> CoreResult<Json<ActivityRow>> {
    Ok(Json(require_activity(&state, activity_id).await?))
}

pub(super) async fn handler_activity_history(
    State(state): State<Arc<AppState>>,
    RequireAuth(_user): RequireAuth,
    AxumPath(activity_id): AxumPath<i64>,
) -> CoreResult<Json<Vec<StageHistory>>> {
    require_activity(&state, activity_id).await?;
    let events = state.db.get_activity_history(activity_id).await?;
    Ok(Json(group_by_stage(events)))
}

pub(super) async fn handler_activity_qc_answers(
    State(state): State<Arc<AppState>>,
    RequireAuth(_user): RequireAuth,
    AxumPath(activity_id): AxumPath<i64>,
) -> CoreResult<Json<Vec<QcAnswerRow>>> {
    require_activity(&state, activity_id).await?;
    Ok(Json(state.db.get_qc_answers(activity_id).await?))
}

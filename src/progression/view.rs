//! View projection: per-stage display status and edit permissions for every
//! open activity of a project. Read-only.

use serde::Serialize;
use std::collections::HashMap;

use super::dispatch::ActivityCtx;
use super::engine::{self, Topology};
use super::path::StagePath;
use super::registry::{StageInfo, StageRegistry};
use crate::db::{ActivityRow, Database};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Completed,
    InProgress,
    Pending,
    NotRequired,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageView {
    pub stage_id: i64,
    pub stage_name: String,
    pub previous_stage_id: Option<i64>,
    pub status: DisplayStatus,
    pub qc: DisplayStatus,
    pub editable: bool,
    pub qc_editable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityView {
    pub activity_id: i64,
    pub task_id: i64,
    pub element_id: i64,
    pub element_type_id: i64,
    pub current_stage_id: i64,
    pub stages: Vec<StageView>,
}

fn stage_view(topo: &Topology<'_>, ctx: &ActivityCtx, stage: &StageInfo, user_id: i64) -> StageView {
    let (lo, _) = topo.current_span();
    let pos = topo.path.position(stage.id).unwrap_or(usize::MAX);
    let is_current = topo.is_current(stage.id);
    let done = |yes: bool| {
        if yes {
            DisplayStatus::Completed
        } else {
            DisplayStatus::InProgress
        }
    };

    let (status, qc) = if pos < lo {
        (DisplayStatus::Completed, DisplayStatus::Completed)
    } else if is_current {
        let qc = if stage.qc_assign {
            done(engine::qc_done(&ctx.state, stage))
        } else {
            DisplayStatus::NotRequired
        };
        (done(engine::assignee_done(&ctx.state, stage)), qc)
    } else {
        let qc = if stage.qc_assign {
            DisplayStatus::Pending
        } else {
            DisplayStatus::NotRequired
        };
        (DisplayStatus::Pending, qc)
    };

    let is_user = |id: Option<i64>| id == Some(user_id);
    let own_stage = is_user(stage.assigned_to)
        || (stage.id == topo.current.id && is_user(ctx.assigned_to));
    let window_crew = stage.kind.is_parallel()
        && (is_user(topo.window_reinforcement().and_then(|s| s.assigned_to))
            || is_user(topo.current.assigned_to)
            || is_user(ctx.assigned_to));
    let editable = is_current && (own_stage || window_crew);
    let qc_editable = is_current && stage.qc_assign && is_user(stage.qc_id);

    StageView {
        stage_id: stage.id,
        stage_name: stage.name.clone(),
        previous_stage_id: topo.path.predecessor_of(stage.id),
        status,
        qc,
        editable,
        qc_editable,
    }
}

/// Ladder of one activity as seen by `user_id`.
pub fn project_activity(
    activity: &ActivityRow,
    path: &StagePath,
    registry: &StageRegistry,
    user_id: i64,
) -> CoreResult<ActivityView> {
    let topo = Topology::build(path, registry, activity.stage_id)?;
    let ctx = ActivityCtx {
        assigned_to: activity.assigned_to,
        qc_id: activity.qc_id,
        state: activity.state()?,
    };
    let stages = path
        .stages()
        .iter()
        .map(|id| registry.resolve(*id).map(|s| stage_view(&topo, &ctx, s, user_id)))
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(ActivityView {
        activity_id: activity.id,
        task_id: activity.task_id,
        element_id: activity.element_id,
        element_type_id: activity.element_type_id,
        current_stage_id: activity.stage_id,
        stages,
    })
}

/// `GET /projects/{id}/views`: every open activity of the project.
pub async fn load_project_views(
    db: &Database,
    project_id: i64,
    user_id: i64,
) -> CoreResult<Vec<ActivityView>> {
    if !db.project_exists(project_id).await? {
        return Err(CoreError::NotFound(format!("project {}", project_id)));
    }
    let activities = db.get_active_activities(project_id).await?;
    if activities.is_empty() {
        return Ok(Vec::new());
    }

    let registry = StageRegistry::new(
        db.get_project_stages(project_id)
            .await?
            .into_iter()
            .map(StageInfo::try_from)
            .collect::<Result<Vec<_>, _>>()?,
    )?;
    let mut type_ids: Vec<i64> = activities.iter().map(|a| a.element_type_id).collect();
    type_ids.sort_unstable();
    type_ids.dedup();
    let mut raw_paths = db.get_stage_paths(&type_ids).await?;
    let mut paths: HashMap<i64, StagePath> = HashMap::new();
    for id in type_ids {
        let stages = raw_paths.remove(&id).ok_or_else(|| {
            CoreError::NotFound(format!("stage path for element type {}", id))
        })?;
        paths.insert(id, StagePath::new(id, stages)?);
    }

    activities
        .iter()
        .map(|a| {
            let path = paths
                .get(&a.element_type_id)
                .ok_or_else(|| CoreError::Internal("stage path vanished".into()))?;
            project_activity(a, path, &registry, user_id)
        })
        .collect()
}

//! Pure progression decisions.
//!
//! Nothing here touches the database. The executor in [`super::transition`] loads
//! the activity, its path and the project's stages, asks [`plan`] what a write
//! should do, and then applies the returned [`Plan`] inside its transaction.

use serde::Serialize;

use super::dispatch::{self, ActivityCtx, Channel};
use super::path::StagePath;
use super::registry::{StageInfo, StageKind, StageRegistry};
use super::status::{ActivityState, Status, TargetField};
use crate::error::CoreError;

/// An activity's position in its element type's path, with the parallel window
/// resolved against the project's stages.
#[derive(Debug, Clone, Copy)]
pub struct Topology<'a> {
    pub path: &'a StagePath,
    pub registry: &'a StageRegistry,
    pub current: &'a StageInfo,
    mesh: Option<&'a StageInfo>,
    reinforcement: Option<&'a StageInfo>,
}

impl<'a> Topology<'a> {
    pub fn build(
        path: &'a StagePath,
        registry: &'a StageRegistry,
        stage_id: i64,
    ) -> Result<Self, CoreError> {
        path.check(registry)?;
        if !path.contains(stage_id) {
            return Err(CoreError::Configuration(format!(
                "stage {} is not on the path of element type {}",
                stage_id,
                path.element_type_id()
            )));
        }
        let current = registry.resolve(stage_id)?;
        let on_path = |s: Option<&'a StageInfo>| s.filter(|s| path.contains(s.id));
        Ok(Topology {
            path,
            registry,
            current,
            mesh: on_path(registry.mesh_mould()),
            reinforcement: on_path(registry.reinforcement()),
        })
    }

    /// Whether the activity sits in the Mesh & Mould / Reinforcement window.
    pub fn in_window(&self) -> bool {
        self.current.kind.is_parallel()
    }

    /// Mesh & Mould stage, when the activity is inside the window and the path has one.
    pub fn window_mesh(&self) -> Option<&'a StageInfo> {
        self.mesh.filter(|_| self.in_window())
    }

    pub fn window_reinforcement(&self) -> Option<&'a StageInfo> {
        self.reinforcement.filter(|_| self.in_window())
    }

    pub fn window_members(&self) -> impl Iterator<Item = &'a StageInfo> {
        self.window_mesh().into_iter().chain(self.window_reinforcement())
    }

    /// Stage whose successor is taken on advance: the later window member, or the
    /// current stage outside the window.
    pub fn anchor(&self) -> i64 {
        self.window_members()
            .max_by_key(|s| self.path.position(s.id))
            .map_or(self.current.id, |s| s.id)
    }

    /// Whether `stage_id` counts as the activity's current stage. Both window
    /// members are current while inside the window.
    pub fn is_current(&self, stage_id: i64) -> bool {
        stage_id == self.current.id || self.window_members().any(|s| s.id == stage_id)
    }

    /// Path positions spanned by the current stage (two positions inside the window).
    pub fn current_span(&self) -> (usize, usize) {
        let positions = std::iter::once(self.current.id)
            .chain(self.window_members().map(|s| s.id))
            .filter_map(|id| self.path.position(id));
        positions.fold((usize::MAX, 0), |(lo, hi), p| (lo.min(p), hi.max(p)))
    }

    /// The stage a status column belongs to, used to stamp audit rows.
    pub fn stage_for(&self, field: TargetField) -> &'a StageInfo {
        match field {
            TargetField::Status | TargetField::QcStatus => self.current,
            TargetField::MeshMoldStatus | TargetField::MeshMoldQcStatus => {
                self.window_mesh().unwrap_or(self.current)
            }
            TargetField::ReinforcementStatus | TargetField::ReinforcementQcStatus => {
                self.window_reinforcement().unwrap_or(self.current)
            }
        }
    }
}

/// Assignee and QC columns of one window member.
fn sub_stage_fields(kind: StageKind) -> (TargetField, TargetField) {
    match kind {
        StageKind::MeshMould => (TargetField::MeshMoldStatus, TargetField::MeshMoldQcStatus),
        StageKind::Reinforcement => (
            TargetField::ReinforcementStatus,
            TargetField::ReinforcementQcStatus,
        ),
        StageKind::Regular => (TargetField::Status, TargetField::QcStatus),
    }
}

/// Assignee side finished for `stage` (a window member or the current regular stage).
pub fn assignee_done(state: &ActivityState, stage: &StageInfo) -> bool {
    state.is_completed(sub_stage_fields(stage.kind).0)
}

/// QC side finished, or not required.
pub fn qc_done(state: &ActivityState, stage: &StageInfo) -> bool {
    !stage.qc_assign || state.is_completed(sub_stage_fields(stage.kind).1)
}

/// Regular stage: assignee done and QC done when required. Parallel window: the
/// same for every member present in the path.
pub fn stage_done(topo: &Topology<'_>, state: &ActivityState) -> bool {
    if topo.in_window() {
        topo.window_members()
            .all(|s| assignee_done(state, s) && qc_done(state, s))
    } else {
        assignee_done(state, topo.current) && qc_done(state, topo.current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Write recorded; the stage (or window) is not done yet.
    Stay,
    Advance { next: i64, leaving_window: bool },
    Terminal,
}

/// Where the activity goes once its current stage is done.
pub fn decide(topo: &Topology<'_>) -> Decision {
    match topo.path.successor_of(topo.anchor()) {
        Some(next) => Decision::Advance {
            next,
            leaving_window: topo.in_window(),
        },
        None => Decision::Terminal,
    }
}

/// A status write the executor must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub target: TargetField,
    /// Stage id stamped on the audit row.
    pub stage_id: i64,
    pub status: Status,
    /// Status columns once the plan is applied (restarted on advance).
    pub after: ActivityState,
    pub decision: Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Planned {
    /// Target column already `Completed`; nothing to write.
    NoOp { target: TargetField },
    Write(Plan),
}

impl Planned {
    pub fn target(&self) -> TargetField {
        match self {
            Planned::NoOp { target } => *target,
            Planned::Write(plan) => plan.target,
        }
    }
}

/// Decide what `actor` writing `new_status` through `channel` does to an open activity.
pub fn plan(
    topo: &Topology<'_>,
    ctx: &ActivityCtx,
    actor: i64,
    channel: Channel,
    new_status: Status,
) -> Result<Planned, CoreError> {
    let target = dispatch::resolve_target(topo, ctx, actor, channel)?;
    if ctx.state.is_completed(target) {
        return Ok(Planned::NoOp { target });
    }

    let mut after = ctx.state;
    after.set(target, new_status);
    let decision = if new_status.is_completed() && stage_done(topo, &after) {
        decide(topo)
    } else {
        Decision::Stay
    };
    let stage_id = topo.stage_for(target).id;
    if let Decision::Advance { leaving_window, .. } = decision {
        after = after.entering_stage(leaving_window);
    }

    Ok(Planned::Write(Plan {
        target,
        stage_id,
        status: new_status,
        after,
        decision,
    }))
}

/// How a QC-answer batch relates to the activity's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QcScope {
    /// Answers for the stage the activity is at: run the transition.
    Current,
    /// Answers for a stage already passed (or the final stage of a completed
    /// activity): record them, leave the activity alone.
    Replay(i64),
}

pub fn qc_scope(topo: &Topology<'_>, completed: bool, stage_id: i64) -> Result<QcScope, CoreError> {
    let pos = topo.path.position(stage_id).ok_or_else(|| {
        CoreError::InvalidInput(format!(
            "QC answers reference stage {} which is not on the element's path",
            stage_id
        ))
    })?;
    let (lo, hi) = topo.current_span();
    if pos < lo || (completed && pos <= hi) {
        Ok(QcScope::Replay(stage_id))
    } else if pos > hi {
        Err(CoreError::ConflictingState(format!(
            "activity has not reached stage {} yet",
            stage_id
        )))
    } else {
        Ok(QcScope::Current)
    }
}

/// Answers filed with a live write belong to the stage whose column the write
/// lands on. Inside the window each QC user answers only for their own member.
pub fn check_answer_stage(
    topo: &Topology<'_>,
    target: TargetField,
    stage_id: i64,
) -> Result<(), CoreError> {
    let expected = topo.stage_for(target);
    if expected.id == stage_id {
        Ok(())
    } else {
        Err(CoreError::InvalidInput(format!(
            "answers for stage {} cannot be filed with a {} write on stage '{}'",
            stage_id,
            target.column(),
            expected.name
        )))
    }
}

/// A completed activity still only answers to the users bound to the stage (or
/// window members) it finished at.
pub fn authorize_closed(
    topo: &Topology<'_>,
    ctx: &ActivityCtx,
    actor: i64,
    channel: Channel,
) -> Result<(), CoreError> {
    let is = |user: Option<i64>| user == Some(actor);
    let finished_at = || std::iter::once(topo.current).chain(topo.window_members());
    let qc = is(ctx.qc_id) || finished_at().any(|s| is(s.qc_id));
    let crew = is(ctx.assigned_to) || finished_at().any(|s| is(s.assigned_to));
    let allowed = match channel {
        Channel::QcSubmission => qc,
        Channel::StatusUpdate => qc || crew,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied(format!(
            "user {} is neither assignee nor QC for stage '{}'",
            actor, topo.current.name
        )))
    }
}

/// Only the QC user of a passed stage may file late answers for it.
pub fn authorize_replay(topo: &Topology<'_>, stage_id: i64, actor: i64) -> Result<(), CoreError> {
    let stage = topo.registry.resolve(stage_id)?;
    if stage.qc_id == Some(actor) {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied(format!(
            "user {} is not the QC user for stage '{}'",
            actor, stage.name
        )))
    }
}

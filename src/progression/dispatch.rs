//! Authorization and dispatch: which status column an actor's write lands on.
//!
//! The ladder is a table of `(role, target)` rules evaluated in order. An actor
//! may hold several roles (e.g. assignee and QC of the same stage); the first
//! matching rule whose target is not yet `Completed` wins, and when every matching
//! target is already completed the first match is returned so the caller can treat
//! the write as a no-op.

use super::engine::Topology;
use super::registry::StageKind;
use super::status::{ActivityState, TargetField};
use crate::error::CoreError;

/// How the write arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// `POST /activities/{id}/status`: the whole ladder applies.
    StatusUpdate,
    /// `POST /activities/qc-answers`: only QC rules apply.
    QcSubmission,
}

/// Assignee/QC bindings carried on the activity row plus its status columns.
#[derive(Debug, Clone, Copy)]
pub struct ActivityCtx {
    pub assigned_to: Option<i64>,
    pub qc_id: Option<i64>,
    pub state: ActivityState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    MeshAssignee,
    ReinforcementAssignee,
    ReinforcementCrew,
    RegularQc,
    MeshQc,
    ReinforcementQc,
    RegularAssignee,
}

struct Rule {
    role: Role,
    target: TargetField,
}

const LADDER: [Rule; 7] = [
    Rule {
        role: Role::MeshAssignee,
        target: TargetField::MeshMoldStatus,
    },
    Rule {
        role: Role::ReinforcementAssignee,
        target: TargetField::ReinforcementStatus,
    },
    Rule {
        role: Role::ReinforcementCrew,
        target: TargetField::ReinforcementStatus,
    },
    Rule {
        role: Role::RegularQc,
        target: TargetField::QcStatus,
    },
    Rule {
        role: Role::MeshQc,
        target: TargetField::MeshMoldQcStatus,
    },
    Rule {
        role: Role::ReinforcementQc,
        target: TargetField::ReinforcementQcStatus,
    },
    Rule {
        role: Role::RegularAssignee,
        target: TargetField::Status,
    },
];

fn holds(role: Role, topo: &Topology<'_>, ctx: &ActivityCtx, actor: i64) -> bool {
    let is = |user: Option<i64>| user == Some(actor);
    let current_kind = topo.current.kind;
    match role {
        Role::MeshAssignee => topo.window_mesh().is_some_and(|s| {
            is(s.assigned_to) || (current_kind == StageKind::MeshMould && is(ctx.assigned_to))
        }),
        Role::ReinforcementAssignee => topo.window_reinforcement().is_some_and(|s| {
            current_kind == StageKind::Reinforcement
                && (is(s.assigned_to) || is(ctx.assigned_to))
        }),
        // Reinforcement crew may act on any activity inside the window, including
        // one whose stage_id is the Mesh & Mould stage.
        Role::ReinforcementCrew => topo
            .window_reinforcement()
            .is_some_and(|s| is(s.assigned_to)),
        Role::RegularQc => !topo.in_window() && is(ctx.qc_id),
        Role::MeshQc => {
            ctx.state.is_completed(TargetField::MeshMoldStatus)
                && topo.window_mesh().is_some_and(|s| {
                    is(s.qc_id) || (current_kind == StageKind::MeshMould && is(ctx.qc_id))
                })
        }
        Role::ReinforcementQc => {
            ctx.state.is_completed(TargetField::ReinforcementStatus)
                && topo.window_reinforcement().is_some_and(|s| {
                    is(s.qc_id) || (current_kind == StageKind::Reinforcement && is(ctx.qc_id))
                })
        }
        Role::RegularAssignee => !topo.in_window() && is(ctx.assigned_to),
    }
}

/// Resolve the status column `actor` may write on this activity.
pub fn resolve_target(
    topo: &Topology<'_>,
    ctx: &ActivityCtx,
    actor: i64,
    channel: Channel,
) -> Result<TargetField, CoreError> {
    let mut matching = LADDER.iter().filter(|rule| {
        (channel == Channel::StatusUpdate || rule.target.is_qc())
            && holds(rule.role, topo, ctx, actor)
    });
    let first = match matching.next() {
        Some(rule) => rule.target,
        None => return Err(denied(topo, ctx, actor, channel)),
    };
    if !ctx.state.is_completed(first) {
        return Ok(first);
    }
    Ok(matching
        .map(|rule| rule.target)
        .find(|t| !ctx.state.is_completed(*t))
        .unwrap_or(first))
}

fn denied(topo: &Topology<'_>, ctx: &ActivityCtx, actor: i64, channel: Channel) -> CoreError {
    let waiting_on_assignee = |stage: Option<&super::registry::StageInfo>, field| {
        stage.is_some_and(|s| s.qc_id == Some(actor)) && !ctx.state.is_completed(field)
    };
    if waiting_on_assignee(topo.window_mesh(), TargetField::MeshMoldStatus)
        || waiting_on_assignee(topo.window_reinforcement(), TargetField::ReinforcementStatus)
    {
        return CoreError::PermissionDenied(format!(
            "user {} cannot record QC on stage '{}' before the assignee completes it",
            actor, topo.current.name
        ));
    }
    match channel {
        Channel::QcSubmission => CoreError::PermissionDenied(format!(
            "user {} is not the QC user for stage '{}'",
            actor, topo.current.name
        )),
        Channel::StatusUpdate => CoreError::PermissionDenied(format!(
            "user {} is neither assignee nor QC for stage '{}'",
            actor, topo.current.name
        )),
    }
}

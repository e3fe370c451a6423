//! Scenario tests for the pure progression engine: dispatch ladder, skip rule,
//! QC gating, parallel join and the view projection.

use super::dispatch::resolve_target;
use super::engine::{
    authorize_closed, authorize_replay, check_answer_stage, plan, qc_scope, stage_done, QcScope,
};
use super::view::{project_activity, DisplayStatus};
use super::*;
use crate::db::ActivityRow;
use crate::error::CoreError;

const U1: i64 = 1;
const U2: i64 = 2;
const M: i64 = 3;
const R: i64 = 4;
const C: i64 = 5;
const Q1: i64 = 101;
const Q2: i64 = 102;
const QM: i64 = 103;
const QR: i64 = 104;
const QC: i64 = 105;
const STRANGER: i64 = 999;

fn stage(id: i64, name: &str, order: i32, assignee: i64, qc: Option<i64>) -> StageInfo {
    StageInfo {
        id,
        project_id: 1,
        name: name.to_string(),
        kind: StageKind::classify(name),
        order,
        assigned_to: Some(assignee),
        qc_assign: qc.is_some(),
        qc_id: qc,
        paper_id: None,
        completion_stage: false,
        inventory_deduction: false,
    }
}

struct Fixture {
    path: StagePath,
    registry: StageRegistry,
}

impl Fixture {
    fn new(stages: Vec<StageInfo>, path: Vec<i64>) -> Self {
        Fixture {
            path: StagePath::new(1, path).unwrap(),
            registry: StageRegistry::new(stages).unwrap(),
        }
    }

    fn topo(&self, at: i64) -> Topology<'_> {
        Topology::build(&self.path, &self.registry, at).unwrap()
    }

    /// Activity bindings as set when the activity entered `at`.
    fn ctx(&self, at: i64, state: ActivityState) -> ActivityCtx {
        let s = self.registry.get(at).unwrap();
        ActivityCtx {
            assigned_to: s.assigned_to,
            qc_id: s.qc_id,
            state,
        }
    }

    fn write(
        &self,
        at: i64,
        state: ActivityState,
        actor: i64,
        channel: Channel,
    ) -> Result<Planned, CoreError> {
        plan(
            &self.topo(at),
            &self.ctx(at, state),
            actor,
            channel,
            Status::Completed,
        )
    }
}

fn written(p: Result<Planned, CoreError>) -> Plan {
    match p {
        Ok(Planned::Write(plan)) => plan,
        other => panic!("expected a write, got {:?}", other),
    }
}

fn s1() -> Fixture {
    Fixture::new(vec![stage(10, "Casting", 1, U1, None)], vec![10])
}

fn s2() -> Fixture {
    let mut second = stage(20, "Finishing", 2, U2, Some(Q2));
    second.paper_id = Some(500);
    Fixture::new(vec![stage(10, "Casting", 1, U1, Some(Q1)), second], vec![10, 20])
}

fn s3() -> Fixture {
    Fixture::new(
        vec![
            stage(30, "Mesh & Mould", 3, M, Some(QM)),
            stage(40, "Reinforcement", 4, R, Some(QR)),
            stage(50, "Curing", 5, C, Some(QC)),
        ],
        vec![30, 40, 50],
    )
}

// ── Scenarios ───────────────────────────────────────────────────

#[test]
fn single_regular_stage_without_qc_is_terminal() {
    let fx = s1();
    let plan = written(fx.write(10, ActivityState::default(), U1, Channel::StatusUpdate));
    assert_eq!(plan.target, TargetField::Status);
    assert_eq!(plan.stage_id, 10);
    assert_eq!(plan.decision, Decision::Terminal);
}

#[test]
fn qc_gate_holds_until_qc_completes() {
    let fx = s2();
    let first = written(fx.write(10, ActivityState::default(), U1, Channel::StatusUpdate));
    assert_eq!(first.target, TargetField::Status);
    assert_eq!(first.decision, Decision::Stay);

    let second = written(fx.write(10, first.after, Q1, Channel::QcSubmission));
    assert_eq!(second.target, TargetField::QcStatus);
    assert_eq!(second.stage_id, 10);
    assert_eq!(
        second.decision,
        Decision::Advance {
            next: 20,
            leaving_window: false
        }
    );
    assert_eq!(second.after.status, Status::InProgress);
    assert_eq!(second.after.qc_status, Status::InProgress);
}

#[test]
fn parallel_window_joins_after_all_four_writes() {
    let fx = s3();
    let mut state = ActivityState::default();
    let steps = [
        (M, Channel::StatusUpdate, TargetField::MeshMoldStatus, 30),
        (R, Channel::StatusUpdate, TargetField::ReinforcementStatus, 40),
        (QM, Channel::QcSubmission, TargetField::MeshMoldQcStatus, 30),
    ];
    for (actor, channel, target, stage_id) in steps {
        let p = written(fx.write(30, state, actor, channel));
        assert_eq!(p.target, target);
        assert_eq!(p.stage_id, stage_id);
        assert_eq!(p.decision, Decision::Stay, "advanced early after {:?}", target);
        state = p.after;
    }

    let last = written(fx.write(30, state, QR, Channel::QcSubmission));
    assert_eq!(last.target, TargetField::ReinforcementQcStatus);
    assert_eq!(
        last.decision,
        Decision::Advance {
            next: 50,
            leaving_window: true
        }
    );
    assert_eq!(last.after.mesh_mold_status, None);
    assert_eq!(last.after.reinforcement_qc_status, None);
}

#[test]
fn reinforcement_crew_writes_on_mesh_stage_activity() {
    let fx = s3();
    let p = written(fx.write(30, ActivityState::default(), R, Channel::StatusUpdate));
    assert_eq!(p.target, TargetField::ReinforcementStatus);
    assert_eq!(p.decision, Decision::Stay);
    assert_eq!(p.after.reinforcement_status, Some(Status::Completed));
}

#[test]
fn repeated_completed_write_is_noop() {
    let fx = s2();
    let mut state = ActivityState::default();
    state.status = Status::Completed;
    assert_eq!(
        fx.write(20, state, U2, Channel::StatusUpdate).unwrap(),
        Planned::NoOp {
            target: TargetField::Status
        }
    );
}

#[test]
fn last_stage_of_longer_path_is_terminal() {
    let fx = Fixture::new(
        vec![
            stage(10, "Casting", 1, U1, None),
            stage(20, "Curing", 2, U2, None),
            stage(30, "Dispatch", 3, C, None),
        ],
        vec![10, 20, 30],
    );
    let p = written(fx.write(30, ActivityState::default(), C, Channel::StatusUpdate));
    assert_eq!(p.decision, Decision::Terminal);
}

// ── Ladder edges ────────────────────────────────────────────────

#[test]
fn first_stage_without_qc_advances_immediately() {
    let fx = Fixture::new(
        vec![stage(10, "Casting", 1, U1, None), stage(20, "Curing", 2, U2, None)],
        vec![10, 20],
    );
    let p = written(fx.write(10, ActivityState::default(), U1, Channel::StatusUpdate));
    assert!(matches!(p.decision, Decision::Advance { next: 20, .. }));
}

#[test]
fn in_progress_write_never_advances() {
    let fx = s1();
    let p = plan(
        &fx.topo(10),
        &fx.ctx(10, ActivityState::default()),
        U1,
        Channel::StatusUpdate,
        Status::InProgress,
    )
    .unwrap();
    match p {
        Planned::Write(plan) => assert_eq!(plan.decision, Decision::Stay),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn stranger_is_denied() {
    let fx = s3();
    let err = fx
        .write(30, ActivityState::default(), STRANGER, Channel::StatusUpdate)
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[test]
fn assignee_cannot_use_qc_channel() {
    let fx = s2();
    let err = fx
        .write(10, ActivityState::default(), U1, Channel::QcSubmission)
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[test]
fn window_qc_waits_for_its_crew() {
    let fx = s3();
    let err = fx
        .write(30, ActivityState::default(), QM, Channel::QcSubmission)
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(m) if m.contains("before the assignee")));
}

#[test]
fn reinforcement_exception_only_inside_window() {
    let fx = Fixture::new(
        vec![
            stage(10, "Casting", 1, U1, None),
            stage(30, "Mesh & Mould", 2, M, None),
            stage(40, "Reinforcement", 3, R, None),
        ],
        vec![10, 30, 40],
    );
    let err = fx
        .write(10, ActivityState::default(), R, Channel::StatusUpdate)
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[test]
fn reinforcement_exception_needs_stage_on_path() {
    let fx = Fixture::new(
        vec![
            stage(30, "Mesh & Mould", 1, M, None),
            stage(40, "Reinforcement", 2, R, None),
            stage(50, "Curing", 3, C, None),
        ],
        vec![30, 50],
    );
    let err = fx
        .write(30, ActivityState::default(), R, Channel::StatusUpdate)
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[test]
fn degenerate_window_gated_by_present_member_alone() {
    let fx = Fixture::new(
        vec![
            stage(30, "Mesh & Mould", 1, M, Some(QM)),
            stage(50, "Curing", 2, C, None),
        ],
        vec![30, 50],
    );
    let first = written(fx.write(30, ActivityState::default(), M, Channel::StatusUpdate));
    assert_eq!(first.decision, Decision::Stay);
    let second = written(fx.write(30, first.after, QM, Channel::QcSubmission));
    assert_eq!(
        second.decision,
        Decision::Advance {
            next: 50,
            leaving_window: true
        }
    );
}

#[test]
fn window_entered_at_reinforcement_anchors_on_later_member() {
    let fx = Fixture::new(
        vec![
            stage(40, "Reinforcement", 1, R, None),
            stage(30, "Mesh & Mould", 2, M, None),
            stage(50, "Curing", 3, C, None),
        ],
        vec![40, 30, 50],
    );
    let topo = fx.topo(40);
    assert_eq!(topo.anchor(), 30);
    let first = written(fx.write(40, ActivityState::default(), R, Channel::StatusUpdate));
    assert_eq!(first.target, TargetField::ReinforcementStatus);
    let second = written(fx.write(40, first.after, M, Channel::StatusUpdate));
    assert!(matches!(second.decision, Decision::Advance { next: 50, .. }));
}

#[test]
fn dual_role_user_fills_both_columns() {
    let fx = Fixture::new(
        vec![stage(10, "Casting", 1, U1, Some(U1)), stage(20, "Curing", 2, U2, None)],
        vec![10, 20],
    );
    let first = written(fx.write(10, ActivityState::default(), U1, Channel::StatusUpdate));
    assert_eq!(first.decision, Decision::Stay);
    let second = written(fx.write(10, first.after, U1, Channel::StatusUpdate));
    assert_ne!(first.target, second.target);
    assert!(matches!(second.decision, Decision::Advance { next: 20, .. }));
    let mut both = ActivityState::default();
    both.status = Status::Completed;
    both.qc_status = Status::Completed;
    assert_eq!(
        fx.write(10, both, U1, Channel::StatusUpdate).unwrap(),
        Planned::NoOp {
            target: TargetField::QcStatus
        }
    );
}

#[test]
fn completed_crew_column_falls_through_to_qc() {
    let fx = Fixture::new(
        vec![
            stage(30, "Mesh & Mould", 1, M, Some(M)),
            stage(40, "Reinforcement", 2, R, None),
        ],
        vec![30, 40],
    );
    let mut state = ActivityState::default();
    state.mesh_mold_status = Some(Status::Completed);
    let target = resolve_target(&fx.topo(30), &fx.ctx(30, state), M, Channel::StatusUpdate).unwrap();
    assert_eq!(target, TargetField::MeshMoldQcStatus);
}

#[test]
fn stage_done_requires_qc_only_where_assigned() {
    let fx = s3();
    let topo = fx.topo(30);
    let mut state = ActivityState::default();
    state.mesh_mold_status = Some(Status::Completed);
    state.reinforcement_status = Some(Status::Completed);
    assert!(!stage_done(&topo, &state));
    state.mesh_mold_qc_status = Some(Status::Completed);
    state.reinforcement_qc_status = Some(Status::Completed);
    assert!(stage_done(&topo, &state));
}

#[test]
fn topology_rejects_stage_off_path() {
    let fx = s2();
    let path = StagePath::new(1, vec![20]).unwrap();
    let err = Topology::build(&path, &fx.registry, 10).unwrap_err();
    assert!(matches!(err, CoreError::Configuration(_)));
}

// ── QC replay ───────────────────────────────────────────────────

#[test]
fn qc_scope_classifies_answer_stage() {
    let fx = Fixture::new(
        vec![
            stage(10, "Casting", 1, U1, Some(Q1)),
            stage(20, "Curing", 2, U2, Some(Q2)),
            stage(30, "Dispatch", 3, C, None),
        ],
        vec![10, 20, 30],
    );
    let topo = fx.topo(20);
    assert_eq!(qc_scope(&topo, false, 10).unwrap(), QcScope::Replay(10));
    assert_eq!(qc_scope(&topo, false, 20).unwrap(), QcScope::Current);
    assert!(matches!(
        qc_scope(&topo, false, 30),
        Err(CoreError::ConflictingState(_))
    ));
    assert!(matches!(
        qc_scope(&topo, false, 77),
        Err(CoreError::InvalidInput(_))
    ));
    assert_eq!(qc_scope(&fx.topo(30), true, 30).unwrap(), QcScope::Replay(30));

    assert!(authorize_replay(&topo, 10, Q1).is_ok());
    assert!(matches!(
        authorize_replay(&topo, 10, Q2),
        Err(CoreError::PermissionDenied(_))
    ));
}

#[test]
fn qc_scope_treats_both_window_members_as_current() {
    let fx = s3();
    let topo = fx.topo(30);
    assert_eq!(qc_scope(&topo, false, 40).unwrap(), QcScope::Current);
    assert_eq!(qc_scope(&topo, false, 30).unwrap(), QcScope::Current);
}

#[test]
fn window_answers_must_match_the_qc_column_written() {
    let fx = s3();
    let topo = fx.topo(30);
    let mut state = ActivityState::default();
    state.mesh_mold_status = Some(Status::Completed);
    state.reinforcement_status = Some(Status::Completed);

    let p = written(fx.write(30, state, QR, Channel::QcSubmission));
    assert_eq!(p.target, TargetField::ReinforcementQcStatus);
    assert!(check_answer_stage(&topo, p.target, 40).is_ok());
    assert!(matches!(
        check_answer_stage(&topo, p.target, 30),
        Err(CoreError::InvalidInput(_))
    ));
    assert!(check_answer_stage(&topo, TargetField::MeshMoldQcStatus, 30).is_ok());
}

#[test]
fn closed_activity_only_answers_to_its_final_stage_users() {
    let fx = s2();
    let topo = fx.topo(20);
    let ctx = fx.ctx(20, ActivityState::default());
    assert!(authorize_closed(&topo, &ctx, U2, Channel::StatusUpdate).is_ok());
    assert!(authorize_closed(&topo, &ctx, Q2, Channel::QcSubmission).is_ok());
    assert!(matches!(
        authorize_closed(&topo, &ctx, U2, Channel::QcSubmission),
        Err(CoreError::PermissionDenied(_))
    ));
    assert!(matches!(
        authorize_closed(&topo, &ctx, U1, Channel::StatusUpdate),
        Err(CoreError::PermissionDenied(_))
    ));
    assert!(matches!(
        authorize_closed(&topo, &ctx, STRANGER, Channel::StatusUpdate),
        Err(CoreError::PermissionDenied(_))
    ));
}

#[test]
fn closed_window_accepts_either_crew() {
    let fx = Fixture::new(
        vec![
            stage(30, "Mesh & Mould", 1, M, Some(QM)),
            stage(40, "Reinforcement", 2, R, Some(QR)),
        ],
        vec![30, 40],
    );
    let topo = fx.topo(30);
    let ctx = fx.ctx(30, ActivityState::default());
    assert!(authorize_closed(&topo, &ctx, R, Channel::StatusUpdate).is_ok());
    assert!(authorize_closed(&topo, &ctx, QR, Channel::QcSubmission).is_ok());
    assert!(authorize_closed(&topo, &ctx, STRANGER, Channel::StatusUpdate).is_err());
}

// ── View projection ─────────────────────────────────────────────

fn activity_at(stage_id: i64, state: &ActivityState, assigned_to: i64) -> ActivityRow {
    let now = chrono::Utc::now();
    let text = |s: Option<Status>| s.map(|s| s.as_str().to_string());
    ActivityRow {
        id: 1,
        task_id: 1,
        project_id: 1,
        element_id: 9,
        element_type_id: 1,
        floor_id: None,
        stage_id,
        assigned_to: Some(assigned_to),
        qc_id: None,
        paper_id: None,
        stockyard_id: None,
        status: state.status.as_str().into(),
        qc_status: state.qc_status.as_str().into(),
        mesh_mold_status: text(state.mesh_mold_status),
        mesh_mold_qc_status: text(state.mesh_mold_qc_status),
        reinforcement_status: text(state.reinforcement_status),
        reinforcement_qc_status: text(state.reinforcement_qc_status),
        completed: false,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn view_marks_window_members_current() {
    let fx = s3();
    let mut state = ActivityState::default();
    state.mesh_mold_status = Some(Status::Completed);
    let view = project_activity(&activity_at(30, &state, M), &fx.path, &fx.registry, R).unwrap();

    let by_id = |id: i64| view.stages.iter().find(|s| s.stage_id == id).unwrap();
    assert_eq!(by_id(30).status, DisplayStatus::Completed);
    assert_eq!(by_id(30).qc, DisplayStatus::InProgress);
    assert_eq!(by_id(40).status, DisplayStatus::InProgress);
    assert_eq!(by_id(50).status, DisplayStatus::Pending);
    assert_eq!(by_id(50).qc, DisplayStatus::Pending);
    assert_eq!(by_id(40).previous_stage_id, Some(30));

    // Reinforcement crew may edit both window members but nothing downstream.
    assert!(by_id(30).editable);
    assert!(by_id(40).editable);
    assert!(!by_id(50).editable);
}

#[test]
fn view_past_stages_completed_and_qc_editable_for_qc_user() {
    let fx = s2();
    let view = project_activity(
        &activity_at(20, &ActivityState::default(), U2),
        &fx.path,
        &fx.registry,
        Q2,
    )
    .unwrap();
    assert_eq!(view.stages[0].status, DisplayStatus::Completed);
    assert_eq!(view.stages[0].qc, DisplayStatus::Completed);
    assert_eq!(view.stages[1].status, DisplayStatus::InProgress);
    assert!(view.stages[1].qc_editable);
    assert!(!view.stages[1].editable);
    assert!(!view.stages[0].qc_editable);
}

#[test]
fn view_qc_editable_only_on_current_stage() {
    let fx = s2();
    let view = project_activity(
        &activity_at(10, &ActivityState::default(), U1),
        &fx.path,
        &fx.registry,
        Q2,
    )
    .unwrap();
    assert_eq!(view.stages[1].qc, DisplayStatus::Pending);
    assert!(!view.stages[1].qc_editable);
}

#[test]
fn view_reports_not_required_qc() {
    let fx = s1();
    let view = project_activity(
        &activity_at(10, &ActivityState::default(), U1),
        &fx.path,
        &fx.registry,
        U1,
    )
    .unwrap();
    assert_eq!(view.stages[0].qc, DisplayStatus::NotRequired);
    assert!(view.stages[0].editable);
}

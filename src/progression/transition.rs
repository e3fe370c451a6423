//! Transition executor.
//!
//! One call to [`Engine::submit`] is one database transaction:
//!
//! ```text
//! BEGIN; SET LOCAL statement_timeout
//!   lock activity (SELECT … FOR UPDATE)
//!   load path + project stages → Topology
//!   replay / completed checks
//!   plan (dispatch + skip rule + done predicate)
//!   insert QC answers, write status column, append audit row
//!   advance (element + activity rebinding) or terminal (stock, completed, element released)
//! COMMIT
//! publish notification intents
//! ```
//!
//! A deadlock or serialization failure is retried once from the top.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::dispatch::{ActivityCtx, Channel};
use super::engine::{self, Decision, Planned, QcScope, Topology};
use super::path::StagePath;
use super::registry::{StageInfo, StageRegistry};
use super::status::{Status, TargetField};
use crate::db::activities::{self, StageBinding};
use crate::db::{production, projects, qc_answers, stages, stock};
use crate::db::{ActivityRow, Database, NewProductionEvent, NewQcAnswer};
use crate::error::{CoreError, CoreResult};
use crate::events::{ActivityContext, Event, NotificationIntent, Outbox};
use crate::prom_metrics::Metrics;

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub activity_id: i64,
    pub actor: i64,
    pub new_status: Status,
    pub channel: Channel,
    pub answers: Vec<NewQcAnswer>,
}

impl TransitionRequest {
    /// QC submissions always close the QC side of a stage.
    fn validate(&self) -> CoreResult<()> {
        if self.channel == Channel::QcSubmission && !self.new_status.is_completed() {
            return Err(CoreError::InvalidInput(
                "QC submissions must carry status Completed".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NoOp,
    Waiting {
        target: TargetField,
    },
    Advanced {
        from_stage_id: i64,
        to_stage_id: i64,
    },
    Terminal {
        stockyard_id: Option<i64>,
    },
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::NoOp => "noop",
            Outcome::Waiting { .. } => "waiting",
            Outcome::Advanced { .. } => "advanced",
            Outcome::Terminal { .. } => "terminal",
        }
    }
}

/// Response body of a transition: `{message, outcome, new_state?}`.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub message: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub answers_recorded: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<ActivityRow>,
}

impl TransitionReport {
    fn no_op(message: impl Into<String>, answers_recorded: u64) -> Self {
        TransitionReport {
            message: message.into(),
            outcome: Outcome::NoOp,
            answers_recorded,
            new_state: None,
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    db: Database,
    outbox: Outbox,
    metrics: Arc<Metrics>,
    statement_timeout_ms: u64,
    public_base_url: String,
}

impl Engine {
    pub fn new(
        db: Database,
        outbox: Outbox,
        metrics: Arc<Metrics>,
        statement_timeout_ms: u64,
        public_base_url: impl Into<String>,
    ) -> Self {
        Engine {
            db,
            outbox,
            metrics,
            statement_timeout_ms,
            public_base_url: public_base_url.into(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Apply one status write or QC submission.
    pub async fn submit(&self, req: &TransitionRequest) -> CoreResult<TransitionReport> {
        let span = tracing::info_span!(
            "transition",
            activity_id = req.activity_id,
            actor = req.actor,
            channel = ?req.channel,
        );
        async move {
            let result = match self.execute(req).await {
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "transition aborted by the database, retrying once");
                    self.execute(req).await
                }
                other => other,
            };
            match result {
                Ok((report, intents)) => {
                    self.metrics.record_transition(report.outcome.label());
                    info!(outcome = report.outcome.label(), intents = intents.len(), "transition committed");
                    self.outbox.publish(intents);
                    Ok(report)
                }
                Err(e) => {
                    let label = match e {
                        CoreError::Configuration(_)
                        | CoreError::Transient(_)
                        | CoreError::Internal(_) => "failed",
                        _ => "rejected",
                    };
                    self.metrics.record_transition(label);
                    warn!(kind = e.kind(), error = %e, "transition failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        req: &TransitionRequest,
    ) -> CoreResult<(TransitionReport, Vec<NotificationIntent>)> {
        req.validate()?;
        let mut tx = self.db.pool().begin().await?;
        // SET does not take bind parameters; the value is a u64.
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;

        let activity = activities::lock_activity(&mut tx, req.activity_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("activity {}", req.activity_id)))?;
        let answered_stage = check_answers(&activity, &req.answers)?;

        let stage_ids = stages::fetch_stage_path(&mut tx, activity.element_type_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "stage path for element type {}",
                    activity.element_type_id
                ))
            })?;
        let path = StagePath::new(activity.element_type_id, stage_ids)?;
        let registry = StageRegistry::new(
            stages::fetch_project_stages(&mut tx, activity.project_id)
                .await?
                .into_iter()
                .map(StageInfo::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        )?;
        let topo = Topology::build(&path, &registry, activity.stage_id)?;

        if let Some(stage_id) = answered_stage {
            if let QcScope::Replay(stage_id) = engine::qc_scope(&topo, activity.completed, stage_id)? {
                engine::authorize_replay(&topo, stage_id, req.actor)?;
                let n = qc_answers::insert_qc_answers(&mut tx, &activity, req.actor, &req.answers)
                    .await?;
                tx.commit().await?;
                info!(stage_id, answers = n, "QC answers recorded for a passed stage");
                return Ok((
                    TransitionReport::no_op("QC answers recorded; stage already passed", n),
                    Vec::new(),
                ));
            }
        }

        let ctx = ActivityCtx {
            assigned_to: activity.assigned_to,
            qc_id: activity.qc_id,
            state: activity.state()?,
        };
        if activity.completed {
            engine::authorize_closed(&topo, &ctx, req.actor, req.channel)?;
            return match req.new_status {
                Status::Completed => Ok((
                    TransitionReport::no_op("Activity already completed", 0),
                    Vec::new(),
                )),
                Status::InProgress => Err(CoreError::ConflictingState(format!(
                    "activity {} is completed",
                    activity.id
                ))),
            };
        }

        let planned = engine::plan(&topo, &ctx, req.actor, req.channel, req.new_status)?;
        if let Some(stage_id) = answered_stage {
            engine::check_answer_stage(&topo, planned.target(), stage_id)?;
        }
        let plan = match planned {
            Planned::NoOp { target } => {
                let mut n = 0;
                if !req.answers.is_empty() {
                    n = qc_answers::insert_qc_answers(&mut tx, &activity, req.actor, &req.answers)
                        .await?;
                    tx.commit().await?;
                }
                return Ok((
                    TransitionReport::no_op(format!("{} already Completed", target.column()), n),
                    Vec::new(),
                ));
            }
            Planned::Write(plan) => plan,
        };

        let answers_recorded = if req.answers.is_empty() {
            0
        } else {
            qc_answers::insert_qc_answers(&mut tx, &activity, req.actor, &req.answers).await?
        };
        activities::write_status_field(&mut tx, activity.id, plan.target, plan.status).await?;
        production::append_production_event(
            &mut tx,
            &NewProductionEvent {
                task_id: activity.task_id,
                activity_id: activity.id,
                project_id: activity.project_id,
                element_id: activity.element_id,
                element_type_id: activity.element_type_id,
                floor_id: activity.floor_id,
                stage_id: plan.stage_id,
                user_id: req.actor,
                status: plan.status.as_str().to_string(),
            },
        )
        .await?;
        info!(
            field = plan.target.column(),
            status = %plan.status,
            stage_id = plan.stage_id,
            "status written"
        );

        let labels = projects::fetch_labels(
            &mut tx,
            activity.project_id,
            activity.task_id,
            activity.element_type_id,
        )
        .await?;
        let actx = ActivityContext {
            project_id: activity.project_id,
            project_name: labels.project_name,
            task_name: labels.task_name,
            activity_id: activity.id,
            activity_name: ActivityContext::activity_name(
                &labels.element_type_name,
                activity.element_id,
            ),
        };

        let mut events = Vec::new();
        let next_stage = match plan.decision {
            Decision::Advance { next, .. } => Some(registry.resolve(next)?),
            _ => None,
        };
        if plan.target.is_qc() && plan.status.is_completed() {
            let checked = topo.stage_for(plan.target);
            if let Some(recipient) = next_stage.and_then(|s| s.qc_id).or(checked.qc_id) {
                events.push(Event::QcCompleted {
                    ctx: actx.clone(),
                    recipient,
                    stage_name: checked.name.clone(),
                });
            }
        }

        let (outcome, message) = match (plan.decision, next_stage) {
            (Decision::Advance { leaving_window, .. }, Some(next)) => {
                activities::set_element_stage(&mut tx, activity.element_id, &next.name).await?;
                activities::move_to_stage(
                    &mut tx,
                    activity.id,
                    StageBinding {
                        stage_id: next.id,
                        assigned_to: next.assigned_to,
                        qc_id: next.qc_id,
                        paper_id: next.paper_id,
                    },
                    leaving_window,
                )
                .await?;
                info!(from = activity.stage_id, to = next.id, leaving_window, "activity advanced");
                if let Some(recipient) = next.assigned_to {
                    events.push(Event::StageAdvanced {
                        ctx: actx.clone(),
                        recipient,
                        next_stage_name: next.name.clone(),
                    });
                }
                (
                    Outcome::Advanced {
                        from_stage_id: activity.stage_id,
                        to_stage_id: next.id,
                    },
                    format!("Moved to stage {}", next.name),
                )
            }
            (Decision::Terminal, _) => {
                let inserted = stock::insert_precast_stock(
                    &mut tx,
                    activity.element_id,
                    activity.project_id,
                    activity.stockyard_id,
                )
                .await?;
                if !inserted {
                    warn!(element_id = activity.element_id, "element already in precast stock");
                }
                activities::mark_completed(&mut tx, activity.id).await?;
                activities::release_element(&mut tx, activity.element_id).await?;
                info!(stockyard_id = ?activity.stockyard_id, "activity completed");
                if let Some(yard) = activity.stockyard_id {
                    if let Some(manager) = projects::fetch_stockyard_manager(&mut tx, yard).await? {
                        events.push(Event::ElementStocked {
                            ctx: actx.clone(),
                            recipient: manager,
                            stockyard_id: yard,
                        });
                    }
                }
                (
                    Outcome::Terminal {
                        stockyard_id: activity.stockyard_id,
                    },
                    "Production completed; element moved to precast stock".to_string(),
                )
            }
            _ => (
                Outcome::Waiting {
                    target: plan.target,
                },
                format!("{} set to {}", plan.target.column(), plan.status),
            ),
        };

        let new_state = activities::fetch_activity(&mut tx, activity.id).await?;
        tx.commit().await?;

        let intents = events
            .into_iter()
            .map(|e| e.into_intent(&self.public_base_url))
            .collect();
        Ok((
            TransitionReport {
                message,
                outcome,
                answers_recorded,
                new_state,
            },
            intents,
        ))
    }
}

/// Answers must belong to the activity's project and task and name one stage.
/// Returns that stage.
fn check_answers(activity: &ActivityRow, answers: &[NewQcAnswer]) -> CoreResult<Option<i64>> {
    let Some(first) = answers.first() else {
        return Ok(None);
    };
    for answer in answers {
        if answer.project_id != activity.project_id || answer.task_id != activity.task_id {
            return Err(CoreError::InvalidInput(format!(
                "answer to question {} is scoped to project {} / task {}, activity {} belongs to project {} / task {}",
                answer.question_id,
                answer.project_id,
                answer.task_id,
                activity.id,
                activity.project_id,
                activity.task_id
            )));
        }
        if answer.stage_id != first.stage_id {
            return Err(CoreError::InvalidInput(
                "all answers in one submission must target the same stage".into(),
            ));
        }
    }
    Ok(Some(first.stage_id))
}

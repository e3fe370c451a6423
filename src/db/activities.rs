//! Activity, task and element rows.
//!
//! The transition writes (`write_status_field`, `move_to_stage`, `mark_completed`,
//! `set_element_stage`) run on the caller's transaction after the activity row
//! has been locked with [`lock_activity`].

use anyhow::Result;
use sqlx::PgConnection;

use super::{ActivityRow, Database, ElementRow, TaskRow};
use crate::progression::{Status, TargetField};

const ACTIVITY_SELECT: &str = "SELECT a.id, a.task_id, a.project_id, a.element_id,
        t.element_type_id, t.floor_id, a.stage_id, a.assigned_to, a.qc_id, a.paper_id,
        a.stockyard_id, a.status, a.qc_status, a.mesh_mold_status, a.mesh_mold_qc_status,
        a.reinforcement_status, a.reinforcement_qc_status, a.completed,
        a.created_at, a.updated_at
     FROM activity a
     JOIN task t ON t.task_id = a.task_id";

const TASK_COLUMNS: &str =
    "task_id, project_id, name, element_type_id, floor_id, start_stage_id, assigned_to";

/// Load an activity and take a row lock on it for the rest of the transaction.
pub async fn lock_activity(
    conn: &mut PgConnection,
    activity_id: i64,
) -> sqlx::Result<Option<ActivityRow>> {
    sqlx::query_as::<_, ActivityRow>(&format!(
        "{} WHERE a.id = $1 FOR UPDATE OF a",
        ACTIVITY_SELECT
    ))
    .bind(activity_id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_activity(
    conn: &mut PgConnection,
    activity_id: i64,
) -> sqlx::Result<Option<ActivityRow>> {
    sqlx::query_as::<_, ActivityRow>(&format!("{} WHERE a.id = $1", ACTIVITY_SELECT))
        .bind(activity_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_task(conn: &mut PgConnection, task_id: i64) -> sqlx::Result<Option<TaskRow>> {
    sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {} FROM task WHERE task_id = $1",
        TASK_COLUMNS
    ))
    .bind(task_id)
    .fetch_optional(conn)
    .await
}

pub async fn lock_element(
    conn: &mut PgConnection,
    element_id: i64,
) -> sqlx::Result<Option<ElementRow>> {
    sqlx::query_as::<_, ElementRow>(
        "SELECT id, project_id, element_type_id, element_code, instage, status
         FROM element WHERE id = $1 FOR UPDATE",
    )
    .bind(element_id)
    .fetch_optional(conn)
    .await
}

/// Fields bound onto a new or advancing activity from its stage.
#[derive(Debug, Clone, Copy)]
pub struct StageBinding {
    pub stage_id: i64,
    pub assigned_to: Option<i64>,
    pub qc_id: Option<i64>,
    pub paper_id: Option<i64>,
}

/// Insert a fresh activity at `binding.stage_id`. Fails with a unique violation
/// when the element already has an open activity in the project.
pub async fn insert_activity(
    conn: &mut PgConnection,
    task: &TaskRow,
    element_id: i64,
    binding: StageBinding,
    stockyard_id: Option<i64>,
) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "INSERT INTO activity (task_id, project_id, element_id, stage_id,
                               assigned_to, qc_id, paper_id, stockyard_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id",
    )
    .bind(task.task_id)
    .bind(task.project_id)
    .bind(element_id)
    .bind(binding.stage_id)
    .bind(binding.assigned_to)
    .bind(binding.qc_id)
    .bind(binding.paper_id)
    .bind(stockyard_id)
    .fetch_one(conn)
    .await
}

/// Element display status tracks the stage name; `instage` marks it as in production.
pub async fn set_element_stage(
    conn: &mut PgConnection,
    element_id: i64,
    stage_name: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE element SET status = $2, instage = true, updated_at = now() WHERE id = $1",
    )
    .bind(element_id)
    .bind(stage_name)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn write_status_field(
    conn: &mut PgConnection,
    activity_id: i64,
    field: TargetField,
    status: Status,
) -> sqlx::Result<()> {
    // Column names come from a closed enum.
    sqlx::query(&format!(
        "UPDATE activity SET {} = $2, updated_at = now() WHERE id = $1 AND NOT completed",
        field.column()
    ))
    .bind(activity_id)
    .bind(status.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

/// Rebind the activity to the next stage and restart its status columns.
pub async fn move_to_stage(
    conn: &mut PgConnection,
    activity_id: i64,
    binding: StageBinding,
    leaving_window: bool,
) -> sqlx::Result<()> {
    let clear_sub_stages = if leaving_window {
        ", mesh_mold_status = NULL, mesh_mold_qc_status = NULL,
           reinforcement_status = NULL, reinforcement_qc_status = NULL"
    } else {
        ""
    };
    sqlx::query(&format!(
        "UPDATE activity
         SET stage_id = $2, assigned_to = $3, qc_id = $4, paper_id = $5,
             status = 'InProgress', qc_status = 'InProgress', updated_at = now(){}
         WHERE id = $1 AND NOT completed",
        clear_sub_stages
    ))
    .bind(activity_id)
    .bind(binding.stage_id)
    .bind(binding.assigned_to)
    .bind(binding.qc_id)
    .bind(binding.paper_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Terminal hand-off: the element leaves the pipeline and becomes billable.
pub async fn release_element(conn: &mut PgConnection, element_id: i64) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE element SET instage = false, billable = true, updated_at = now() WHERE id = $1",
    )
    .bind(element_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn mark_completed(conn: &mut PgConnection, activity_id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE activity SET completed = true, updated_at = now() WHERE id = $1")
        .bind(activity_id)
        .execute(conn)
        .await?;
    Ok(())
}

impl Database {
    pub async fn get_activity(&self, activity_id: i64) -> Result<Option<ActivityRow>> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_activity(&mut conn, activity_id).await?)
    }

    /// Open activities of a project, oldest first.
    pub async fn get_active_activities(&self, project_id: i64) -> Result<Vec<ActivityRow>> {
        let rows = sqlx::query_as::<_, ActivityRow>(&format!(
            "{} WHERE a.project_id = $1 AND NOT a.completed ORDER BY a.id",
            ACTIVITY_SELECT
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

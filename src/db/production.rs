//! `complete_production`: append-only audit log of status writes.
//!
//! Rows are only ever inserted. `updated_at` is the transaction timestamp, so all
//! events written by one transition share it; `id` breaks the tie.

use anyhow::Result;
use sqlx::PgConnection;

use super::{Database, NewProductionEvent, ProductionEventRow};

const EVENT_COLUMNS: &str = "id, task_id, activity_id, project_id, element_id, element_type_id,
                             floor_id, stage_id, user_id, status, started_at, updated_at";

pub async fn append_production_event(
    conn: &mut PgConnection,
    event: &NewProductionEvent,
) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "INSERT INTO complete_production
            (task_id, activity_id, project_id, element_id, element_type_id, floor_id,
             stage_id, user_id, status, started_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now())
         RETURNING id",
    )
    .bind(event.task_id)
    .bind(event.activity_id)
    .bind(event.project_id)
    .bind(event.element_id)
    .bind(event.element_type_id)
    .bind(event.floor_id)
    .bind(event.stage_id)
    .bind(event.user_id)
    .bind(&event.status)
    .fetch_one(conn)
    .await
}

impl Database {
    /// Events written by `user_id` in a project, newest first.
    pub async fn get_production_history(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> Result<Vec<ProductionEventRow>> {
        let rows = sqlx::query_as::<_, ProductionEventRow>(&format!(
            "SELECT {} FROM complete_production
             WHERE project_id = $1 AND user_id = $2
             ORDER BY updated_at DESC, id DESC",
            EVENT_COLUMNS
        ))
        .bind(project_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// All events of one activity in write order.
    pub async fn get_activity_history(&self, activity_id: i64) -> Result<Vec<ProductionEventRow>> {
        let rows = sqlx::query_as::<_, ProductionEventRow>(&format!(
            "SELECT {} FROM complete_production
             WHERE activity_id = $1
             ORDER BY updated_at, id",
            EVENT_COLUMNS
        ))
        .bind(activity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

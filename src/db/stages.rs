//! Project stages and element-type stage paths.
//!
//! `element_type_path.stage_path` is a `BIGINT[]`, decoded straight into
//! `Vec<i64>`; ordering is the array order.

use anyhow::Result;
use sqlx::PgConnection;
use std::collections::HashMap;

use super::{Database, StageRow};

const STAGE_COLUMNS: &str = "id, project_id, name, kind, stage_order, assigned_to, qc_assign,
                             qc_id, paper_id, completion_stage, inventory_deduction";

/// All stages of a project, ordered by `stage_order`.
pub async fn fetch_project_stages(
    conn: &mut PgConnection,
    project_id: i64,
) -> sqlx::Result<Vec<StageRow>> {
    sqlx::query_as::<_, StageRow>(&format!(
        "SELECT {} FROM project_stages WHERE project_id = $1 ORDER BY stage_order",
        STAGE_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(conn)
    .await
}

/// The stage ids of an element type, or `None` when it has no path row.
pub async fn fetch_stage_path(
    conn: &mut PgConnection,
    element_type_id: i64,
) -> sqlx::Result<Option<Vec<i64>>> {
    sqlx::query_scalar::<_, Vec<i64>>(
        "SELECT stage_path FROM element_type_path WHERE element_type_id = $1",
    )
    .bind(element_type_id)
    .fetch_optional(conn)
    .await
}

impl Database {
    pub async fn get_project_stages(&self, project_id: i64) -> Result<Vec<StageRow>> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_project_stages(&mut conn, project_id).await?)
    }

    /// Stage paths for several element types at once, keyed by element type.
    pub async fn get_stage_paths(&self, element_type_ids: &[i64]) -> Result<HashMap<i64, Vec<i64>>> {
        let rows: Vec<(i64, Vec<i64>)> = sqlx::query_as(
            "SELECT element_type_id, stage_path FROM element_type_path
             WHERE element_type_id = ANY($1)",
        )
        .bind(element_type_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

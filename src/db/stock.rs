//! PrecastStock: elements that have left the last stage of their path.

use anyhow::Result;
use sqlx::PgConnection;

use super::{Database, PrecastStockRow};

/// Record an element as produced. Returns `false` when it was already recorded
/// for the project.
pub async fn insert_precast_stock(
    conn: &mut PgConnection,
    element_id: i64,
    project_id: i64,
    stockyard_id: Option<i64>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "INSERT INTO precast_stock (element_id, project_id, stockyard_id, stockyard)
         VALUES ($1, $2, $3, false)
         ON CONFLICT (element_id, project_id) DO NOTHING",
    )
    .bind(element_id)
    .bind(project_id)
    .bind(stockyard_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

impl Database {
    pub async fn get_precast_stock(&self, project_id: i64) -> Result<Vec<PrecastStockRow>> {
        let rows = sqlx::query_as::<_, PrecastStockRow>(
            "SELECT id, element_id, project_id, stockyard_id, stockyard, created_at
             FROM precast_stock WHERE project_id = $1 ORDER BY id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

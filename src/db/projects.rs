//! Project-level lookups used to label notifications.

use anyhow::Result;
use sqlx::PgConnection;

use super::Database;

/// Display names attached to notification intents.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct Labels {
    pub project_name: String,
    pub task_name: String,
    pub element_type_name: String,
}

pub async fn fetch_labels(
    conn: &mut PgConnection,
    project_id: i64,
    task_id: i64,
    element_type_id: i64,
) -> sqlx::Result<Labels> {
    let labels = sqlx::query_as::<_, Labels>(
        "SELECT COALESCE((SELECT name FROM projects WHERE id = $1), '') AS project_name,
                COALESCE((SELECT name FROM task WHERE task_id = $2), '') AS task_name,
                COALESCE((SELECT name FROM element_type WHERE id = $3), '') AS element_type_name",
    )
    .bind(project_id)
    .bind(task_id)
    .bind(element_type_id)
    .fetch_one(conn)
    .await?;
    Ok(labels)
}

/// Manager of a stockyard, when the yard exists and has one.
pub async fn fetch_stockyard_manager(
    conn: &mut PgConnection,
    stockyard_id: i64,
) -> sqlx::Result<Option<i64>> {
    let manager: Option<Option<i64>> =
        sqlx::query_scalar("SELECT manager_id FROM stockyards WHERE id = $1")
            .bind(stockyard_id)
            .fetch_optional(conn)
            .await?;
    Ok(manager.flatten())
}

/// Project a stockyard belongs to, when the yard exists.
pub async fn fetch_stockyard_project(
    conn: &mut PgConnection,
    stockyard_id: i64,
) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar("SELECT project_id FROM stockyards WHERE id = $1")
        .bind(stockyard_id)
        .fetch_optional(conn)
        .await
}

impl Database {
    pub async fn project_exists(&self, project_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM projects WHERE id = $1)")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

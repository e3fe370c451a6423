//! # Database — PostgreSQL Storage Layer
//!
//! Async access to the production-tracking schema via `sqlx::PgPool`.
//!
//! ## Schema
//!
//! - `project_stages`, `element_type_path`, `task`, `element`, `stockyards`:
//!   reference data owned by the surrounding ERP (read-only here, except the
//!   element display columns)
//! - `activity`: live record of one element at one stage
//! - `qc_answers`: QC questionnaire answers, stamped with element and activity
//! - `complete_production`: append-only audit of every status write
//! - `precast_stock`: elements that left the last stage
//! - `notifications`: persisted notification inbox
//!
//! ## Module Structure
//!
//! - [`stages`]: project stages and element-type stage paths
//! - [`activities`]: activity/element/task rows and the transition writes
//! - [`qc_answers`]: QC answer inserts and reads
//! - [`production`]: audit log append and history readers
//! - [`stock`]: PrecastStock inserts
//! - [`projects`]: display labels and stockyard managers
//! - [`notifications`]: notification inbox and device tokens
//!
//! ## Transactions
//!
//! Pool-level reads are `impl Database` methods returning `anyhow::Result`.
//! Statements that must run inside the progression transaction are free
//! functions taking `&mut PgConnection` and returning `sqlx::Result`, so the
//! executor can keep SQLSTATE codes for its error mapping.

pub mod activities;
pub mod notifications;
pub mod production;
pub mod projects;
pub mod qc_answers;
pub mod stages;
pub mod stock;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::error::CoreError;
use crate::progression::{ActivityState, StageInfo, StageKind};

/// Schema files, applied in order by [`Database::run_migrations`].
pub const MIGRATIONS: [(&str, &str); 3] = [
    (
        "001_reference_tables",
        include_str!("../../migrations/001_reference_tables.sql"),
    ),
    (
        "002_progression",
        include_str!("../../migrations/002_progression.sql"),
    ),
    (
        "003_notifications",
        include_str!("../../migrations/003_notifications.sql"),
    ),
];

// ── Stage types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StageRow {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub kind: Option<String>,
    pub stage_order: i32,
    pub assigned_to: Option<i64>,
    pub qc_assign: bool,
    pub qc_id: Option<i64>,
    pub paper_id: Option<i64>,
    pub completion_stage: bool,
    pub inventory_deduction: bool,
}

impl TryFrom<StageRow> for StageInfo {
    type Error = CoreError;

    fn try_from(row: StageRow) -> Result<Self, CoreError> {
        let kind = StageKind::resolve(row.kind.as_deref(), &row.name)?;
        Ok(StageInfo {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            kind,
            order: row.stage_order,
            assigned_to: row.assigned_to,
            qc_assign: row.qc_assign,
            qc_id: row.qc_id,
            paper_id: row.paper_id,
            completion_stage: row.completion_stage,
            inventory_deduction: row.inventory_deduction,
        })
    }
}

// ── Activity types ──────────────────────────────────────────────

/// An activity joined with its task's element type and floor.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActivityRow {
    pub id: i64,
    pub task_id: i64,
    pub project_id: i64,
    pub element_id: i64,
    pub element_type_id: i64,
    pub floor_id: Option<i64>,
    pub stage_id: i64,
    pub assigned_to: Option<i64>,
    pub qc_id: Option<i64>,
    pub paper_id: Option<i64>,
    pub stockyard_id: Option<i64>,
    pub status: String,
    pub qc_status: String,
    pub mesh_mold_status: Option<String>,
    pub mesh_mold_qc_status: Option<String>,
    pub reinforcement_status: Option<String>,
    pub reinforcement_qc_status: Option<String>,
    pub completed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ActivityRow {
    pub fn state(&self) -> Result<ActivityState, CoreError> {
        ActivityState::from_columns(
            &self.status,
            &self.qc_status,
            self.mesh_mold_status.as_deref(),
            self.mesh_mold_qc_status.as_deref(),
            self.reinforcement_status.as_deref(),
            self.reinforcement_qc_status.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TaskRow {
    pub task_id: i64,
    pub project_id: i64,
    pub name: String,
    pub element_type_id: i64,
    pub floor_id: Option<i64>,
    pub start_stage_id: Option<i64>,
    pub assigned_to: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ElementRow {
    pub id: i64,
    pub project_id: i64,
    pub element_type_id: i64,
    pub element_code: String,
    pub instage: bool,
    pub status: Option<String>,
}

// ── QC and audit types ──────────────────────────────────────────

/// One answer as submitted. `element_id` and `activity_id` are stamped server-side.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewQcAnswer {
    pub project_id: i64,
    pub task_id: i64,
    pub stage_id: i64,
    pub question_id: i64,
    #[serde(default)]
    pub option_id: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QcAnswerRow {
    pub id: i64,
    pub project_id: i64,
    pub task_id: i64,
    pub stage_id: i64,
    pub activity_id: i64,
    pub element_id: i64,
    pub question_id: i64,
    pub option_id: Option<i64>,
    pub comment: Option<String>,
    pub image_path: Option<String>,
    pub user_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Audit row to append; timestamps come from the transaction clock.
#[derive(Debug, Clone)]
pub struct NewProductionEvent {
    pub task_id: i64,
    pub activity_id: i64,
    pub project_id: i64,
    pub element_id: i64,
    pub element_type_id: i64,
    pub floor_id: Option<i64>,
    pub stage_id: i64,
    pub user_id: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductionEventRow {
    pub id: i64,
    pub task_id: i64,
    pub activity_id: i64,
    pub project_id: i64,
    pub element_id: i64,
    pub element_type_id: i64,
    pub floor_id: Option<i64>,
    pub stage_id: i64,
    pub user_id: i64,
    pub status: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PrecastStockRow {
    pub id: i64,
    pub element_id: i64,
    pub project_id: i64,
    pub stockyard_id: Option<i64>,
    pub stockyard: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub body: String,
    pub action_url: String,
    pub payload: serde_json::Value,
    pub read: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ── Database struct and connection ──────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// The URL is parsed by hand so percent-encoded usernames and passwords
    /// survive intact.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    ///
    /// Used by the `/readyz` readiness probe.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply the embedded schema. Every statement is `IF NOT EXISTS`, so running
    /// this against an up-to-date database changes nothing.
    pub async fn run_migrations(&self) -> Result<()> {
        for (name, sql) in MIGRATIONS {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| anyhow::anyhow!("migration {} failed: {}", name, e))?;
            tracing::info!(migration = name, "migration applied");
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────

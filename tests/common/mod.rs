//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use precastflow::config::ServerConfig;
use precastflow::db::Database;
use precastflow::events::{NotificationIntent, Outbox};
use precastflow::progression::Engine;
use precastflow::prom_metrics::Metrics;
use precastflow::server::{build_router, AppState};
use tokio::sync::{mpsc, OnceCell};

pub const TEST_JWT_SECRET: &str = "integration-test-secret";

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// One-time schema initialization.
static SCHEMA_INIT: OnceCell<()> = OnceCell::const_new();

/// Connect to the test database, apply the schema once per test binary and
/// start from empty tables.
pub async fn setup_test_db() -> Database {
    let db = Database::connect(&test_db_url(), 8)
        .await
        .expect("Failed to connect to test database");
    SCHEMA_INIT
        .get_or_init(|| async {
            db.run_migrations().await.expect("migrations failed");
        })
        .await;
    truncate_all_tables(db.pool()).await;
    db
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "TRUNCATE TABLE notifications, precast_stock, complete_production, qc_answers,
                       activity, element, task, element_type_path, element_type,
                       stockyards, project_stages, projects, user_devices, users
         RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .unwrap();
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        public_base_url: "https://precast.test".to_string(),
        outbox_capacity: 64,
        ..Default::default()
    }
}

/// Engine wired to a fresh outbox. The receiver stands in for the delivery worker.
pub fn build_engine(db: &Database) -> (Engine, mpsc::Receiver<NotificationIntent>) {
    let config = test_config();
    let metrics = Arc::new(Metrics::new());
    let (outbox, receiver) = Outbox::channel(config.outbox_capacity, Arc::clone(&metrics));
    let engine = Engine::new(
        db.clone(),
        outbox,
        metrics,
        config.statement_timeout_ms,
        config.public_base_url,
    );
    (engine, receiver)
}

/// Build an Axum test app router connected to the test database.
pub async fn build_test_app() -> (axum::Router, Database, mpsc::Receiver<NotificationIntent>) {
    let db = setup_test_db().await;
    let config = test_config();
    let metrics = Arc::new(Metrics::new());
    let (outbox, receiver) = Outbox::channel(config.outbox_capacity, Arc::clone(&metrics));
    let engine = Engine::new(
        db.clone(),
        outbox,
        Arc::clone(&metrics),
        config.statement_timeout_ms,
        config.public_base_url.clone(),
    );
    let state = AppState::new(db.clone(), config, engine, metrics);
    (build_router(state), db, receiver)
}

/// HS256 session token for `user_id`, valid for an hour.
pub fn session_token(user_id: i64, name: &str) -> String {
    let claims = serde_json::json!({
        "sub": user_id.to_string(),
        "name": name,
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

// ── Reference-data fixtures ─────────────────────────────────────

pub async fn insert_user(pool: &sqlx::PgPool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO users (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn insert_project(pool: &sqlx::PgPool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO projects (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Stage with QC required iff `qc_id` is set.
pub async fn insert_stage(
    pool: &sqlx::PgPool,
    project_id: i64,
    name: &str,
    order: i32,
    assigned_to: i64,
    qc_id: Option<i64>,
) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO project_stages (project_id, name, stage_order, assigned_to, qc_assign, qc_id, paper_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id",
    )
    .bind(project_id)
    .bind(name)
    .bind(order)
    .bind(assigned_to)
    .bind(qc_id.is_some())
    .bind(qc_id)
    .bind(qc_id.map(|_| 500_i64))
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Element type with its stage path.
pub async fn insert_element_type(
    pool: &sqlx::PgPool,
    project_id: i64,
    name: &str,
    path: &[i64],
) -> i64 {
    let id: i64 =
        sqlx::query_scalar("INSERT INTO element_type (project_id, name) VALUES ($1, $2) RETURNING id")
            .bind(project_id)
            .bind(name)
            .fetch_one(pool)
            .await
            .unwrap();
    sqlx::query("INSERT INTO element_type_path (element_type_id, stage_path) VALUES ($1, $2)")
        .bind(id)
        .bind(path.to_vec())
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn insert_task(
    pool: &sqlx::PgPool,
    project_id: i64,
    element_type_id: i64,
    start_stage_id: Option<i64>,
) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO task (project_id, name, element_type_id, floor_id, start_stage_id)
         VALUES ($1, 'Level 1 slabs', $2, 1, $3)
         RETURNING task_id",
    )
    .bind(project_id)
    .bind(element_type_id)
    .bind(start_stage_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_element(
    pool: &sqlx::PgPool,
    project_id: i64,
    element_type_id: i64,
    code: &str,
) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO element (project_id, element_type_id, element_code) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(project_id)
    .bind(element_type_id)
    .bind(code)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_stockyard(pool: &sqlx::PgPool, project_id: i64, manager_id: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO stockyards (project_id, name, manager_id) VALUES ($1, 'North yard', $2) RETURNING id",
    )
    .bind(project_id)
    .bind(manager_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// A project with one element type over `stages` (name, assignee, qc) in order,
/// one task and one adopted element. Returns the ids needed by the scenarios.
pub struct Scenario {
    pub project_id: i64,
    pub element_type_id: i64,
    pub task_id: i64,
    pub element_id: i64,
    pub stage_ids: Vec<i64>,
    pub activity_id: i64,
}

pub async fn scenario(
    db: &Database,
    stages: &[(&str, i64, Option<i64>)],
    stockyard_id: Option<i64>,
    project_id: Option<i64>,
) -> Scenario {
    let pool = db.pool();
    let project_id = match project_id {
        Some(id) => id,
        None => insert_project(pool, "Harbour Tower").await,
    };
    let mut stage_ids = Vec::new();
    for (i, (name, assignee, qc)) in stages.iter().enumerate() {
        stage_ids.push(insert_stage(pool, project_id, name, i as i32 + 1, *assignee, *qc).await);
    }
    let element_type_id = insert_element_type(pool, project_id, "Slab", &stage_ids).await;
    let task_id = insert_task(pool, project_id, element_type_id, None).await;
    let element_id = insert_element(pool, project_id, element_type_id, "SL-001").await;
    let adoption = precastflow::progression::adoption::adopt_elements(
        db,
        task_id,
        &[element_id],
        stockyard_id,
    )
    .await
    .unwrap();
    Scenario {
        project_id,
        element_type_id,
        task_id,
        element_id,
        stage_ids,
        activity_id: adoption.activity_ids[0],
    }
}

//! # Server — HTTP API
//!
//! Axum server exposing the progression engine and its read models as a JSON
//! API. Every route except the health probes requires a session token (see
//! [`middleware_auth`]).
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /activities/{id}/status` | status write through the full dispatch ladder |
//! | `POST /activities/qc-answers` | QC answers + QC status write |
//! | `GET /activities/{id}` | activity row |
//! | `GET /activities/{id}/history` | audit events grouped per stage |
//! | `GET /activities/{id}/qc-answers` | recorded QC answers |
//! | `GET /projects/{id}/views` | view projection of open activities |
//! | `GET /projects/{id}/production-history` | caller's audit events, newest first |
//! | `GET /projects/{id}/precast-stock` | elements handed to stock |
//! | `POST /tasks/{id}/activities` | adopt elements into the start stage |
//! | `GET /notifications` | caller's notification inbox |
//! | `GET /healthz`, `/readyz`, `/metrics` | probes and Prometheus scrape |

pub(crate) mod middleware_auth;
mod routes_activities;
mod routes_health;
mod routes_notifications;
mod routes_projects;
mod routes_tasks;

use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::Router;
use jsonwebtoken::DecodingKey;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

use crate::config::ServerConfig;
use crate::delivery::{spawn_delivery_worker, FcmClient};
use crate::events::Outbox;
use crate::progression::Engine;
use crate::{db, prom_metrics};

pub use middleware_auth::{AuthUser, RequireAuth};

pub struct AppState {
    pub db: db::Database,
    pub config: ServerConfig,
    pub engine: Engine,
    pub prom_metrics: Arc<prom_metrics::Metrics>,
    jwt_key: DecodingKey,
}

impl AppState {
    pub fn new(
        db: db::Database,
        config: ServerConfig,
        engine: Engine,
        prom_metrics: Arc<prom_metrics::Metrics>,
    ) -> Arc<Self> {
        let jwt_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        Arc::new(AppState {
            db,
            config,
            engine,
            prom_metrics,
            jwt_key,
        })
    }

    pub(crate) fn jwt_key(&self) -> &DecodingKey {
        &self.jwt_key
    }
}

/// Middleware that records HTTP request duration into the Prometheus histogram,
/// generates (or propagates) a request ID for correlation, and wraps the
/// request in a tracing span using `.instrument()` for proper async propagation.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    let duration = start.elapsed().as_secs_f64();
    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(duration);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse numeric ids and UUIDs into placeholders so the latency histogram
/// keeps one series per route.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else if seg.len() == 36 && seg.chars().filter(|c| *c == '-').count() == 4 {
                ":uuid".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);
    Router::new()
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        .route(
            "/activities/qc-answers",
            post(routes_activities::handler_qc_answers),
        )
        .route(
            "/activities/{id}",
            get(routes_activities::handler_activity_get),
        )
        .route(
            "/activities/{id}/status",
            post(routes_activities::handler_status_update),
        )
        .route(
            "/activities/{id}/history",
            get(routes_activities::handler_activity_history),
        )
        .route(
            "/activities/{id}/qc-answers",
            get(routes_activities::handler_activity_qc_answers),
        )
        .route(
            "/projects/{id}/views",
            get(routes_projects::handler_project_views),
        )
        .route(
            "/projects/{id}/production-history",
            get(routes_projects::handler_production_history),
        )
        .route(
            "/projects/{id}/precast-stock",
            get(routes_projects::handler_precast_stock),
        )
        .route(
            "/tasks/{id}/activities",
            post(routes_tasks::handler_adopt_elements),
        )
        .route(
            "/notifications",
            get(routes_notifications::handler_notifications),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .with_state(state)
}

/// Wire the engine, outbox and delivery worker together and serve until
/// SIGINT/SIGTERM. Pending notifications are drained before returning.
pub async fn run(config: ServerConfig, database_url: &str) -> Result<()> {
    config.validate()?;
    let database = db::Database::connect(database_url, config.max_connections).await?;
    let prom_metrics = Arc::new(prom_metrics::Metrics::new());

    let (outbox, receiver) = Outbox::channel(config.outbox_capacity, Arc::clone(&prom_metrics));
    let push = FcmClient::from_config(&config.push)?;
    let worker = spawn_delivery_worker(
        database.clone(),
        receiver,
        push,
        Arc::clone(&prom_metrics),
    );
    let engine = Engine::new(
        database.clone(),
        outbox,
        Arc::clone(&prom_metrics),
        config.statement_timeout_ms,
        config.public_base_url.clone(),
    );

    let port = config.port;
    let state = AppState::new(database, config, engine, prom_metrics);
    let app = build_router(Arc::clone(&state));
    // The router holds the only other handles; once serving stops the outbox
    // closes and the worker drains.
    drop(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "precastflow listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .is_err()
    {
        warn!("notification worker did not drain within 10s");
    }
    info!("precastflow shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}

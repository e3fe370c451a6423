//! # Error taxonomy
//!
//! Every failure that can leave the progression core is one of the variants of
//! [`CoreError`]. Handlers return it directly; the `IntoResponse` impl maps each
//! kind onto its HTTP status and a `{"error", "details"}` body.
//!
//! | Kind | Status | Raised when |
//! |------|--------|-------------|
//! | `UnauthorizedSession` | 401 | missing or invalid session token |
//! | `PermissionDenied` | 403 | caller is not eligible for the transition |
//! | `NotFound` | 404 | activity, stage, task or stage path missing |
//! | `InvalidInput` | 400 | request content inconsistent with the activity |
//! | `ConflictingState` | 409 | write on a completed activity, duplicate adoption |
//! | `Configuration` | 500 | stage path empty / references unknown stages |
//! | `Transient` | 503 | deadlock, serialization failure, timeout, dropped connection |
//! | `Internal` | 500 | anything else |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("session missing or invalid")]
    UnauthorizedSession,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflicting state: {0}")]
    ConflictingState(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable name used in response bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::UnauthorizedSession => "unauthorized_session",
            CoreError::PermissionDenied(_) => "permission_denied",
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::ConflictingState(_) => "conflicting_state",
            CoreError::Configuration(_) => "configuration_error",
            CoreError::Transient(_) => "transient",
            CoreError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::UnauthorizedSession => StatusCode::UNAUTHORIZED,
            CoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::ConflictingState(_) => StatusCode::CONFLICT,
            CoreError::Configuration(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CoreError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Deadlocks and serialization failures are worth one engine-level retry.
    /// Timeouts and dropped connections are not: the deadline is already spent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(msg) if msg.starts_with(RETRYABLE_PREFIX))
    }

    fn details(&self) -> Option<String> {
        match self {
            CoreError::UnauthorizedSession => None,
            CoreError::PermissionDenied(m)
            | CoreError::NotFound(m)
            | CoreError::InvalidInput(m)
            | CoreError::ConflictingState(m)
            | CoreError::Configuration(m)
            | CoreError::Transient(m)
            | CoreError::Internal(m) => Some(m.clone()),
        }
    }
}

const RETRYABLE_PREFIX: &str = "retryable:";

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".into()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                CoreError::Transient(e.to_string())
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // deadlock_detected, serialization_failure
                Some("40P01") | Some("40001") => {
                    CoreError::Transient(format!("{} {}", RETRYABLE_PREFIX, db.message()))
                }
                // query_canceled (statement_timeout)
                Some("57014") => CoreError::Transient(format!("deadline exceeded: {}", db.message())),
                // unique_violation
                Some("23505") => CoreError::ConflictingState(db.message().to_string()),
                _ => CoreError::Internal(e.to_string()),
            },
            _ => CoreError::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<sqlx::Error>() {
            Ok(sql) => sql.into(),
            Err(other) => match other.downcast::<CoreError>() {
                Ok(core) => core,
                Err(other) => CoreError::Internal(format!("{:#}", other)),
            },
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }
        let body = match self.details() {
            Some(details) => serde_json::json!({ "error": self.kind(), "details": details }),
            None => serde_json::json!({ "error": self.kind() }),
        };
        (status, Json(body)).into_response()
    }
}

//! Session auth for API routes.
//!
//! The session token arrives as `Authorization: Bearer <token>`: an HS256 JWT
//! signed with the configured `jwt_secret`, whose `sub` is the numeric user id
//! and `name` the display name. Handlers take [`RequireAuth`] to get the
//! resolved [`AuthUser`]; a missing or invalid token rejects with 401.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::AppState;
use crate::error::CoreError;

/// `sub` is accepted as a JSON number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Subject {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: Subject,
    #[serde(default)]
    name: String,
}

/// Authenticated caller, as resolved from the session token and request headers.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: i64,
    pub user_name: String,
    pub host: Option<String>,
    pub ip: Option<String>,
}

fn decode_session(token: &str, key: &DecodingKey) -> Result<(i64, String), CoreError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<SessionClaims>(token, key, &validation).map_err(|e| {
        debug!(error = %e, "session token rejected");
        CoreError::UnauthorizedSession
    })?;
    let user_id = match data.claims.sub {
        Subject::Number(id) => id,
        Subject::Text(s) => s.parse().map_err(|_| CoreError::UnauthorizedSession)?,
    };
    Ok((user_id, data.claims.name))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// First hop of `x-forwarded-for`, else `x-real-ip`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(String::from)
}

pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, CoreError> {
    let token = header_str(headers, header::AUTHORIZATION.as_str())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(CoreError::UnauthorizedSession)?;
    let (user_id, user_name) = decode_session(token.trim(), state.jwt_key())?;
    Ok(AuthUser {
        user_id,
        user_name,
        host: header_str(headers, header::HOST.as_str()).map(String::from),
        ip: client_ip(headers),
    })
}

/// Axum extractor that requires any authenticated user.
///
/// Returns 401 if no valid session token is present.
pub struct RequireAuth(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = CoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state, &parts.headers).map(RequireAuth)
    }
}

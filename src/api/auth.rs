//! Admin authentication endpoints
//!
//! - POST /api/auth/login - Exchange the admin credentials for a session
//! - POST /api/auth/logout - End the current session (admin)
//! - GET /api/auth/me - Current admin (admin)
//!
//! The session token is returned in the body for bearer use and set as the
//! `admin_session` cookie for the browser back office.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_ip_address, AdminUser, ApiError, AppState, SESSION_COOKIE};
use crate::models::AdminSession;
use crate::services::AuthError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub admin: AdminResponse,
}

#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub username: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<AdminSession> for AdminResponse {
    fn from(session: AdminSession) -> Self {
        Self {
            username: session.username,
            expires_at: session.expires_at,
            created_at: session.created_at,
        }
    }
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

fn session_cookie(token: &str, max_age_secs: i64) -> Result<HeaderValue, ApiError> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal_error(e.to_string()))
}

/// POST /api/auth/login
///
/// Requests are limited per IP, and a username is locked for 15 minutes
/// after 5 failed attempts.
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = extract_ip_address(&headers);

    if !state.rate_limiter.allow_login_request(&ip).await {
        tracing::warn!(ip = %ip, "Login IP rate limit exceeded");
        return Err(ApiError::rate_limited(
            "Too many login requests, please try again later",
            state.rate_limiter.login_ip_retry_after(),
        ));
    }

    let username = body.username.trim();
    if state.rate_limiter.is_username_limited(username).await {
        tracing::warn!(ip = %ip, username = %username, "Login locked after repeated failures");
        return Err(ApiError::rate_limited(
            "Too many failed login attempts, please try again in 15 minutes",
            state.rate_limiter.username_retry_after(),
        ));
    }

    let issued = match state.auth_service.login(username, &body.password).await {
        Ok(issued) => issued,
        Err(AuthError::AuthenticationError(msg)) => {
            state.rate_limiter.record_failed_login(username).await;
            tracing::warn!(ip = %ip, username = %username, "Failed admin login");
            return Err(ApiError::unauthorized(msg));
        }
        Err(e) => return Err(e.into()),
    };

    state.rate_limiter.clear_username(username).await;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        session_cookie(&issued.token, state.auth_service.session_ttl().num_seconds())?,
    );

    Ok((
        response_headers,
        Json(AuthResponse {
            token: issued.token,
            admin: issued.session.into(),
        }),
    ))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    state.auth_service.logout(&admin.token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, session_cookie("", 0)?);

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/auth/me
async fn me(admin: AdminUser) -> Json<AdminResponse> {
    Json(admin.session.into())
}

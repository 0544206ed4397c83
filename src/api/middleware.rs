//! API middleware and shared handler types
//!
//! Contains:
//! - `AppState`, the services shared by every handler
//! - `ApiError`, the single JSON error shape returned by the API
//! - Admin authentication (bearer token or `admin_session` cookie)
//! - Request statistics

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::SharedCache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCommunicationRepository, SqlxImportDraftRepository, SqlxLeadRepository,
    SqlxListingRepository, SqlxNoteRepository, SqlxSessionRepository,
};
use crate::db::DynDatabasePool;
use crate::models::AdminSession;
use crate::services::{
    AuthError, AuthService, ChatAgent, ChatError, ChatModel, ImportService, ImportServiceError,
    InstagramService, LeadService, LeadServiceError, ListingService, ListingServiceError, Mailer,
    Notifier, RateLimiter, SearchService,
};

/// Name of the cookie carrying the admin session token
pub const SESSION_COOKIE: &str = "admin_session";

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a request with its response time
    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub listing_service: Arc<ListingService>,
    pub lead_service: Arc<LeadService>,
    pub search_service: Arc<SearchService>,
    pub chat_agent: Arc<ChatAgent>,
    pub import_service: Arc<ImportService>,
    pub instagram_service: Arc<InstagramService>,
    pub auth_service: Arc<AuthService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub request_stats: Arc<RequestStats>,
}

impl AppState {
    /// Wire repositories and services over a migrated pool.
    ///
    /// `config.admin.password_hash` must already be resolved; the mailer and
    /// chat model are passed in so callers can substitute their own.
    pub fn build(
        pool: DynDatabasePool,
        config: &Config,
        cache: SharedCache,
        http: reqwest::Client,
        mailer: Arc<dyn Mailer>,
        model: Option<Arc<dyn ChatModel>>,
    ) -> Self {
        let listing_repo = SqlxListingRepository::boxed(pool.clone());
        let notifier = Arc::new(Notifier::new(mailer, &config.email));

        let listing_service = Arc::new(ListingService::new(listing_repo.clone(), cache.clone()));
        let lead_service = Arc::new(LeadService::new(
            SqlxLeadRepository::boxed(pool.clone()),
            SqlxCommunicationRepository::boxed(pool.clone()),
            SqlxNoteRepository::boxed(pool.clone()),
            listing_repo,
            notifier,
        ));
        let search_service = Arc::new(SearchService::new(
            listing_service.clone(),
            config.search.result_limit,
        ));
        let chat_agent = Arc::new(ChatAgent::new(
            search_service.clone(),
            listing_service.clone(),
            lead_service.clone(),
            model,
            config.email.site_name.clone(),
        ));
        let import_service = Arc::new(ImportService::new(
            SqlxImportDraftRepository::boxed(pool.clone()),
            listing_service.clone(),
            config.admin.import_token.clone(),
        ));
        let instagram_service = Arc::new(InstagramService::new(&config.instagram, http, cache));
        let auth_service = Arc::new(AuthService::new(
            SqlxSessionRepository::boxed(pool.clone()),
            &config.admin,
        ));

        Self {
            pool,
            listing_service,
            lead_service,
            search_service,
            chat_agent,
            import_service,
            instagram_service,
            auth_service,
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            request_stats: Arc::new(RequestStats::new()),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: i64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": retry_after }),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", e);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self
            .error
            .details
            .as_ref()
            .and_then(|d| d.get("retry_after"))
            .and_then(|v| v.as_i64())
            .filter(|_| status == StatusCode::TOO_MANY_REQUESTS);

        let mut response = (status, Json(self)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, header::HeaderValue::from(secs.max(1)));
        }
        response
    }
}

impl From<ListingServiceError> for ApiError {
    fn from(e: ListingServiceError) -> Self {
        match e {
            ListingServiceError::NotFound(id) => Self::not_found(format!("Listing not found: {}", id)),
            ListingServiceError::ValidationError(msg) => Self::validation_error(msg),
            ListingServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<LeadServiceError> for ApiError {
    fn from(e: LeadServiceError) -> Self {
        match e {
            LeadServiceError::NotFound(id) => Self::not_found(format!("Lead not found: {}", id)),
            LeadServiceError::ValidationError(msg) => Self::validation_error(msg),
            LeadServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<ImportServiceError> for ApiError {
    fn from(e: ImportServiceError) -> Self {
        match e {
            ImportServiceError::Unauthorized => Self::unauthorized("Invalid or missing import token"),
            ImportServiceError::NotFound(id) => Self::not_found(format!("Import draft not found: {}", id)),
            ImportServiceError::ValidationError(msg) => Self::validation_error(msg),
            ImportServiceError::Conflict(msg) => Self::conflict(msg),
            ImportServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::ValidationError(msg) => Self::validation_error(msg),
            ChatError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::AuthenticationError(msg) => Self::unauthorized(msg),
            AuthError::InternalError(e) => Self::internal(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// The admin session attached to a request by [`require_admin`]
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub session: AdminSession,
    pub token: String,
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Extract the session token: `Authorization: Bearer` first, then the cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    let prefix = format!("{}=", SESSION_COOKIE);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
        .filter(|token| !token.is_empty())
        .map(String::from)
}

/// Resolve the request's session, if any
pub async fn current_admin(state: &AppState, headers: &HeaderMap) -> Result<Option<AdminUser>, ApiError> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    let session = state.auth_service.validate(&token).await?;
    Ok(session.map(|session| AdminUser { session, token }))
}

/// Admin authentication middleware
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if extract_session_token(request.headers()).is_none() {
        return Err(ApiError::unauthorized("Missing authentication token"));
    }

    let admin = current_admin(&state, request.headers())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(admin);
    Ok(next.run(request).await)
}

/// Request statistics middleware
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(start.elapsed().as_micros() as u64);
    response
}

/// Client IP from proxy headers; `"unknown"` when none is present
pub fn extract_ip_address(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()) {
            return ip.to_string();
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&map), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; admin_session=abc456; other=1")]);
        assert_eq!(extract_session_token(&map), Some("abc456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer bearer-token"),
            (header::COOKIE, "admin_session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&map), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        let map = headers(&[(header::AUTHORIZATION, "Basic invalid")]);
        assert!(extract_session_token(&map).is_none());
        let map = headers(&[(header::COOKIE, "session=not-ours; admin_session=")]);
        assert!(extract_session_token(&map).is_none());
    }

    #[test]
    fn test_extract_ip_address() {
        let map = headers(&[(header::HeaderName::from_static("x-forwarded-for"), "203.0.113.7, 10.0.0.1")]);
        assert_eq!(extract_ip_address(&map), "203.0.113.7");
        let map = headers(&[(header::HeaderName::from_static("x-real-ip"), "198.51.100.2")]);
        assert_eq!(extract_ip_address(&map), "198.51.100.2");
        assert_eq!(extract_ip_address(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::new("FORBIDDEN", "x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x", 60).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::internal_error("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::rate_limited("slow down", 90).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "90");
    }

    #[test]
    fn test_service_errors_map_to_codes() {
        let e: ApiError = ListingServiceError::NotFound(3).into();
        assert_eq!(e.error.code, "NOT_FOUND");
        let e: ApiError = ImportServiceError::Conflict("already approved".into()).into();
        assert_eq!(e.error.code, "CONFLICT");
        let e: ApiError = LeadServiceError::InternalError(anyhow::anyhow!("db down")).into();
        assert_eq!(e.error.code, "INTERNAL_ERROR");
        assert!(!e.error.message.contains("db down"));
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(100);
        stats.record(300);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.avg_response_time_us(), 200.0);
    }
}

//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api`:
//! - Health
//! - Listings (public browse, admin management)
//! - Leads (public capture, admin CRM)
//! - Import drafts from the browser extension
//! - Instagram feed
//! - Search and chat
//! - Admin auth

pub mod auth;
pub mod chat;
pub mod common;
pub mod health;
pub mod import;
pub mod instagram;
pub mod leads;
pub mod listings;
pub mod middleware;
pub mod search;

use anyhow::Context;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, RequestStats};

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need a valid admin session)
    let admin_routes = Router::new()
        .merge(listings::admin_router())
        .merge(leads::admin_router())
        .merge(import::admin_router())
        .merge(auth::admin_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_admin,
        ));

    // Public routes
    Router::new()
        .merge(health::router())
        .merge(listings::public_router())
        .merge(leads::public_router())
        .merge(import::public_router())
        .merge(instagram::router())
        .merge(search::router())
        .merge(chat::router())
        .merge(auth::public_router())
        .merge(admin_routes)
        .fallback(api_not_found)
}

async fn api_not_found() -> ApiError {
    ApiError::not_found("No such endpoint")
}

/// Build the CORS layer.
///
/// `*` allows any origin without credentials; anything else is a single
/// origin that may send the session cookie.
pub fn cors_layer(cors_origin: &str) -> anyhow::Result<CorsLayer> {
    let methods = [Method::GET, Method::POST, Method::PATCH, Method::DELETE];
    let headers = [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(import::IMPORT_TOKEN_HEADER),
    ];

    if cors_origin.trim() == "*" {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers));
    }

    let origin = cors_origin
        .trim()
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let cors = cors_layer(cors_origin)?;

    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state))
}

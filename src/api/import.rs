//! Import draft endpoints for the listing-scraper browser extension
//!
//! - GET /api/import - List drafts (admin session or `x-admin-token`)
//! - POST /api/import - Submit a scraped listing (`x-admin-token`)
//! - GET /api/import/{id} - Draft detail (admin)
//! - POST /api/import/{id}/approve - Publish as a listing (admin)
//! - POST /api/import/{id}/reject - Reject (admin)

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::common::parse_param;
use crate::api::middleware::{current_admin, ApiError, AppState};
use crate::models::{ImportDraft, Listing};

/// Header carrying the extension's shared secret
pub const IMPORT_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Default, Deserialize)]
pub struct ListDraftsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    /// Listing fields to change before publishing; `null` removes a field
    #[serde(default)]
    pub overrides: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub draft: ImportDraft,
    pub listing: Listing,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/import", get(list_drafts).post(create_draft))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/import/{id}", get(get_draft))
        .route("/import/{id}/approve", post(approve_draft))
        .route("/import/{id}/reject", post(reject_draft))
}

fn import_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(IMPORT_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
}

/// GET /api/import
async fn list_drafts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListDraftsQuery>,
) -> Result<Json<Vec<ImportDraft>>, ApiError> {
    if current_admin(&state, &headers).await?.is_none() {
        state.import_service.check_token(import_token(&headers))?;
    }

    let status = parse_param("status", query.status.as_deref())?;
    Ok(Json(state.import_service.list_drafts(status).await?))
}

/// POST /api/import
async fn create_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ImportDraft>), ApiError> {
    state.import_service.check_token(import_token(&headers))?;
    let draft = state.import_service.create_draft(&body).await?;
    Ok((StatusCode::CREATED, Json(draft)))
}

/// GET /api/import/{id}
async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ImportDraft>, ApiError> {
    Ok(Json(state.import_service.get_draft(id).await?))
}

/// POST /api/import/{id}/approve
///
/// The body is optional; without one the draft is published as scraped.
async fn approve_draft(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ApproveRequest>>,
) -> Result<(StatusCode, Json<ApproveResponse>), ApiError> {
    let overrides = body.and_then(|Json(req)| req.overrides);
    let (draft, listing) = state
        .import_service
        .approve(id, overrides.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(ApproveResponse { draft, listing })))
}

/// POST /api/import/{id}/reject
async fn reject_draft(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ImportDraft>, ApiError> {
    Ok(Json(state.import_service.reject(id).await?))
}

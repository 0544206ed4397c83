//! Lead API endpoints
//!
//! Public:
//! - POST /api/leads - Capture a contact form or inquiry (rate limited per IP)
//!
//! Admin:
//! - GET /api/leads - List with `status`, `source`, `q`, `limit`, `offset`
//! - GET /api/leads/stats - Counts by status
//! - GET/PATCH/DELETE /api/leads/{id}
//! - GET/POST /api/leads/{id}/communications
//! - GET/POST /api/leads/{id}/notes

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{parse_param, ListResponse};
use crate::api::middleware::{extract_ip_address, AdminUser, ApiError, AppState};
use crate::models::{
    Communication, CreateCommunicationInput, CreateLeadInput, CreateNoteInput, Lead, LeadDetail,
    LeadFilter, LeadStats, Note, Pagination, UpdateLeadInput,
};

/// Query parameters for GET /api/leads
#[derive(Debug, Default, Deserialize)]
pub struct ListLeadsQuery {
    pub status: Option<String>,
    pub source: Option<String>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/leads", post(capture_lead))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/leads", get(list_leads))
        .route("/leads/stats", get(lead_stats))
        .route("/leads/{id}", get(get_lead).patch(update_lead).delete(delete_lead))
        .route(
            "/leads/{id}/communications",
            get(list_communications).post(add_communication),
        )
        .route("/leads/{id}/notes", get(list_notes).post(add_note))
}

/// POST /api/leads
async fn capture_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateLeadInput>,
) -> Result<(StatusCode, Json<Lead>), ApiError> {
    let ip = extract_ip_address(&headers);
    if !state.rate_limiter.allow_submission(&ip).await {
        tracing::warn!(ip = %ip, "Lead submission rate limit exceeded");
        return Err(ApiError::rate_limited(
            "Too many submissions, please try again later",
            state.rate_limiter.submission_retry_after(),
        ));
    }

    let lead = state.lead_service.capture(body).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

/// GET /api/leads
async fn list_leads(
    State(state): State<AppState>,
    Query(query): Query<ListLeadsQuery>,
) -> Result<Json<ListResponse<Lead>>, ApiError> {
    let filter = LeadFilter {
        status: parse_param("status", query.status.as_deref())?,
        source: parse_param("source", query.source.as_deref())?,
        q: query.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
    };
    let page = Pagination::new(query.limit, query.offset);
    let (items, total) = state.lead_service.list(&filter, page).await?;

    Ok(Json(ListResponse {
        items,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// GET /api/leads/stats
async fn lead_stats(State(state): State<AppState>) -> Result<Json<LeadStats>, ApiError> {
    Ok(Json(state.lead_service.stats().await?))
}

/// GET /api/leads/{id}
async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LeadDetail>, ApiError> {
    Ok(Json(state.lead_service.get(id).await?))
}

/// PATCH /api/leads/{id}
async fn update_lead(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateLeadInput>,
) -> Result<Json<Lead>, ApiError> {
    Ok(Json(state.lead_service.update(id, body).await?))
}

/// DELETE /api/leads/{id}
///
/// Also removes the lead's communications and notes.
async fn delete_lead(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.lead_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/leads/{id}/communications
async fn list_communications(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Communication>>, ApiError> {
    Ok(Json(state.lead_service.list_communications(id).await?))
}

/// POST /api/leads/{id}/communications
async fn add_communication(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<CreateCommunicationInput>,
) -> Result<(StatusCode, Json<Communication>), ApiError> {
    let communication = state.lead_service.add_communication(id, body).await?;
    Ok((StatusCode::CREATED, Json(communication)))
}

/// GET /api/leads/{id}/notes
async fn list_notes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Note>>, ApiError> {
    Ok(Json(state.lead_service.list_notes(id).await?))
}

/// POST /api/leads/{id}/notes
///
/// The note is attributed to the signed-in admin.
async fn add_note(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<CreateNoteInput>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let note = state
        .lead_service
        .add_note(id, body, &admin.session.username)
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

//! Chat endpoint for the site's lead-capture assistant
//!
//! - POST /api/chat - One conversation turn (rate limited per IP)
//!
//! The client sends the whole conversation each time, plus the `lead_id`
//! returned by an earlier turn so the visitor is captured only once.

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};

use crate::api::middleware::{extract_ip_address, ApiError, AppState};
use crate::services::{ChatRequest, ChatResponse};

pub fn router() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

/// POST /api/chat
async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let ip = extract_ip_address(&headers);
    if !state.rate_limiter.allow_submission(&ip).await {
        tracing::warn!(ip = %ip, "Chat rate limit exceeded");
        return Err(ApiError::rate_limited(
            "Too many messages, please slow down",
            state.rate_limiter.submission_retry_after(),
        ));
    }

    Ok(Json(state.chat_agent.respond(body).await?))
}

//! Natural-language listing search
//!
//! - POST /api/search - `{ "query": "3 bed house under $500k with a pool", "limit": 6 }`

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::services::SearchOutcome;

const MAX_QUERY_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/search", post(search))
}

/// POST /api/search
///
/// An empty query returns the visible inventory in listing order.
async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<SearchOutcome>, ApiError> {
    let query = body.query.trim();
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(ApiError::validation_error(format!(
            "query must be at most {} characters",
            MAX_QUERY_CHARS
        )));
    }

    Ok(Json(state.search_service.search(query, body.limit).await?))
}

//! Instagram feed endpoint
//!
//! - GET /api/instagram?limit=N - Recent posts, mock posts when unavailable

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::AppState;
use crate::services::Feed;

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/instagram", get(feed))
}

/// GET /api/instagram
async fn feed(State(state): State<AppState>, Query(query): Query<FeedQuery>) -> Json<Feed> {
    Json(state.instagram_service.recent_posts(query.limit).await)
}

//! Health endpoint
//!
//! - GET /api/health - service status, database check and request stats

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database does not answer
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
    pub ai_enabled: bool,
    pub instagram_configured: bool,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.pool.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check database ping failed: {}", e);
            false
        }
    };
    let uptime_seconds = state.request_stats.uptime_seconds();

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        uptime_seconds,
        uptime_formatted: format_uptime(uptime_seconds),
        total_requests: state.request_stats.total_requests(),
        avg_response_time_ms: state.request_stats.avg_response_time_us() / 1000.0,
        ai_enabled: state.chat_agent.has_model(),
        instagram_configured: state.instagram_service.is_configured(),
    })
}

/// Format uptime to human readable string
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

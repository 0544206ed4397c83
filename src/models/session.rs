//! Admin session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side admin session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    /// SHA-256 hex digest of the bearer token
    pub id: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AdminSession {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

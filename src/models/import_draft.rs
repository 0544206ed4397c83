//! Import drafts scraped by the browser extension

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum DraftStatus ("draft status") {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

impl Default for DraftStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// A scraped listing awaiting admin review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDraft {
    pub id: i64,
    pub source_url: Option<String>,
    /// Normalized listing fields
    pub payload: serde_json::Value,
    pub status: DraftStatus,
    /// Set once the draft is approved
    pub listing_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

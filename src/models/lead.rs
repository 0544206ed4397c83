//! Lead model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Communication, Note};

string_enum! {
    /// Where a lead came from
    pub enum LeadSource ("lead source") {
        ContactForm => "contact_form",
        Chat => "chat",
        ListingInquiry => "listing_inquiry",
        Valuation => "valuation",
        Newsletter => "newsletter",
        Import => "import",
    }
}

impl Default for LeadSource {
    fn default() -> Self {
        Self::ContactForm
    }
}

string_enum! {
    pub enum LeadIntent ("lead intent") {
        Buy => "buy",
        Sell => "sell",
        Rent => "rent",
        Invest => "invest",
    }
}

string_enum! {
    /// Pipeline status of a lead
    pub enum LeadStatus ("lead status") {
        New => "new",
        Contacted => "contacted",
        Qualified => "qualified",
        Closed => "closed",
        Lost => "lost",
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

/// A prospective client's contact submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub source: LeadSource,
    pub listing_id: Option<i64>,
    pub intent: Option<LeadIntent>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for capturing a lead
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateLeadInput {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub source: Option<String>,
    pub listing_id: Option<i64>,
    pub intent: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLeadInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub intent: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    /// Free text matched against name, email and phone
    pub q: Option<String>,
}

/// A lead with its activity
#[derive(Debug, Clone, Serialize)]
pub struct LeadDetail {
    #[serde(flatten)]
    pub lead: Lead,
    pub communications: Vec<Communication>,
    pub notes: Vec<Note>,
}

/// Lead counts by status for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeadStats {
    pub total: i64,
    pub new: i64,
    pub contacted: i64,
    pub qualified: i64,
    pub closed: i64,
    pub lost: i64,
}

impl LeadStats {
    pub fn record(&mut self, status: LeadStatus, count: i64) {
        match status {
            LeadStatus::New => self.new += count,
            LeadStatus::Contacted => self.contacted += count,
            LeadStatus::Qualified => self.qualified += count,
            LeadStatus::Closed => self.closed += count,
            LeadStatus::Lost => self.lost += count,
        }
        self.total += count;
    }
}

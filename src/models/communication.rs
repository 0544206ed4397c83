//! Communication log entries for a lead

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum CommunicationChannel ("communication channel") {
        Email => "email",
        Phone => "phone",
        Text => "text",
        Meeting => "meeting",
    }
}

string_enum! {
    pub enum CommunicationDirection ("communication direction") {
        Inbound => "inbound",
        Outbound => "outbound",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    pub id: i64,
    pub lead_id: i64,
    pub channel: CommunicationChannel,
    pub direction: CommunicationDirection,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommunicationInput {
    pub channel: String,
    pub direction: String,
    pub summary: String,
    /// Defaults to now
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

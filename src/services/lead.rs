//! Lead service
//!
//! Captures contact submissions from the site forms and the chat agent,
//! notifies the broker, and backs the admin CRM views (pipeline status,
//! communications log, notes).

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::db::repositories::{CommunicationRepository, LeadRepository, ListingRepository, NoteRepository};
use crate::models::{
    Communication, CommunicationDirection, CreateCommunicationInput, CreateLeadInput, CreateNoteInput, Lead,
    LeadDetail, LeadFilter, LeadSource, LeadStats, LeadStatus, Note, Pagination, UpdateLeadInput,
};
use crate::services::email::Notifier;

/// Name given to chat leads that never introduced themselves
pub const CHAT_VISITOR_NAME: &str = "Chat visitor";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

#[derive(Debug, thiserror::Error)]
pub enum LeadServiceError {
    #[error("Lead not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

fn invalid(message: impl Into<String>) -> LeadServiceError {
    LeadServiceError::ValidationError(message.into())
}

/// Trim and drop empty strings
fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_optional<T: std::str::FromStr<Err = anyhow::Error>>(value: Option<&str>) -> Result<Option<T>, LeadServiceError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse().map(Some).map_err(|e: anyhow::Error| invalid(e.to_string())),
        None => Ok(None),
    }
}

/// Whether `email` looks like an address
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Whether `phone` holds a plausible number of digits
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&digits)
}

fn validate_contact(email: Option<&str>, phone: Option<&str>) -> Result<(), LeadServiceError> {
    if email.is_none() && phone.is_none() {
        return Err(invalid("email or phone is required"));
    }
    if let Some(email) = email {
        if !is_valid_email(email) {
            return Err(invalid(format!("invalid email address: {}", email)));
        }
    }
    if let Some(phone) = phone {
        if !is_valid_phone(phone) {
            return Err(invalid(format!("invalid phone number: {}", phone)));
        }
    }
    Ok(())
}

pub struct LeadService {
    leads: Arc<dyn LeadRepository>,
    communications: Arc<dyn CommunicationRepository>,
    notes: Arc<dyn NoteRepository>,
    listings: Arc<dyn ListingRepository>,
    notifier: Arc<Notifier>,
}

impl LeadService {
    pub fn new(
        leads: Arc<dyn LeadRepository>,
        communications: Arc<dyn CommunicationRepository>,
        notes: Arc<dyn NoteRepository>,
        listings: Arc<dyn ListingRepository>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            leads,
            communications,
            notes,
            listings,
            notifier,
        }
    }

    /// Validate and store a lead, then notify the broker.
    ///
    /// Email failures are logged; the lead is kept either way.
    pub async fn capture(&self, input: CreateLeadInput) -> Result<Lead, LeadServiceError> {
        let source: LeadSource = parse_optional(input.source.as_deref())?.unwrap_or_default();
        let intent = parse_optional(input.intent.as_deref())?;

        let name = match input.name.trim() {
            "" if source == LeadSource::Chat => CHAT_VISITOR_NAME.to_string(),
            "" => return Err(invalid("name is required")),
            name => name.to_string(),
        };
        let email = clean(input.email);
        let phone = clean(input.phone);
        validate_contact(email.as_deref(), phone.as_deref())?;

        let listing = match input.listing_id {
            Some(id) => Some(
                self.listings
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| invalid(format!("listing {} does not exist", id)))?,
            ),
            None => None,
        };

        let now = Utc::now();
        let lead = Lead {
            id: 0,
            name,
            email,
            phone,
            message: clean(input.message),
            source,
            listing_id: input.listing_id,
            intent,
            budget: clean(input.budget),
            timeline: clean(input.timeline),
            status: LeadStatus::New,
            created_at: now,
            updated_at: now,
        };
        let lead = self.leads.create(&lead).await?;
        tracing::info!(lead_id = lead.id, source = %lead.source, "Lead captured");

        if let Err(e) = self.notifier.lead_notification(&lead, listing.as_ref()).await {
            tracing::warn!(lead_id = lead.id, "Failed to send lead notification: {:#}", e);
        }
        if let Err(e) = self.notifier.lead_auto_reply(&lead).await {
            tracing::warn!(lead_id = lead.id, "Failed to send lead auto-reply: {:#}", e);
        }

        Ok(lead)
    }

    /// Newest first, with the total matching count
    pub async fn list(&self, filter: &LeadFilter, page: Pagination) -> Result<(Vec<Lead>, i64), LeadServiceError> {
        let leads = self.leads.list(filter, page).await?;
        let total = self.leads.count(filter).await?;
        Ok((leads, total))
    }

    async fn require(&self, id: i64) -> Result<Lead, LeadServiceError> {
        self.leads.get_by_id(id).await?.ok_or(LeadServiceError::NotFound(id))
    }

    /// A lead with its communications and notes
    pub async fn get(&self, id: i64) -> Result<LeadDetail, LeadServiceError> {
        let lead = self.require(id).await?;
        let communications = self.communications.list_by_lead(id).await?;
        let notes = self.notes.list_by_lead(id).await?;
        Ok(LeadDetail {
            lead,
            communications,
            notes,
        })
    }

    pub async fn update(&self, id: i64, patch: UpdateLeadInput) -> Result<Lead, LeadServiceError> {
        let mut lead = self.require(id).await?;

        if let Some(name) = patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid("name must not be empty"));
            }
            lead.name = name.to_string();
        }
        // An empty string clears a contact field
        if patch.email.is_some() {
            lead.email = clean(patch.email);
        }
        if patch.phone.is_some() {
            lead.phone = clean(patch.phone);
        }
        validate_contact(lead.email.as_deref(), lead.phone.as_deref())?;

        if let Some(status) = parse_optional(patch.status.as_deref())? {
            lead.status = status;
        }
        if patch.intent.is_some() {
            lead.intent = parse_optional(patch.intent.as_deref())?;
        }
        if patch.budget.is_some() {
            lead.budget = clean(patch.budget);
        }
        if patch.timeline.is_some() {
            lead.timeline = clean(patch.timeline);
        }
        lead.updated_at = Utc::now();

        let updated = self.leads.update(&lead).await?;
        tracing::info!(lead_id = id, status = %updated.status, "Lead updated");
        Ok(updated)
    }

    /// Delete a lead together with its communications and notes
    pub async fn delete(&self, id: i64) -> Result<(), LeadServiceError> {
        if !self.leads.delete(id).await? {
            return Err(LeadServiceError::NotFound(id));
        }
        tracing::info!(lead_id = id, "Lead deleted");
        Ok(())
    }

    /// Log a communication. Reaching out to a `new` lead moves it to `contacted`.
    pub async fn add_communication(
        &self,
        lead_id: i64,
        input: CreateCommunicationInput,
    ) -> Result<Communication, LeadServiceError> {
        let mut lead = self.require(lead_id).await?;

        let summary = input.summary.trim();
        if summary.is_empty() {
            return Err(invalid("summary is required"));
        }
        let channel = parse_optional(Some(input.channel.as_str()))?.ok_or_else(|| invalid("channel is required"))?;
        let direction: CommunicationDirection =
            parse_optional(Some(input.direction.as_str()))?.ok_or_else(|| invalid("direction is required"))?;

        let now = Utc::now();
        let communication = self
            .communications
            .create(&Communication {
                id: 0,
                lead_id,
                channel,
                direction,
                summary: summary.to_string(),
                occurred_at: input.occurred_at.unwrap_or(now),
                created_at: now,
            })
            .await?;

        if direction == CommunicationDirection::Outbound && lead.status == LeadStatus::New {
            lead.status = LeadStatus::Contacted;
            lead.updated_at = now;
            self.leads.update(&lead).await?;
            tracing::debug!(lead_id, "Lead marked contacted");
        }

        Ok(communication)
    }

    pub async fn list_communications(&self, lead_id: i64) -> Result<Vec<Communication>, LeadServiceError> {
        self.require(lead_id).await?;
        Ok(self.communications.list_by_lead(lead_id).await?)
    }

    pub async fn add_note(&self, lead_id: i64, input: CreateNoteInput, author: &str) -> Result<Note, LeadServiceError> {
        self.require(lead_id).await?;

        let body = input.body.trim();
        if body.is_empty() {
            return Err(invalid("note body is required"));
        }

        let note = self
            .notes
            .create(&Note {
                id: 0,
                lead_id,
                body: body.to_string(),
                author: author.to_string(),
                created_at: Utc::now(),
            })
            .await?;
        Ok(note)
    }

    pub async fn list_notes(&self, lead_id: i64) -> Result<Vec<Note>, LeadServiceError> {
        self.require(lead_id).await?;
        Ok(self.notes.list_by_lead(lead_id).await?)
    }

    /// Counts by status for the dashboard
    pub async fn stats(&self) -> Result<LeadStats, LeadServiceError> {
        let mut stats = LeadStats::default();
        for (status, count) in self.leads.count_by_status().await? {
            stats.record(status, count);
        }
        Ok(stats)
    }
}

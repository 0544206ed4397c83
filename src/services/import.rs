//! Listing import drafts
//!
//! The scraper extension posts whatever it found on a listing page. The
//! payload is normalized into listing fields and parked as a `pending`
//! draft until an admin approves it (creating a real listing) or rejects it.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::db::repositories::ImportDraftRepository;
use crate::models::{CreateListingInput, DraftStatus, ImportDraft, Listing};
use crate::services::listing::{build_listing, ListingService, ListingServiceError};
use crate::services::password::secrets_match;
use crate::services::search::parse_price;

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number pattern"));

#[derive(Debug, thiserror::Error)]
pub enum ImportServiceError {
    #[error("Invalid or missing import token")]
    Unauthorized,

    #[error("Import draft not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<ListingServiceError> for ImportServiceError {
    fn from(e: ListingServiceError) -> Self {
        match e {
            ListingServiceError::ValidationError(msg) => ImportServiceError::ValidationError(msg),
            ListingServiceError::InternalError(inner) => ImportServiceError::InternalError(inner),
            ListingServiceError::NotFound(id) => {
                ImportServiceError::InternalError(anyhow::anyhow!("listing {} vanished during import", id))
            }
        }
    }
}

pub struct ImportService {
    drafts: Arc<dyn ImportDraftRepository>,
    listings: Arc<ListingService>,
    import_token: Option<String>,
}

impl ImportService {
    pub fn new(
        drafts: Arc<dyn ImportDraftRepository>,
        listings: Arc<ListingService>,
        import_token: Option<String>,
    ) -> Self {
        Self {
            drafts,
            listings,
            import_token: import_token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Check the extension's shared secret. Imports are closed when no
    /// token is configured.
    pub fn check_token(&self, provided: Option<&str>) -> Result<(), ImportServiceError> {
        match (self.import_token.as_deref(), provided) {
            (Some(expected), Some(provided)) if secrets_match(provided.trim(), expected) => Ok(()),
            _ => Err(ImportServiceError::Unauthorized),
        }
    }

    /// Normalize a scraped payload and store it as a pending draft
    pub async fn create_draft(&self, raw: &Value) -> Result<ImportDraft, ImportServiceError> {
        let payload = normalize_payload(raw)?;
        let source_url = payload
            .get("source_url")
            .and_then(Value::as_str)
            .map(String::from);

        let draft = self
            .drafts
            .create(&ImportDraft {
                id: 0,
                source_url,
                payload: Value::Object(payload),
                status: DraftStatus::Pending,
                listing_id: None,
                created_at: Utc::now(),
                reviewed_at: None,
            })
            .await?;

        tracing::info!(draft_id = draft.id, source_url = ?draft.source_url, "Import draft created");
        Ok(draft)
    }

    pub async fn list_drafts(&self, status: Option<DraftStatus>) -> Result<Vec<ImportDraft>, ImportServiceError> {
        Ok(self.drafts.list(status).await?)
    }

    pub async fn get_draft(&self, id: i64) -> Result<ImportDraft, ImportServiceError> {
        self.drafts.get_by_id(id).await?.ok_or(ImportServiceError::NotFound(id))
    }

    async fn pending_draft(&self, id: i64) -> Result<ImportDraft, ImportServiceError> {
        let draft = self.get_draft(id).await?;
        if draft.status != DraftStatus::Pending {
            return Err(ImportServiceError::Conflict(format!(
                "draft {} is already {}",
                id, draft.status
            )));
        }
        Ok(draft)
    }

    /// Publish a pending draft as a listing.
    ///
    /// `overrides` is an object of listing fields merged over the payload;
    /// a `null` value removes the field.
    pub async fn approve(&self, id: i64, overrides: Option<&Value>) -> Result<(ImportDraft, Listing), ImportServiceError> {
        let mut draft = self.pending_draft(id).await?;

        if let Some(overrides) = overrides.filter(|v| !v.is_null()) {
            let Some(fields) = overrides.as_object() else {
                return Err(ImportServiceError::ValidationError("overrides must be an object".into()));
            };
            merge(&mut draft.payload, fields);
        }

        let input: CreateListingInput = serde_json::from_value(draft.payload.clone())
            .map_err(|e| ImportServiceError::ValidationError(format!("invalid listing fields: {}", e)))?;
        // Validate before claiming the draft so a bad payload leaves it pending
        build_listing(input.clone())?;

        let claimed = ImportDraft {
            status: DraftStatus::Approved,
            reviewed_at: Some(Utc::now()),
            ..draft.clone()
        };
        if !self.drafts.update_if_status(&claimed, DraftStatus::Pending).await? {
            return Err(ImportServiceError::Conflict(format!("draft {} was reviewed concurrently", id)));
        }

        let listing = match self.listings.create(input).await {
            Ok(listing) => listing,
            Err(e) => {
                // Put the draft back so it can be fixed and approved again
                let reverted = ImportDraft {
                    status: DraftStatus::Pending,
                    reviewed_at: None,
                    ..draft
                };
                if let Err(revert_err) = self.drafts.update_if_status(&reverted, DraftStatus::Approved).await {
                    tracing::error!(draft_id = id, "Failed to revert import draft: {}", revert_err);
                }
                return Err(e.into());
            }
        };

        let approved = ImportDraft {
            listing_id: Some(listing.id),
            ..claimed
        };
        if !self.drafts.update_if_status(&approved, DraftStatus::Approved).await? {
            tracing::error!(draft_id = id, listing_id = listing.id, "Approved draft changed before its listing was recorded");
            return Err(ImportServiceError::Conflict(format!(
                "draft {} changed while it was being approved",
                id
            )));
        }

        tracing::info!(draft_id = id, listing_id = listing.id, "Import draft approved");
        Ok((approved, listing))
    }

    pub async fn reject(&self, id: i64) -> Result<ImportDraft, ImportServiceError> {
        let draft = self.pending_draft(id).await?;
        let rejected = ImportDraft {
            status: DraftStatus::Rejected,
            reviewed_at: Some(Utc::now()),
            ..draft
        };
        if !self.drafts.update_if_status(&rejected, DraftStatus::Pending).await? {
            return Err(ImportServiceError::Conflict(format!("draft {} was reviewed concurrently", id)));
        }
        tracing::info!(draft_id = id, "Import draft rejected");
        Ok(rejected)
    }
}

fn merge(payload: &mut Value, fields: &Map<String, Value>) {
    if !payload.is_object() {
        *payload = Value::Object(Map::new());
    }
    if let Some(target) = payload.as_object_mut() {
        for (key, value) in fields {
            if value.is_null() {
                target.remove(key);
            } else {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn pick<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// First number in a value: `3`, `"3 bd"`, `"1,850 sqft"`
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => NUMBER.find(&s.replace(',', "")).and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

fn price(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i64),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(o) => o.get("url").and_then(text),
                other => text(other),
            })
            .collect(),
        Value::String(s) => s
            .split([',', ';', '\n', '•'])
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}

/// Map a site's property type wording onto ours
pub fn map_property_type(raw: &str) -> Option<&'static str> {
    let s = raw.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| s.contains(w));
    if has(&["town"]) {
        Some("townhouse")
    } else if has(&["multi", "duplex", "triplex", "fourplex", "quadplex"]) {
        Some("multi_family")
    } else if has(&["condo", "co-op", "coop", "apartment", "loft"]) {
        Some("condo")
    } else if has(&["land", "lot", "acre"]) {
        Some("land")
    } else if has(&["commercial", "office", "retail", "industrial", "warehouse"]) {
        Some("commercial")
    } else if has(&["single", "house", "residential", "home", "detached", "bungalow", "cottage"]) {
        Some("house")
    } else {
        None
    }
}

fn map_listing_type(raw: &str) -> Option<&'static str> {
    let s = raw.to_lowercase();
    if s.contains("rent") || s.contains("lease") {
        Some("rent")
    } else if s.contains("sale") || s.contains("sell") || s.contains("buy") {
        Some("sale")
    } else {
        None
    }
}

/// Turn a scraped page payload into listing fields.
///
/// Keys are matched under the names scrapers commonly use (`beds`,
/// `sqft`, `zip`, `url`, ...). Unknown keys are dropped.
pub fn normalize_payload(raw: &Value) -> Result<Map<String, Value>, ImportServiceError> {
    let Some(obj) = raw.as_object() else {
        return Err(ImportServiceError::ValidationError("payload must be a JSON object".into()));
    };

    let mut out = Map::new();
    let text_fields: &[(&str, &[&str])] = &[
        ("title", &["title", "name", "headline"]),
        ("address", &["address", "street", "street_address", "streetAddress"]),
        ("city", &["city", "locality"]),
        ("state", &["state", "region", "province"]),
        ("zip_code", &["zip_code", "zip", "zipcode", "postal_code", "postalCode"]),
        ("description", &["description", "remarks", "summary"]),
        ("source_url", &["source_url", "url", "link", "page_url"]),
    ];
    for (field, keys) in text_fields {
        if let Some(value) = pick(obj, keys).and_then(text) {
            out.insert((*field).to_string(), Value::String(value));
        }
    }

    let price_value = pick(obj, &["price", "list_price", "listPrice", "rent"]);
    if let Some(p) = price_value.and_then(price) {
        out.insert("price".into(), Value::from(p.max(0)));
    }

    let listing_type = pick(obj, &["listing_type", "listingType", "status_text", "type"])
        .and_then(text)
        .and_then(|t| map_listing_type(&t))
        .or_else(|| {
            // "$2,400/mo" is a rent
            price_value
                .and_then(Value::as_str)
                .filter(|p| p.contains("/mo") || p.to_lowercase().contains("month"))
                .map(|_| "rent")
        });
    if let Some(listing_type) = listing_type {
        out.insert("listing_type".into(), Value::from(listing_type));
    }

    if let Some(property_type) = pick(obj, &["property_type", "propertyType", "home_type", "homeType"])
        .and_then(text)
        .and_then(|t| map_property_type(&t))
    {
        out.insert("property_type".into(), Value::from(property_type));
    }

    if let Some(beds) = pick(obj, &["bedrooms", "beds", "bed"]).and_then(number) {
        out.insert("bedrooms".into(), Value::from(beds.floor() as i64));
    }
    if let Some(baths) = pick(obj, &["bathrooms", "baths", "bath"]).and_then(number) {
        out.insert("bathrooms".into(), Value::from(baths));
    }
    if let Some(sqft) = pick(obj, &["square_feet", "sqft", "living_area", "livingArea", "area"]).and_then(number) {
        out.insert("square_feet".into(), Value::from(sqft.round() as i64));
    }
    if let Some(year) = pick(obj, &["year_built", "yearBuilt", "built"]).and_then(number) {
        out.insert("year_built".into(), Value::from(year as i64));
    }

    for (field, keys) in [
        ("features", &["features", "amenities", "highlights"][..]),
        ("images", &["images", "photos", "image_urls"][..]),
    ] {
        if let Some(value) = pick(obj, keys) {
            let mut items = string_list(value);
            if field == "images" {
                items.retain(|u| u.starts_with("http://") || u.starts_with("https://"));
            }
            if !items.is_empty() {
                out.insert(field.to_string(), Value::from(items));
            }
        }
    }

    if out.is_empty() {
        return Err(ImportServiceError::ValidationError(
            "payload has no recognizable listing fields".into(),
        ));
    }
    Ok(out)
}

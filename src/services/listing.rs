//! Listing service
//!
//! Business rules for property listings:
//! - Validation and defaulting of create/update input
//! - Public visibility (only `active` and `pending` listings are shown)
//! - Caching of public list queries, cleared on every write

use crate::cache::SharedCache;
use crate::db::repositories::ListingRepository;
use crate::models::{CreateListingInput, Listing, ListingFilter, UpdateListingInput};
use chrono::Utc;
use std::sync::Arc;

/// Cache key prefix shared by all listing entries
const CACHE_PREFIX: &str = "listings:";

/// Page size used when loading the whole public inventory for search
const INVENTORY_PAGE: i64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum ListingServiceError {
    #[error("Listing not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ListingService {
    repo: Arc<dyn ListingRepository>,
    cache: SharedCache,
}

impl ListingService {
    pub fn new(repo: Arc<dyn ListingRepository>, cache: SharedCache) -> Self {
        Self { repo, cache }
    }

    pub async fn create(&self, input: CreateListingInput) -> Result<Listing, ListingServiceError> {
        let listing = build_listing(input)?;
        let created = self.repo.create(&listing).await?;
        self.invalidate().await;
        tracing::info!(listing_id = created.id, title = %created.title, "Listing created");
        Ok(created)
    }

    /// Any listing regardless of status
    pub async fn get(&self, id: i64) -> Result<Listing, ListingServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(ListingServiceError::NotFound(id))
    }

    /// A listing as the public sees it: hidden statuses are not found
    pub async fn get_public(&self, id: i64) -> Result<Listing, ListingServiceError> {
        let listing = self.get(id).await?;
        if !listing.is_visible() {
            return Err(ListingServiceError::NotFound(id));
        }
        Ok(listing)
    }

    /// List listings. Public queries (no hidden statuses) go through the cache.
    pub async fn list(&self, filter: &ListingFilter) -> Result<Vec<Listing>, ListingServiceError> {
        if filter.include_hidden {
            return Ok(self.repo.list(filter).await?);
        }

        let key = filter.cache_key();
        if let Some(cached) = self.cache.get::<Vec<Listing>>(&key).await {
            tracing::debug!(key = %key, "Listing cache hit");
            return Ok(cached);
        }

        let listings = self.repo.list(filter).await?;
        if let Err(e) = self.cache.set(&key, &listings).await {
            tracing::warn!("Failed to cache listings: {}", e);
        }
        Ok(listings)
    }

    /// Every visible listing in display order, for search and chat
    pub async fn visible_inventory(&self) -> Result<Vec<Listing>, ListingServiceError> {
        let mut inventory = Vec::new();
        loop {
            let page = self
                .list(&ListingFilter {
                    limit: INVENTORY_PAGE,
                    offset: inventory.len() as i64,
                    ..Default::default()
                })
                .await?;
            let done = (page.len() as i64) < INVENTORY_PAGE;
            inventory.extend(page);
            if done {
                return Ok(inventory);
            }
        }
    }

    pub async fn update(&self, id: i64, patch: UpdateListingInput) -> Result<Listing, ListingServiceError> {
        let mut listing = self.get(id).await?;
        apply_patch(&mut listing, patch)?;
        validate_listing(&listing)?;
        listing.updated_at = Utc::now();

        let updated = self.repo.update(&listing).await?;
        self.invalidate().await;
        tracing::info!(listing_id = id, "Listing updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ListingServiceError> {
        if !self.repo.delete(id).await? {
            return Err(ListingServiceError::NotFound(id));
        }
        self.invalidate().await;
        tracing::info!(listing_id = id, "Listing deleted");
        Ok(())
    }

    async fn invalidate(&self) {
        self.cache.delete_prefix(CACHE_PREFIX).await;
    }
}

fn parse_enum<T: std::str::FromStr<Err = anyhow::Error>>(
    value: Option<&str>,
    default: T,
) -> Result<T, ListingServiceError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .map_err(|e: anyhow::Error| ListingServiceError::ValidationError(e.to_string())),
        None => Ok(default),
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Turn create input into a validated listing (id 0, timestamps now)
pub fn build_listing(input: CreateListingInput) -> Result<Listing, ListingServiceError> {
    let now = Utc::now();
    let listing = Listing {
        id: 0,
        title: input.title.trim().to_string(),
        address: input.address.trim().to_string(),
        city: input.city.trim().to_string(),
        state: input.state.trim().to_string(),
        zip_code: input.zip_code.trim().to_string(),
        price: input.price,
        listing_type: parse_enum(input.listing_type.as_deref(), Default::default())?,
        property_type: parse_enum(input.property_type.as_deref(), Default::default())?,
        status: parse_enum(input.status.as_deref(), Default::default())?,
        bedrooms: input.bedrooms,
        bathrooms: input.bathrooms,
        square_feet: input.square_feet,
        year_built: input.year_built,
        description: input.description.trim().to_string(),
        features: clean_list(input.features),
        images: clean_list(input.images),
        featured: input.featured,
        source_url: clean_optional(input.source_url),
        created_at: now,
        updated_at: now,
    };
    validate_listing(&listing)?;
    Ok(listing)
}

fn apply_patch(listing: &mut Listing, patch: UpdateListingInput) -> Result<(), ListingServiceError> {
    if let Some(title) = patch.title {
        listing.title = title.trim().to_string();
    }
    if let Some(address) = patch.address {
        listing.address = address.trim().to_string();
    }
    if let Some(city) = patch.city {
        listing.city = city.trim().to_string();
    }
    if let Some(state) = patch.state {
        listing.state = state.trim().to_string();
    }
    if let Some(zip_code) = patch.zip_code {
        listing.zip_code = zip_code.trim().to_string();
    }
    if let Some(price) = patch.price {
        listing.price = price;
    }
    if patch.listing_type.is_some() {
        listing.listing_type = parse_enum(patch.listing_type.as_deref(), listing.listing_type)?;
    }
    if patch.property_type.is_some() {
        listing.property_type = parse_enum(patch.property_type.as_deref(), listing.property_type)?;
    }
    if patch.status.is_some() {
        listing.status = parse_enum(patch.status.as_deref(), listing.status)?;
    }
    if let Some(bedrooms) = patch.bedrooms {
        listing.bedrooms = bedrooms;
    }
    if let Some(bathrooms) = patch.bathrooms {
        listing.bathrooms = bathrooms;
    }
    if let Some(square_feet) = patch.square_feet {
        listing.square_feet = square_feet;
    }
    if let Some(year_built) = patch.year_built {
        listing.year_built = year_built;
    }
    if let Some(description) = patch.description {
        listing.description = description.trim().to_string();
    }
    if let Some(features) = patch.features {
        listing.features = clean_list(features);
    }
    if let Some(images) = patch.images {
        listing.images = clean_list(images);
    }
    if let Some(featured) = patch.featured {
        listing.featured = featured;
    }
    if let Some(source_url) = patch.source_url {
        listing.source_url = clean_optional(source_url);
    }
    Ok(())
}

fn validate_listing(listing: &Listing) -> Result<(), ListingServiceError> {
    let required = [
        ("title", &listing.title),
        ("address", &listing.address),
        ("city", &listing.city),
    ];
    for (field, value) in required {
        if value.is_empty() {
            return Err(ListingServiceError::ValidationError(format!("{} is required", field)));
        }
    }
    if listing.price < 0 {
        return Err(ListingServiceError::ValidationError("price must not be negative".into()));
    }
    if listing.bedrooms.is_some_and(|b| b < 0) {
        return Err(ListingServiceError::ValidationError("bedrooms must not be negative".into()));
    }
    if listing.bathrooms.is_some_and(|b| b < 0.0 || !b.is_finite()) {
        return Err(ListingServiceError::ValidationError("bathrooms must not be negative".into()));
    }
    if listing.square_feet.is_some_and(|s| s < 0) {
        return Err(ListingServiceError::ValidationError("square_feet must not be negative".into()));
    }
    Ok(())
}

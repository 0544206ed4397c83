//! Listing API endpoints
//!
//! - GET /api/listings - Filtered list (admins may pass `all=true`)
//! - GET /api/listings/{id} - Detail; hidden listings 404 for the public
//! - POST /api/listings - Create (admin)
//! - PATCH /api/listings/{id} - Partial update (admin)
//! - DELETE /api/listings/{id} - Delete (admin)

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::parse_param;
use crate::api::middleware::{current_admin, AdminUser, ApiError, AppState};
use crate::models::{CreateListingInput, Listing, ListingFilter, Pagination, UpdateListingInput};

/// Query parameters for GET /api/listings
#[derive(Debug, Default, Deserialize)]
pub struct ListListingsQuery {
    pub status: Option<String>,
    pub property_type: Option<String>,
    pub listing_type: Option<String>,
    pub city: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_bedrooms: Option<i32>,
    pub featured: Option<bool>,
    /// Include sold and off-market listings (admin only)
    #[serde(default)]
    pub all: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListListingsQuery {
    fn into_filter(self, include_hidden: bool) -> Result<ListingFilter, ApiError> {
        let page = Pagination::new(self.limit, self.offset);
        Ok(ListingFilter {
            status: parse_param("status", self.status.as_deref())?,
            property_type: parse_param("property_type", self.property_type.as_deref())?,
            listing_type: parse_param("listing_type", self.listing_type.as_deref())?,
            city: self.city.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            min_price: self.min_price,
            max_price: self.max_price,
            min_bedrooms: self.min_bedrooms,
            featured: self.featured,
            include_hidden,
            limit: page.limit,
            offset: page.offset,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ListingListResponse {
    pub listings: Vec<Listing>,
    pub count: usize,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/listings", get(list_listings))
        .route("/listings/{id}", get(get_listing))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/listings", post(create_listing))
        .route("/listings/{id}", patch(update_listing).delete(delete_listing))
}

/// GET /api/listings
async fn list_listings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListListingsQuery>,
) -> Result<Json<ListingListResponse>, ApiError> {
    let include_hidden = if query.all {
        if current_admin(&state, &headers).await?.is_none() {
            return Err(ApiError::unauthorized("Admin session required for all=true"));
        }
        true
    } else {
        false
    };

    let filter = query.into_filter(include_hidden)?;
    let listings = state.listing_service.list(&filter).await?;

    Ok(Json(ListingListResponse {
        count: listings.len(),
        listings,
    }))
}

/// GET /api/listings/{id}
///
/// Sold and off-market listings are only visible to an admin session.
async fn get_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Listing>, ApiError> {
    let listing = if current_admin(&state, &headers).await?.is_some() {
        state.listing_service.get(id).await?
    } else {
        state.listing_service.get_public(id).await?
    };
    Ok(Json(listing))
}

/// POST /api/listings
async fn create_listing(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<CreateListingInput>,
) -> Result<(StatusCode, Json<Listing>), ApiError> {
    let listing = state.listing_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// PATCH /api/listings/{id}
async fn update_listing(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateListingInput>,
) -> Result<Json<Listing>, ApiError> {
    Ok(Json(state.listing_service.update(id, body).await?))
}

/// DELETE /api/listings/{id}
async fn delete_listing(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.listing_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

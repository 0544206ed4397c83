//! Listing model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

string_enum! {
    /// Whether a property is offered for sale or for rent
    pub enum ListingType ("listing type") {
        Sale => "sale",
        Rent => "rent",
    }
}

impl Default for ListingType {
    fn default() -> Self {
        Self::Sale
    }
}

string_enum! {
    pub enum PropertyType ("property type") {
        House => "house",
        Condo => "condo",
        Townhouse => "townhouse",
        MultiFamily => "multi_family",
        Land => "land",
        Commercial => "commercial",
    }
}

impl Default for PropertyType {
    fn default() -> Self {
        Self::House
    }
}

impl PropertyType {
    /// Human label used in generated text ("multi-family home")
    pub fn label(&self) -> &'static str {
        match self {
            Self::House => "house",
            Self::Condo => "condo",
            Self::Townhouse => "townhouse",
            Self::MultiFamily => "multi-family home",
            Self::Land => "land",
            Self::Commercial => "commercial property",
        }
    }
}

string_enum! {
    /// Listing lifecycle status
    pub enum ListingStatus ("listing status") {
        Active => "active",
        Pending => "pending",
        Sold => "sold",
        OffMarket => "off_market",
    }
}

impl Default for ListingStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl ListingStatus {
    /// Statuses shown on the public site
    pub const VISIBLE: &'static [ListingStatus] = &[ListingStatus::Active, ListingStatus::Pending];

    pub fn is_visible(&self) -> bool {
        Self::VISIBLE.contains(self)
    }
}

/// A property record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub title: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    /// Whole dollars
    pub price: i64,
    pub listing_type: ListingType,
    pub property_type: PropertyType,
    pub status: ListingStatus,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<i32>,
    pub year_built: Option<i32>,
    pub description: String,
    pub features: Vec<String>,
    pub images: Vec<String>,
    pub featured: bool,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_visible(&self) -> bool {
        self.status.is_visible()
    }

    /// "123 Main St, Austin, TX 78701"
    pub fn full_address(&self) -> String {
        let mut out = format!("{}, {}", self.address, self.city);
        if !self.state.is_empty() {
            out.push_str(", ");
            out.push_str(&self.state);
        }
        if !self.zip_code.is_empty() {
            out.push(' ');
            out.push_str(&self.zip_code);
        }
        out
    }
}

/// Input for creating a listing.
///
/// Enum fields arrive as strings so unknown values can be reported as
/// validation errors instead of deserialization failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateListingInput {
    pub title: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub price: i64,
    pub listing_type: Option<String>,
    pub property_type: Option<String>,
    pub status: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<i32>,
    pub year_built: Option<i32>,
    pub description: String,
    pub features: Vec<String>,
    pub images: Vec<String>,
    pub featured: bool,
    pub source_url: Option<String>,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateListingInput {
    pub title: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub price: Option<i64>,
    pub listing_type: Option<String>,
    pub property_type: Option<String>,
    pub status: Option<String>,
    /// `null` clears the value
    #[serde(default, deserialize_with = "nullable")]
    pub bedrooms: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub bathrooms: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub square_feet: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub year_built: Option<Option<i32>>,
    pub description: Option<String>,
    pub features: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
    pub featured: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub source_url: Option<Option<String>>,
}

/// Tell an explicit `null` (`Some(None)`) apart from an absent field (`None`)
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Listing query filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingFilter {
    pub status: Option<ListingStatus>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    /// Case-insensitive exact match
    pub city: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_bedrooms: Option<i32>,
    pub featured: Option<bool>,
    /// When false only visible statuses are returned
    pub include_hidden: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListingFilter {
    fn default() -> Self {
        Self {
            status: None,
            property_type: None,
            listing_type: None,
            city: None,
            min_price: None,
            max_price: None,
            min_bedrooms: None,
            featured: None,
            include_hidden: false,
            limit: 50,
            offset: 0,
        }
    }
}

impl ListingFilter {
    /// Stable cache key for this filter
    pub fn cache_key(&self) -> String {
        format!(
            "listings:list:{}",
            serde_json::to_string(self).unwrap_or_default()
        )
    }
}

//! Listing repository

use crate::db::{DynDatabasePool, PoolRef};
use crate::models::{Listing, ListingFilter, ListingStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{PgPool, Row, SqlitePool};
use std::sync::Arc;

use super::{bind_postgres, bind_sqlite, decode_string_list, encode_string_list, Conditions, SqlValue};

#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Insert a listing; `id` is ignored and assigned by the database
    async fn create(&self, listing: &Listing) -> Result<Listing>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Listing>>;
    async fn list(&self, filter: &ListingFilter) -> Result<Vec<Listing>>;
    async fn update(&self, listing: &Listing) -> Result<Listing>;
    /// Returns false when no row was deleted
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxListingRepository {
    pool: DynDatabasePool,
}

impl SqlxListingRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ListingRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ListingRepository for SqlxListingRepository {
    async fn create(&self, listing: &Listing) -> Result<Listing> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => create_sqlite(p, listing).await,
            PoolRef::Postgres(p) => create_postgres(p, listing).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Listing>> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => get_by_id_sqlite(p, id).await,
            PoolRef::Postgres(p) => get_by_id_postgres(p, id).await,
        }
    }

    async fn list(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => list_sqlite(p, filter).await,
            PoolRef::Postgres(p) => list_postgres(p, filter).await,
        }
    }

    async fn update(&self, listing: &Listing) -> Result<Listing> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => update_sqlite(p, listing).await,
            PoolRef::Postgres(p) => update_postgres(p, listing).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => delete_sqlite(p, id).await,
            PoolRef::Postgres(p) => delete_postgres(p, id).await,
        }
    }
}

const LISTING_COLUMNS: &str = "id, title, address, city, state, zip_code, price, listing_type, \
    property_type, status, bedrooms, bathrooms, square_feet, year_built, description, features, \
    images, featured, source_url, created_at, updated_at";

const INSERT_SQL: &str = "INSERT INTO listings (title, address, city, state, zip_code, price, \
    listing_type, property_type, status, bedrooms, bathrooms, square_feet, year_built, description, \
    features, images, featured, source_url, created_at, updated_at) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)";

const UPDATE_SQL: &str = "UPDATE listings SET title = $1, address = $2, city = $3, state = $4, \
    zip_code = $5, price = $6, listing_type = $7, property_type = $8, status = $9, bedrooms = $10, \
    bathrooms = $11, square_feet = $12, year_built = $13, description = $14, features = $15, \
    images = $16, featured = $17, source_url = $18, updated_at = $19 WHERE id = $20";

const ORDER_SQL: &str = " ORDER BY featured DESC, created_at DESC, id DESC";

/// Binds the writable columns in INSERT/UPDATE order, ending with the timestamps given
macro_rules! bind_listing_fields {
    ($query:expr, $listing:expr) => {
        $query
            .bind(&$listing.title)
            .bind(&$listing.address)
            .bind(&$listing.city)
            .bind(&$listing.state)
            .bind(&$listing.zip_code)
            .bind($listing.price)
            .bind($listing.listing_type.as_str())
            .bind($listing.property_type.as_str())
            .bind($listing.status.as_str())
            .bind($listing.bedrooms)
            .bind($listing.bathrooms)
            .bind($listing.square_feet)
            .bind($listing.year_built)
            .bind(&$listing.description)
            .bind(encode_string_list(&$listing.features))
            .bind(encode_string_list(&$listing.images))
            .bind($listing.featured)
            .bind(&$listing.source_url)
    };
}

macro_rules! listing_from_row {
    ($row:expr) => {{
        let row = $row;
        let listing_type: String = row.try_get("listing_type")?;
        let property_type: String = row.try_get("property_type")?;
        let status: String = row.try_get("status")?;
        let features: String = row.try_get("features")?;
        let images: String = row.try_get("images")?;
        Ok(Listing {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            zip_code: row.try_get("zip_code")?,
            price: row.try_get("price")?,
            listing_type: listing_type.parse()?,
            property_type: property_type.parse()?,
            status: status.parse()?,
            bedrooms: row.try_get("bedrooms")?,
            bathrooms: row.try_get("bathrooms")?,
            square_feet: row.try_get("square_feet")?,
            year_built: row.try_get("year_built")?,
            description: row.try_get("description")?,
            features: decode_string_list(&features),
            images: decode_string_list(&images),
            featured: row.try_get("featured")?,
            source_url: row.try_get("source_url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }};
}

fn row_to_listing_sqlite(row: &SqliteRow) -> Result<Listing> {
    listing_from_row!(row)
}

fn row_to_listing_postgres(row: &PgRow) -> Result<Listing> {
    listing_from_row!(row)
}

fn build_filter(filter: &ListingFilter) -> Conditions {
    let mut conditions = Conditions::new();

    if !filter.include_hidden {
        let visible: Vec<String> = ListingStatus::VISIBLE
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect();
        conditions.push(format!("status IN ({})", visible.join(", ")));
    }
    if let Some(status) = filter.status {
        conditions.push_value("status = {}", SqlValue::Text(status.as_str().to_string()));
    }
    if let Some(property_type) = filter.property_type {
        conditions.push_value("property_type = {}", SqlValue::Text(property_type.as_str().to_string()));
    }
    if let Some(listing_type) = filter.listing_type {
        conditions.push_value("listing_type = {}", SqlValue::Text(listing_type.as_str().to_string()));
    }
    if let Some(city) = filter.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        conditions.push_value("LOWER(city) = {}", SqlValue::Text(city.to_lowercase()));
    }
    if let Some(min_price) = filter.min_price {
        conditions.push_value("price >= {}", SqlValue::Int(min_price));
    }
    if let Some(max_price) = filter.max_price {
        conditions.push_value("price <= {}", SqlValue::Int(max_price));
    }
    if let Some(min_bedrooms) = filter.min_bedrooms {
        conditions.push_value("bedrooms >= {}", SqlValue::Int(min_bedrooms as i64));
    }
    if let Some(featured) = filter.featured {
        conditions.push_value("featured = {}", SqlValue::Bool(featured));
    }

    conditions
}

fn list_sql(filter: &ListingFilter) -> (String, Conditions) {
    let mut conditions = build_filter(filter);
    let where_sql = conditions.where_sql();
    let limit = conditions.bind(SqlValue::Int(filter.limit));
    let offset = conditions.bind(SqlValue::Int(filter.offset));
    let sql = format!(
        "SELECT {} FROM listings{}{} LIMIT {} OFFSET {}",
        LISTING_COLUMNS, where_sql, ORDER_SQL, limit, offset
    );
    (sql, conditions)
}

// SQLite implementations
async fn create_sqlite(pool: &SqlitePool, listing: &Listing) -> Result<Listing> {
    let result = bind_listing_fields!(sqlx::query(INSERT_SQL), listing)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(pool)
        .await
        .context("Failed to create listing")?;

    Ok(Listing {
        id: result.last_insert_rowid(),
        ..listing.clone()
    })
}

async fn get_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Listing>> {
    let sql = format!("SELECT {} FROM listings WHERE id = $1", LISTING_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get listing")?;
    row.as_ref().map(row_to_listing_sqlite).transpose()
}

async fn list_sqlite(pool: &SqlitePool, filter: &ListingFilter) -> Result<Vec<Listing>> {
    let (sql, conditions) = list_sql(filter);
    let rows = bind_sqlite(sqlx::query(&sql), conditions.values())
        .fetch_all(pool)
        .await
        .context("Failed to list listings")?;
    rows.iter().map(row_to_listing_sqlite).collect()
}

async fn update_sqlite(pool: &SqlitePool, listing: &Listing) -> Result<Listing> {
    bind_listing_fields!(sqlx::query(UPDATE_SQL), listing)
        .bind(listing.updated_at)
        .bind(listing.id)
        .execute(pool)
        .await
        .context("Failed to update listing")?;
    Ok(listing.clone())
}

async fn delete_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM listings WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete listing")?;
    Ok(result.rows_affected() > 0)
}

// Postgres implementations
async fn create_postgres(pool: &PgPool, listing: &Listing) -> Result<Listing> {
    let sql = format!("{} RETURNING id", INSERT_SQL);
    let row = bind_listing_fields!(sqlx::query(&sql), listing)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .fetch_one(pool)
        .await
        .context("Failed to create listing")?;

    Ok(Listing {
        id: row.try_get("id")?,
        ..listing.clone()
    })
}

async fn get_by_id_postgres(pool: &PgPool, id: i64) -> Result<Option<Listing>> {
    let sql = format!("SELECT {} FROM listings WHERE id = $1", LISTING_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get listing")?;
    row.as_ref().map(row_to_listing_postgres).transpose()
}

async fn list_postgres(pool: &PgPool, filter: &ListingFilter) -> Result<Vec<Listing>> {
    let (sql, conditions) = list_sql(filter);
    let rows = bind_postgres(sqlx::query(&sql), conditions.values())
        .fetch_all(pool)
        .await
        .context("Failed to list listings")?;
    rows.iter().map(row_to_listing_postgres).collect()
}

async fn update_postgres(pool: &PgPool, listing: &Listing) -> Result<Listing> {
    bind_listing_fields!(sqlx::query(UPDATE_SQL), listing)
        .bind(listing.updated_at)
        .bind(listing.id)
        .execute(pool)
        .await
        .context("Failed to update listing")?;
    Ok(listing.clone())
}

async fn delete_postgres(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM listings WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete listing")?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ListingType, PropertyType};
    use chrono::{Duration, Utc};

    async fn setup_test_repo() -> SqlxListingRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxListingRepository::new(pool)
    }

    pub(crate) fn sample_listing(title: &str) -> Listing {
        let now = Utc::now();
        Listing {
            id: 0,
            title: title.to_string(),
            address: "12 Harbor Rd".to_string(),
            city: "Portland".to_string(),
            state: "ME".to_string(),
            zip_code: "04101".to_string(),
            price: 450_000,
            listing_type: ListingType::Sale,
            property_type: PropertyType::House,
            status: ListingStatus::Active,
            bedrooms: Some(3),
            bathrooms: Some(2.5),
            square_feet: Some(1800),
            year_built: Some(1994),
            description: "Bright cape near the water".to_string(),
            features: vec!["garage".to_string(), "fireplace".to_string()],
            images: vec!["https://img.example/1.jpg".to_string()],
            featured: false,
            source_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_listing() {
        let repo = setup_test_repo().await;
        let created = repo.create(&sample_listing("Harbor cape")).await.unwrap();
        assert!(created.id > 0);

        let fetched = repo.get_by_id(created.id).await.unwrap().expect("listing exists");
        assert_eq!(fetched.title, "Harbor cape");
        assert_eq!(fetched.bathrooms, Some(2.5));
        assert_eq!(fetched.features, vec!["garage", "fireplace"]);
        assert_eq!(fetched.property_type, PropertyType::House);
    }

    #[tokio::test]
    async fn test_get_missing_listing() {
        let repo = setup_test_repo().await;
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_hides_sold_unless_requested() {
        let repo = setup_test_repo().await;
        repo.create(&sample_listing("Active")).await.unwrap();
        let mut sold = sample_listing("Sold");
        sold.status = ListingStatus::Sold;
        repo.create(&sold).await.unwrap();

        let public = repo.list(&ListingFilter::default()).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].title, "Active");

        let all = repo
            .list(&ListingFilter {
                include_hidden: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_list_orders_featured_then_newest() {
        let repo = setup_test_repo().await;
        let mut old = sample_listing("Old");
        old.created_at = Utc::now() - Duration::days(3);
        repo.create(&old).await.unwrap();
        let mut featured = sample_listing("Featured");
        featured.featured = true;
        featured.created_at = Utc::now() - Duration::days(10);
        repo.create(&featured).await.unwrap();
        repo.create(&sample_listing("New")).await.unwrap();

        let titles: Vec<String> = repo
            .list(&ListingFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.title)
            .collect();
        assert_eq!(titles, vec!["Featured", "New", "Old"]);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let repo = setup_test_repo().await;
        let mut condo = sample_listing("Condo");
        condo.property_type = PropertyType::Condo;
        condo.city = "Boston".to_string();
        condo.price = 900_000;
        condo.bedrooms = Some(1);
        repo.create(&condo).await.unwrap();
        repo.create(&sample_listing("House")).await.unwrap();

        let by_city = repo
            .list(&ListingFilter {
                city: Some("boston".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_city.len(), 1);
        assert_eq!(by_city[0].title, "Condo");

        let by_price = repo
            .list(&ListingFilter {
                max_price: Some(500_000),
                min_bedrooms: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_price.len(), 1);
        assert_eq!(by_price[0].title, "House");

        let by_type = repo
            .list(&ListingFilter {
                property_type: Some(PropertyType::Condo),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_type.len(), 1);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let repo = setup_test_repo().await;
        for i in 0..5 {
            repo.create(&sample_listing(&format!("L{}", i))).await.unwrap();
        }
        let page = repo
            .list(&ListingFilter {
                limit: 2,
                offset: 4,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_listing() {
        let repo = setup_test_repo().await;
        let mut listing = repo.create(&sample_listing("Before")).await.unwrap();
        listing.title = "After".to_string();
        listing.status = ListingStatus::Pending;
        listing.features.clear();
        repo.update(&listing).await.unwrap();

        let fetched = repo.get_by_id(listing.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "After");
        assert_eq!(fetched.status, ListingStatus::Pending);
        assert!(fetched.features.is_empty());

        assert!(repo.delete(listing.id).await.unwrap());
        assert!(!repo.delete(listing.id).await.unwrap());
        assert!(repo.get_by_id(listing.id).await.unwrap().is_none());
    }
}

//! Lead repository
//!
//! Storage for captured leads. Deleting a lead removes its communications
//! and notes in the same transaction.

use crate::db::{DynDatabasePool, PoolRef};
use crate::models::{Lead, LeadFilter, LeadStatus, Pagination};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{PgPool, Row, SqlitePool};
use std::sync::Arc;

use super::{bind_postgres, bind_sqlite, Conditions, SqlValue};

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn create(&self, lead: &Lead) -> Result<Lead>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Lead>>;
    /// Newest first
    async fn list(&self, filter: &LeadFilter, page: Pagination) -> Result<Vec<Lead>>;
    async fn count(&self, filter: &LeadFilter) -> Result<i64>;
    async fn update(&self, lead: &Lead) -> Result<Lead>;
    /// Returns false when the lead did not exist
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn count_by_status(&self) -> Result<Vec<(LeadStatus, i64)>>;
}

pub struct SqlxLeadRepository {
    pool: DynDatabasePool,
}

impl SqlxLeadRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LeadRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LeadRepository for SqlxLeadRepository {
    async fn create(&self, lead: &Lead) -> Result<Lead> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => create_sqlite(p, lead).await,
            PoolRef::Postgres(p) => create_postgres(p, lead).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Lead>> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => get_by_id_sqlite(p, id).await,
            PoolRef::Postgres(p) => get_by_id_postgres(p, id).await,
        }
    }

    async fn list(&self, filter: &LeadFilter, page: Pagination) -> Result<Vec<Lead>> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => list_sqlite(p, filter, page).await,
            PoolRef::Postgres(p) => list_postgres(p, filter, page).await,
        }
    }

    async fn count(&self, filter: &LeadFilter) -> Result<i64> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => count_sqlite(p, filter).await,
            PoolRef::Postgres(p) => count_postgres(p, filter).await,
        }
    }

    async fn update(&self, lead: &Lead) -> Result<Lead> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => update_sqlite(p, lead).await,
            PoolRef::Postgres(p) => update_postgres(p, lead).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => delete_sqlite(p, id).await,
            PoolRef::Postgres(p) => delete_postgres(p, id).await,
        }
    }

    async fn count_by_status(&self) -> Result<Vec<(LeadStatus, i64)>> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => count_by_status_sqlite(p).await,
            PoolRef::Postgres(p) => count_by_status_postgres(p).await,
        }
    }
}

const LEAD_COLUMNS: &str = "id, name, email, phone, message, source, listing_id, intent, budget, \
    timeline, status, created_at, updated_at";

const INSERT_SQL: &str = "INSERT INTO leads (name, email, phone, message, source, listing_id, \
    intent, budget, timeline, status, created_at, updated_at) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

const UPDATE_SQL: &str = "UPDATE leads SET name = $1, email = $2, phone = $3, message = $4, \
    source = $5, listing_id = $6, intent = $7, budget = $8, timeline = $9, status = $10, \
    updated_at = $11 WHERE id = $12";

const STATUS_COUNT_SQL: &str = "SELECT status, COUNT(*) AS count FROM leads GROUP BY status";

macro_rules! bind_lead_fields {
    ($query:expr, $lead:expr) => {
        $query
            .bind(&$lead.name)
            .bind(&$lead.email)
            .bind(&$lead.phone)
            .bind(&$lead.message)
            .bind($lead.source.as_str())
            .bind($lead.listing_id)
            .bind($lead.intent.map(|i| i.as_str()))
            .bind(&$lead.budget)
            .bind(&$lead.timeline)
            .bind($lead.status.as_str())
    };
}

macro_rules! lead_from_row {
    ($row:expr) => {{
        let row = $row;
        let source: String = row.try_get("source")?;
        let status: String = row.try_get("status")?;
        let intent: Option<String> = row.try_get("intent")?;
        Ok(Lead {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            message: row.try_get("message")?,
            source: source.parse()?,
            listing_id: row.try_get("listing_id")?,
            intent: intent.map(|i| i.parse()).transpose()?,
            budget: row.try_get("budget")?,
            timeline: row.try_get("timeline")?,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }};
}

fn row_to_lead_sqlite(row: &SqliteRow) -> Result<Lead> {
    lead_from_row!(row)
}

fn row_to_lead_postgres(row: &PgRow) -> Result<Lead> {
    lead_from_row!(row)
}

fn build_filter(filter: &LeadFilter) -> Conditions {
    let mut conditions = Conditions::new();
    if let Some(status) = filter.status {
        conditions.push_value("status = {}", SqlValue::Text(status.as_str().to_string()));
    }
    if let Some(source) = filter.source {
        conditions.push_value("source = {}", SqlValue::Text(source.as_str().to_string()));
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", q.to_lowercase());
        conditions.push_any(
            &[
                "LOWER(name) LIKE {}",
                "LOWER(COALESCE(email, '')) LIKE {}",
                "COALESCE(phone, '') LIKE {}",
            ],
            SqlValue::Text(pattern),
        );
    }
    conditions
}

fn list_sql(filter: &LeadFilter, page: Pagination) -> (String, Conditions) {
    let mut conditions = build_filter(filter);
    let where_sql = conditions.where_sql();
    let limit = conditions.bind(SqlValue::Int(page.limit));
    let offset = conditions.bind(SqlValue::Int(page.offset));
    let sql = format!(
        "SELECT {} FROM leads{} ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
        LEAD_COLUMNS, where_sql, limit, offset
    );
    (sql, conditions)
}

fn count_sql(filter: &LeadFilter) -> (String, Conditions) {
    let conditions = build_filter(filter);
    let sql = format!("SELECT COUNT(*) AS count FROM leads{}", conditions.where_sql());
    (sql, conditions)
}

// SQLite implementations
async fn create_sqlite(pool: &SqlitePool, lead: &Lead) -> Result<Lead> {
    let result = bind_lead_fields!(sqlx::query(INSERT_SQL), lead)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(pool)
        .await
        .context("Failed to create lead")?;

    Ok(Lead {
        id: result.last_insert_rowid(),
        ..lead.clone()
    })
}

async fn get_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Lead>> {
    let sql = format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get lead")?;
    row.as_ref().map(row_to_lead_sqlite).transpose()
}

async fn list_sqlite(pool: &SqlitePool, filter: &LeadFilter, page: Pagination) -> Result<Vec<Lead>> {
    let (sql, conditions) = list_sql(filter, page);
    let rows = bind_sqlite(sqlx::query(&sql), conditions.values())
        .fetch_all(pool)
        .await
        .context("Failed to list leads")?;
    rows.iter().map(row_to_lead_sqlite).collect()
}

async fn count_sqlite(pool: &SqlitePool, filter: &LeadFilter) -> Result<i64> {
    let (sql, conditions) = count_sql(filter);
    let row = bind_sqlite(sqlx::query(&sql), conditions.values())
        .fetch_one(pool)
        .await
        .context("Failed to count leads")?;
    Ok(row.try_get("count")?)
}

async fn update_sqlite(pool: &SqlitePool, lead: &Lead) -> Result<Lead> {
    bind_lead_fields!(sqlx::query(UPDATE_SQL), lead)
        .bind(lead.updated_at)
        .bind(lead.id)
        .execute(pool)
        .await
        .context("Failed to update lead")?;
    Ok(lead.clone())
}

async fn delete_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM communications WHERE lead_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete lead communications")?;
    sqlx::query("DELETE FROM notes WHERE lead_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete lead notes")?;
    let result = sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete lead")?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

async fn count_by_status_sqlite(pool: &SqlitePool) -> Result<Vec<(LeadStatus, i64)>> {
    let rows = sqlx::query(STATUS_COUNT_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to count leads by status")?;
    rows.iter()
        .map(|row| -> Result<(LeadStatus, i64)> {
            let status: String = row.try_get("status")?;
            Ok((status.parse()?, row.try_get("count")?))
        })
        .collect()
}

// Postgres implementations
async fn create_postgres(pool: &PgPool, lead: &Lead) -> Result<Lead> {
    let sql = format!("{} RETURNING id", INSERT_SQL);
    let row = bind_lead_fields!(sqlx::query(&sql), lead)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .fetch_one(pool)
        .await
        .context("Failed to create lead")?;

    Ok(Lead {
        id: row.try_get("id")?,
        ..lead.clone()
    })
}

async fn get_by_id_postgres(pool: &PgPool, id: i64) -> Result<Option<Lead>> {
    let sql = format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get lead")?;
    row.as_ref().map(row_to_lead_postgres).transpose()
}

async fn list_postgres(pool: &PgPool, filter: &LeadFilter, page: Pagination) -> Result<Vec<Lead>> {
    let (sql, conditions) = list_sql(filter, page);
    let rows = bind_postgres(sqlx::query(&sql), conditions.values())
        .fetch_all(pool)
        .await
        .context("Failed to list leads")?;
    rows.iter().map(row_to_lead_postgres).collect()
}

async fn count_postgres(pool: &PgPool, filter: &LeadFilter) -> Result<i64> {
    let (sql, conditions) = count_sql(filter);
    let row = bind_postgres(sqlx::query(&sql), conditions.values())
        .fetch_one(pool)
        .await
        .context("Failed to count leads")?;
    Ok(row.try_get("count")?)
}

async fn update_postgres(pool: &PgPool, lead: &Lead) -> Result<Lead> {
    bind_lead_fields!(sqlx::query(UPDATE_SQL), lead)
        .bind(lead.updated_at)
        .bind(lead.id)
        .execute(pool)
        .await
        .context("Failed to update lead")?;
    Ok(lead.clone())
}

async fn delete_postgres(pool: &PgPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM communications WHERE lead_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete lead communications")?;
    sqlx::query("DELETE FROM notes WHERE lead_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete lead notes")?;
    let result = sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete lead")?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

async fn count_by_status_postgres(pool: &PgPool) -> Result<Vec<(LeadStatus, i64)>> {
    let rows = sqlx::query(STATUS_COUNT_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to count leads by status")?;
    rows.iter()
        .map(|row| -> Result<(LeadStatus, i64)> {
            let status: String = row.try_get("status")?;
            Ok((status.parse()?, row.try_get("count")?))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{LeadIntent, LeadSource};
    use chrono::{Duration, Utc};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxLeadRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxLeadRepository::new(pool.clone());
        (pool, repo)
    }

    pub(crate) fn sample_lead(name: &str) -> Lead {
        let now = Utc::now();
        Lead {
            id: 0,
            name: name.to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            phone: None,
            message: Some("Interested in a showing".to_string()),
            source: LeadSource::ContactForm,
            listing_id: None,
            intent: Some(LeadIntent::Buy),
            budget: None,
            timeline: None,
            status: LeadStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_lead() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&sample_lead("Dana")).await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap().expect("lead exists");
        assert_eq!(fetched.name, "Dana");
        assert_eq!(fetched.intent, Some(LeadIntent::Buy));
        assert_eq!(fetched.status, LeadStatus::New);
        assert_eq!(fetched.phone, None);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let (_pool, repo) = setup_test_repo().await;
        let mut older = sample_lead("Older");
        older.created_at = Utc::now() - Duration::hours(2);
        older.source = LeadSource::Chat;
        repo.create(&older).await.unwrap();
        let mut contacted = sample_lead("Newer");
        contacted.status = LeadStatus::Contacted;
        contacted.phone = Some("207-555-0100".to_string());
        repo.create(&contacted).await.unwrap();

        let all = repo.list(&LeadFilter::default(), Pagination::default()).await.unwrap();
        assert_eq!(all.iter().map(|l| l.name.as_str()).collect::<Vec<_>>(), vec!["Newer", "Older"]);

        let chat = LeadFilter {
            source: Some(LeadSource::Chat),
            ..Default::default()
        };
        assert_eq!(repo.list(&chat, Pagination::default()).await.unwrap().len(), 1);
        assert_eq!(repo.count(&chat).await.unwrap(), 1);

        let by_phone = LeadFilter {
            q: Some("555-0100".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.list(&by_phone, Pagination::default()).await.unwrap()[0].name, "Newer");

        let by_email = LeadFilter {
            q: Some("OLDER@".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.count(&by_email).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&sample_lead("A")).await.unwrap();
        repo.create(&sample_lead("B")).await.unwrap();
        let mut lost = sample_lead("C");
        lost.status = LeadStatus::Lost;
        repo.create(&lost).await.unwrap();

        let mut counts = repo.count_by_status().await.unwrap();
        counts.sort_by_key(|(status, _)| status.as_str());
        assert_eq!(counts, vec![(LeadStatus::Lost, 1), (LeadStatus::New, 2)]);
    }

    #[tokio::test]
    async fn test_delete_removes_activity() {
        let (pool, repo) = setup_test_repo().await;
        let lead = repo.create(&sample_lead("Gone")).await.unwrap();
        let sqlite = pool.as_sqlite().unwrap();
        sqlx::query("INSERT INTO notes (lead_id, body, author, created_at) VALUES ($1, 'call back', 'admin', $2)")
            .bind(lead.id)
            .bind(Utc::now())
            .execute(sqlite)
            .await
            .unwrap();

        assert!(repo.delete(lead.id).await.unwrap());
        let remaining: i64 = sqlx::query("SELECT COUNT(*) AS count FROM notes")
            .fetch_one(sqlite)
            .await
            .unwrap()
            .get("count");
        assert_eq!(remaining, 0);
        assert!(!repo.delete(lead.id).await.unwrap());
    }
}

//! Communication log repository

use crate::db::{DynDatabasePool, PoolRef};
use crate::models::Communication;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{PgPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait CommunicationRepository: Send + Sync {
    async fn create(&self, communication: &Communication) -> Result<Communication>;
    /// Most recent first
    async fn list_by_lead(&self, lead_id: i64) -> Result<Vec<Communication>>;
}

pub struct SqlxCommunicationRepository {
    pool: DynDatabasePool,
}

impl SqlxCommunicationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommunicationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommunicationRepository for SqlxCommunicationRepository {
    async fn create(&self, communication: &Communication) -> Result<Communication> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => create_sqlite(p, communication).await,
            PoolRef::Postgres(p) => create_postgres(p, communication).await,
        }
    }

    async fn list_by_lead(&self, lead_id: i64) -> Result<Vec<Communication>> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => list_by_lead_sqlite(p, lead_id).await,
            PoolRef::Postgres(p) => list_by_lead_postgres(p, lead_id).await,
        }
    }
}

const INSERT_SQL: &str = "INSERT INTO communications (lead_id, channel, direction, summary, occurred_at, created_at) \
    VALUES ($1, $2, $3, $4, $5, $6)";

const LIST_SQL: &str = "SELECT id, lead_id, channel, direction, summary, occurred_at, created_at \
    FROM communications WHERE lead_id = $1 ORDER BY occurred_at DESC, id DESC";

macro_rules! communication_from_row {
    ($row:expr) => {{
        let row = $row;
        let channel: String = row.try_get("channel")?;
        let direction: String = row.try_get("direction")?;
        Ok(Communication {
            id: row.try_get("id")?,
            lead_id: row.try_get("lead_id")?,
            channel: channel.parse()?,
            direction: direction.parse()?,
            summary: row.try_get("summary")?,
            occurred_at: row.try_get("occurred_at")?,
            created_at: row.try_get("created_at")?,
        })
    }};
}

fn row_to_communication_sqlite(row: &SqliteRow) -> Result<Communication> {
    communication_from_row!(row)
}

fn row_to_communication_postgres(row: &PgRow) -> Result<Communication> {
    communication_from_row!(row)
}

async fn create_sqlite(pool: &SqlitePool, c: &Communication) -> Result<Communication> {
    let result = sqlx::query(INSERT_SQL)
        .bind(c.lead_id)
        .bind(c.channel.as_str())
        .bind(c.direction.as_str())
        .bind(&c.summary)
        .bind(c.occurred_at)
        .bind(c.created_at)
        .execute(pool)
        .await
        .context("Failed to create communication")?;
    Ok(Communication {
        id: result.last_insert_rowid(),
        ..c.clone()
    })
}

async fn list_by_lead_sqlite(pool: &SqlitePool, lead_id: i64) -> Result<Vec<Communication>> {
    let rows = sqlx::query(LIST_SQL)
        .bind(lead_id)
        .fetch_all(pool)
        .await
        .context("Failed to list communications")?;
    rows.iter().map(row_to_communication_sqlite).collect()
}

async fn create_postgres(pool: &PgPool, c: &Communication) -> Result<Communication> {
    let sql = format!("{} RETURNING id", INSERT_SQL);
    let row = sqlx::query(&sql)
        .bind(c.lead_id)
        .bind(c.channel.as_str())
        .bind(c.direction.as_str())
        .bind(&c.summary)
        .bind(c.occurred_at)
        .bind(c.created_at)
        .fetch_one(pool)
        .await
        .context("Failed to create communication")?;
    Ok(Communication {
        id: row.try_get("id")?,
        ..c.clone()
    })
}

async fn list_by_lead_postgres(pool: &PgPool, lead_id: i64) -> Result<Vec<Communication>> {
    let rows = sqlx::query(LIST_SQL)
        .bind(lead_id)
        .fetch_all(pool)
        .await
        .context("Failed to list communications")?;
    rows.iter().map(row_to_communication_postgres).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::lead::tests::sample_lead;
    use crate::db::repositories::{LeadRepository, SqlxLeadRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CommunicationChannel, CommunicationDirection};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_create_and_list_communications() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let lead = SqlxLeadRepository::new(pool.clone())
            .create(&sample_lead("Robin"))
            .await
            .unwrap();
        let repo = SqlxCommunicationRepository::new(pool);

        let now = Utc::now();
        for (hours_ago, summary) in [(3, "Left voicemail"), (1, "Booked showing")] {
            repo.create(&Communication {
                id: 0,
                lead_id: lead.id,
                channel: CommunicationChannel::Phone,
                direction: CommunicationDirection::Outbound,
                summary: summary.to_string(),
                occurred_at: now - Duration::hours(hours_ago),
                created_at: now,
            })
            .await
            .unwrap();
        }

        let log = repo.list_by_lead(lead.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].summary, "Booked showing");
        assert_eq!(log[0].channel, CommunicationChannel::Phone);
        assert!(repo.list_by_lead(lead.id + 1).await.unwrap().is_empty());
    }
}

//! Import draft repository

use crate::db::{DynDatabasePool, PoolRef};
use crate::models::{DraftStatus, ImportDraft};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{PgPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait ImportDraftRepository: Send + Sync {
    async fn create(&self, draft: &ImportDraft) -> Result<ImportDraft>;
    async fn get_by_id(&self, id: i64) -> Result<Option<ImportDraft>>;
    /// Newest first, optionally restricted to one status
    async fn list(&self, status: Option<DraftStatus>) -> Result<Vec<ImportDraft>>;
    /// Write payload, status, listing and review time, but only while the
    /// stored status still equals `expected`. Returns false when it did not.
    async fn update_if_status(&self, draft: &ImportDraft, expected: DraftStatus) -> Result<bool>;
}

pub struct SqlxImportDraftRepository {
    pool: DynDatabasePool,
}

impl SqlxImportDraftRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ImportDraftRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ImportDraftRepository for SqlxImportDraftRepository {
    async fn create(&self, draft: &ImportDraft) -> Result<ImportDraft> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => create_sqlite(p, draft).await,
            PoolRef::Postgres(p) => create_postgres(p, draft).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ImportDraft>> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => {
                let row = sqlx::query(&select_sql(" WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get import draft")?;
                row.as_ref().map(row_to_draft_sqlite).transpose()
            }
            PoolRef::Postgres(p) => {
                let row = sqlx::query(&select_sql(" WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get import draft")?;
                row.as_ref().map(row_to_draft_postgres).transpose()
            }
        }
    }

    async fn list(&self, status: Option<DraftStatus>) -> Result<Vec<ImportDraft>> {
        let filter = if status.is_some() { " WHERE status = $1" } else { "" };
        let sql = format!("{} ORDER BY created_at DESC, id DESC", select_sql(filter));
        let status = status.map(|s| s.as_str());

        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => {
                let mut query = sqlx::query(&sql);
                if let Some(status) = status {
                    query = query.bind(status);
                }
                let rows = query.fetch_all(p).await.context("Failed to list import drafts")?;
                rows.iter().map(row_to_draft_sqlite).collect()
            }
            PoolRef::Postgres(p) => {
                let mut query = sqlx::query(&sql);
                if let Some(status) = status {
                    query = query.bind(status);
                }
                let rows = query.fetch_all(p).await.context("Failed to list import drafts")?;
                rows.iter().map(row_to_draft_postgres).collect()
            }
        }
    }

    async fn update_if_status(&self, draft: &ImportDraft, expected: DraftStatus) -> Result<bool> {
        let payload = serde_json::to_string(&draft.payload)?;
        let affected = match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => sqlx::query(UPDATE_SQL)
                .bind(payload)
                .bind(draft.status.as_str())
                .bind(draft.listing_id)
                .bind(draft.reviewed_at)
                .bind(draft.id)
                .bind(expected.as_str())
                .execute(p)
                .await
                .context("Failed to update import draft")?
                .rows_affected(),
            PoolRef::Postgres(p) => sqlx::query(UPDATE_SQL)
                .bind(payload)
                .bind(draft.status.as_str())
                .bind(draft.listing_id)
                .bind(draft.reviewed_at)
                .bind(draft.id)
                .bind(expected.as_str())
                .execute(p)
                .await
                .context("Failed to update import draft")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

const INSERT_SQL: &str = "INSERT INTO import_drafts (source_url, payload, status, listing_id, created_at, reviewed_at) \
    VALUES ($1, $2, $3, $4, $5, $6)";

const UPDATE_SQL: &str = "UPDATE import_drafts SET payload = $1, status = $2, listing_id = $3, reviewed_at = $4 \
    WHERE id = $5 AND status = $6";

fn select_sql(where_sql: &str) -> String {
    format!(
        "SELECT id, source_url, payload, status, listing_id, created_at, reviewed_at FROM import_drafts{}",
        where_sql
    )
}

macro_rules! draft_from_row {
    ($row:expr) => {{
        let row = $row;
        let payload: String = row.try_get("payload")?;
        let status: String = row.try_get("status")?;
        Ok(ImportDraft {
            id: row.try_get("id")?,
            source_url: row.try_get("source_url")?,
            payload: serde_json::from_str(&payload).context("Invalid import draft payload")?,
            status: status.parse()?,
            listing_id: row.try_get("listing_id")?,
            created_at: row.try_get("created_at")?,
            reviewed_at: row.try_get("reviewed_at")?,
        })
    }};
}

fn row_to_draft_sqlite(row: &SqliteRow) -> Result<ImportDraft> {
    draft_from_row!(row)
}

fn row_to_draft_postgres(row: &PgRow) -> Result<ImportDraft> {
    draft_from_row!(row)
}

async fn create_sqlite(pool: &SqlitePool, draft: &ImportDraft) -> Result<ImportDraft> {
    let result = sqlx::query(INSERT_SQL)
        .bind(&draft.source_url)
        .bind(serde_json::to_string(&draft.payload)?)
        .bind(draft.status.as_str())
        .bind(draft.listing_id)
        .bind(draft.created_at)
        .bind(draft.reviewed_at)
        .execute(pool)
        .await
        .context("Failed to create import draft")?;
    Ok(ImportDraft {
        id: result.last_insert_rowid(),
        ..draft.clone()
    })
}

async fn create_postgres(pool: &PgPool, draft: &ImportDraft) -> Result<ImportDraft> {
    let sql = format!("{} RETURNING id", INSERT_SQL);
    let row = sqlx::query(&sql)
        .bind(&draft.source_url)
        .bind(serde_json::to_string(&draft.payload)?)
        .bind(draft.status.as_str())
        .bind(draft.listing_id)
        .bind(draft.created_at)
        .bind(draft.reviewed_at)
        .fetch_one(pool)
        .await
        .context("Failed to create import draft")?;
    Ok(ImportDraft {
        id: row.try_get("id")?,
        ..draft.clone()
    })
}

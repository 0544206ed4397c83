//! Lead note repository

use crate::db::{DynDatabasePool, PoolRef};
use crate::models::Note;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn create(&self, note: &Note) -> Result<Note>;
    /// Newest first
    async fn list_by_lead(&self, lead_id: i64) -> Result<Vec<Note>>;
}

pub struct SqlxNoteRepository {
    pool: DynDatabasePool,
}

impl SqlxNoteRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NoteRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NoteRepository for SqlxNoteRepository {
    async fn create(&self, note: &Note) -> Result<Note> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => create_sqlite(p, note).await,
            PoolRef::Postgres(p) => create_postgres(p, note).await,
        }
    }

    async fn list_by_lead(&self, lead_id: i64) -> Result<Vec<Note>> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => list_by_lead_sqlite(p, lead_id).await,
            PoolRef::Postgres(p) => list_by_lead_postgres(p, lead_id).await,
        }
    }
}

const INSERT_SQL: &str = "INSERT INTO notes (lead_id, body, author, created_at) VALUES ($1, $2, $3, $4)";

const LIST_SQL: &str = "SELECT id, lead_id, body, author, created_at FROM notes \
    WHERE lead_id = $1 ORDER BY created_at DESC, id DESC";

async fn create_sqlite(pool: &SqlitePool, note: &Note) -> Result<Note> {
    let result = sqlx::query(INSERT_SQL)
        .bind(note.lead_id)
        .bind(&note.body)
        .bind(&note.author)
        .bind(note.created_at)
        .execute(pool)
        .await
        .context("Failed to create note")?;
    Ok(Note {
        id: result.last_insert_rowid(),
        ..note.clone()
    })
}

async fn list_by_lead_sqlite(pool: &SqlitePool, lead_id: i64) -> Result<Vec<Note>> {
    let rows = sqlx::query(LIST_SQL)
        .bind(lead_id)
        .fetch_all(pool)
        .await
        .context("Failed to list notes")?;
    rows.iter()
        .map(|row| -> Result<Note> {
            Ok(Note {
                id: row.try_get("id")?,
                lead_id: row.try_get("lead_id")?,
                body: row.try_get("body")?,
                author: row.try_get("author")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

async fn create_postgres(pool: &PgPool, note: &Note) -> Result<Note> {
    let sql = format!("{} RETURNING id", INSERT_SQL);
    let row = sqlx::query(&sql)
        .bind(note.lead_id)
        .bind(&note.body)
        .bind(&note.author)
        .bind(note.created_at)
        .fetch_one(pool)
        .await
        .context("Failed to create note")?;
    Ok(Note {
        id: row.try_get("id")?,
        ..note.clone()
    })
}

async fn list_by_lead_postgres(pool: &PgPool, lead_id: i64) -> Result<Vec<Note>> {
    let rows = sqlx::query(LIST_SQL)
        .bind(lead_id)
        .fetch_all(pool)
        .await
        .context("Failed to list notes")?;
    rows.iter()
        .map(|row| -> Result<Note> {
            Ok(Note {
                id: row.try_get("id")?,
                lead_id: row.try_get("lead_id")?,
                body: row.try_get("body")?,
                author: row.try_get("author")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

//! Admin session repository
//!
//! Sessions are keyed by the SHA-256 digest of the bearer token, so the
//! table never holds usable tokens.

use crate::db::{DynDatabasePool, PoolRef};
use crate::models::AdminSession;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &AdminSession) -> Result<AdminSession>;

    /// Get session by ID (token digest)
    async fn get_by_id(&self, id: &str) -> Result<Option<AdminSession>>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &AdminSession) -> Result<AdminSession> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => create_session_sqlite(p, session).await,
            PoolRef::Postgres(p) => create_session_postgres(p, session).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AdminSession>> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => get_session_by_id_sqlite(p, id).await,
            PoolRef::Postgres(p) => get_session_by_id_postgres(p, id).await,
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => {
                sqlx::query(DELETE_SQL)
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to delete session")?;
            }
            PoolRef::Postgres(p) => {
                sqlx::query(DELETE_SQL)
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to delete session")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let removed = match self.pool.pool_ref() {
            PoolRef::Sqlite(p) => sqlx::query(DELETE_EXPIRED_SQL)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
            PoolRef::Postgres(p) => sqlx::query(DELETE_EXPIRED_SQL)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
        };
        Ok(removed)
    }
}

const INSERT_SQL: &str =
    "INSERT INTO admin_sessions (id, username, expires_at, created_at) VALUES ($1, $2, $3, $4)";
const SELECT_SQL: &str =
    "SELECT id, username, expires_at, created_at FROM admin_sessions WHERE id = $1";
const DELETE_SQL: &str = "DELETE FROM admin_sessions WHERE id = $1";
const DELETE_EXPIRED_SQL: &str = "DELETE FROM admin_sessions WHERE expires_at < $1";

// SQLite implementations
async fn create_session_sqlite(pool: &SqlitePool, session: &AdminSession) -> Result<AdminSession> {
    sqlx::query(INSERT_SQL)
        .bind(&session.id)
        .bind(&session.username)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;
    Ok(session.clone())
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<AdminSession>> {
    let row = sqlx::query(SELECT_SQL)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session")?;

    match row {
        Some(row) => Ok(Some(AdminSession {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })),
        None => Ok(None),
    }
}

// Postgres implementations
async fn create_session_postgres(pool: &PgPool, session: &AdminSession) -> Result<AdminSession> {
    sqlx::query(INSERT_SQL)
        .bind(&session.id)
        .bind(&session.username)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;
    Ok(session.clone())
}

async fn get_session_by_id_postgres(pool: &PgPool, id: &str) -> Result<Option<AdminSession>> {
    let row = sqlx::query(SELECT_SQL)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session")?;

    match row {
        Some(row) => Ok(Some(AdminSession {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;
    use uuid::Uuid;

    async fn setup_test_repo() -> SqlxSessionRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxSessionRepository::new(pool)
    }

    fn create_test_session(expires_in_hours: i64) -> AdminSession {
        let now = Utc::now();
        AdminSession {
            id: Uuid::new_v4().simple().to_string(),
            username: "admin".to_string(),
            expires_at: now + Duration::hours(expires_in_hours),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let repo = setup_test_repo().await;
        let session = create_test_session(12);
        repo.create(&session).await.expect("Failed to create session");

        let fetched = repo.get_by_id(&session.id).await.unwrap().expect("session exists");
        assert_eq!(fetched.username, "admin");
        assert!(!fetched.is_expired());
    }

    #[tokio::test]
    async fn test_delete_session() {
        let repo = setup_test_repo().await;
        let session = create_test_session(12);
        repo.create(&session).await.unwrap();
        repo.delete(&session.id).await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_sessions() {
        let repo = setup_test_repo().await;
        let live = create_test_session(12);
        let expired = create_test_session(-1);
        repo.create(&live).await.unwrap();
        repo.create(&expired).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
        assert!(repo.get_by_id(&expired.id).await.unwrap().is_none());
    }
}

//! Admin authentication
//!
//! There is a single admin account whose name and Argon2 hash come from
//! configuration. A successful login issues a random bearer token; only its
//! SHA-256 digest is stored, as the `admin_sessions` row id.

use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::config::AdminConfig;
use crate::db::repositories::SessionRepository;
use crate::models::AdminSession;
use crate::services::password::{generate_token, secrets_match, token_digest, verify_password};

/// Error types for admin authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Wrong username or password, or no password configured
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A fresh login: the bearer token (returned once) and its session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: AdminSession,
}

pub struct AuthService {
    sessions: Arc<dyn SessionRepository>,
    username: String,
    password_hash: Option<String>,
    session_ttl: Duration,
}

impl AuthService {
    /// Create the service from the admin configuration.
    ///
    /// `password_hash` must already be resolved (a plaintext password in the
    /// config is hashed at startup).
    pub fn new(sessions: Arc<dyn SessionRepository>, config: &AdminConfig) -> Self {
        Self {
            sessions,
            username: config.username.clone(),
            password_hash: config.password_hash.clone().filter(|h| !h.trim().is_empty()),
            session_ttl: Duration::hours(config.session_hours.max(1)),
        }
    }

    /// Whether an admin password is configured at all
    pub fn is_configured(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Log in as the admin.
    ///
    /// # Arguments
    ///
    /// * `username` - Must equal the configured admin name
    /// * `password` - Checked against the configured Argon2 hash
    ///
    /// # Errors
    ///
    /// - `AuthenticationError` for wrong credentials or when no password is configured
    /// - `InternalError` for hash or database errors
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let Some(hash) = self.password_hash.as_deref() else {
            tracing::warn!("Admin login attempted but no admin password is configured");
            return Err(AuthError::AuthenticationError("Invalid username or password".into()));
        };

        // Verify the password even for a wrong username so both paths cost the same
        let username_ok = secrets_match(username.trim(), &self.username);
        let password_ok = verify_password(password, hash).context("Failed to verify password")?;
        if !(username_ok && password_ok) {
            return Err(AuthError::AuthenticationError("Invalid username or password".into()));
        }

        let token = generate_token();
        let now = Utc::now();
        let session = self
            .sessions
            .create(&AdminSession {
                id: token_digest(&token),
                username: self.username.clone(),
                expires_at: now + self.session_ttl,
                created_at: now,
            })
            .await
            .context("Failed to create session")?;

        tracing::info!(username = %session.username, "Admin logged in");
        Ok(IssuedSession { token, session })
    }

    /// Resolve a bearer token to its live session.
    ///
    /// Returns `Ok(None)` for unknown or expired tokens; expired sessions are
    /// deleted on the way.
    pub async fn validate(&self, token: &str) -> Result<Option<AdminSession>, AuthError> {
        let id = token_digest(token);
        let Some(session) = self
            .sessions
            .get_by_id(&id)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.sessions.delete(&id).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        Ok(Some(session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions
            .delete(&token_digest(token))
            .await
            .context("Failed to delete session")?;
        tracing::info!("Admin logged out");
        Ok(())
    }

    /// Remove expired sessions, returning how many were deleted
    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        let removed = self
            .sessions
            .delete_expired()
            .await
            .context("Failed to clean up sessions")?;
        if removed > 0 {
            tracing::debug!(removed, "Expired admin sessions removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxSessionRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::services::password::hash_password;

    async fn setup(session_hours: i64) -> (AuthService, Arc<dyn SessionRepository>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let sessions = SqlxSessionRepository::boxed(pool);
        let config = AdminConfig {
            username: "broker".to_string(),
            password_hash: Some(hash_password("correct horse").unwrap()),
            session_hours,
            ..Default::default()
        };
        (AuthService::new(sessions.clone(), &config), sessions)
    }

    #[tokio::test]
    async fn test_login_validate_logout() {
        let (auth, _) = setup(12).await;

        let issued = auth.login("broker", "correct horse").await.unwrap();
        assert_eq!(issued.token.len(), 64);
        assert_ne!(issued.session.id, issued.token);
        assert_eq!(issued.session.username, "broker");

        let session = auth.validate(&issued.token).await.unwrap().unwrap();
        assert_eq!(session.id, issued.session.id);

        auth.logout(&issued.token).await.unwrap();
        assert!(auth.validate(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_credentials() {
        let (auth, _) = setup(12).await;
        assert!(matches!(
            auth.login("broker", "wrong").await,
            Err(AuthError::AuthenticationError(_))
        ));
        assert!(matches!(
            auth.login("someone", "correct horse").await,
            Err(AuthError::AuthenticationError(_))
        ));
        assert!(auth.validate("not-a-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_password_rejects_everything() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let auth = AuthService::new(SqlxSessionRepository::boxed(pool), &AdminConfig::default());
        assert!(!auth.is_configured());
        assert!(matches!(
            auth.login("admin", "").await,
            Err(AuthError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_sessions_are_rejected_and_cleaned() {
        let (auth, sessions) = setup(1).await;
        let now = Utc::now();
        sessions
            .create(&AdminSession {
                id: token_digest("stale"),
                username: "broker".to_string(),
                expires_at: now - Duration::minutes(5),
                created_at: now - Duration::hours(2),
            })
            .await
            .unwrap();
        sessions
            .create(&AdminSession {
                id: token_digest("older"),
                username: "broker".to_string(),
                expires_at: now - Duration::hours(1),
                created_at: now - Duration::hours(3),
            })
            .await
            .unwrap();

        assert!(auth.validate("stale").await.unwrap().is_none());
        assert!(sessions.get_by_id(&token_digest("stale")).await.unwrap().is_none());

        let live = auth.login("broker", "correct horse").await.unwrap();
        assert_eq!(auth.cleanup_expired().await.unwrap(), 1);
        assert!(auth.validate(&live.token).await.unwrap().is_some());
    }
}

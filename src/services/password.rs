//! Admin credential helpers
//!
//! - Argon2id password hashing for the configured admin password
//! - Random bearer tokens for admin sessions and their SHA-256 digests
//! - Constant-time comparison of shared secrets (the import token)

use anyhow::{Context, Result};
use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::AdminConfig;

type HmacSha256 = Hmac<Sha256>;

/// Hash a password using Argon2id with a random salt.
///
/// Returns the PHC string (`$argon2id$...`) suitable for `admin.password_hash`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(password_hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// A malformed hash is an error; a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("{}", e)).context("Password verification error"),
    }
}

/// Check that a configured hash parses as PHC
pub fn is_valid_hash(hash: &str) -> bool {
    PasswordHash::new(hash).is_ok()
}

/// 32 random bytes, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hex digest of a token, used as the stored session id
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Compare two secrets without leaking where they differ.
///
/// Both sides are MACed under the expected secret and the tags are compared
/// with `verify_slice`, which is constant time.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let Ok(mut expected_mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    expected_mac.update(expected.as_bytes());
    let expected_tag = expected_mac.finalize().into_bytes();

    let Ok(mut provided_mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    provided_mac.update(provided.as_bytes());
    provided_mac.verify_slice(&expected_tag).is_ok()
}

/// Settle the admin credential at startup.
///
/// A configured hash must parse. Without one, a plaintext `admin.password`
/// is hashed in memory and dropped. With neither, admin login stays disabled.
pub fn resolve_admin_password(config: &mut AdminConfig) -> Result<()> {
    let plaintext = config.password.take().filter(|p| !p.is_empty());

    if let Some(hash) = config.password_hash.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        if !is_valid_hash(hash) {
            anyhow::bail!("admin.password_hash is not a valid Argon2 PHC string");
        }
        if plaintext.is_some() {
            tracing::warn!("Both admin.password and admin.password_hash are set; using the hash");
        }
        config.password_hash = Some(hash.to_string());
        return Ok(());
    }

    match plaintext {
        Some(password) => {
            tracing::warn!(
                "admin.password is set in plaintext; store the output of `hash-password` in admin.password_hash instead"
            );
            config.password_hash = Some(hash_password(&password)?);
        }
        None => {
            config.password_hash = None;
            tracing::warn!("No admin password configured; admin login is disabled");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("open-house-2024").expect("Failed to hash password");
        assert!(hash.starts_with("$argon2id$"));
        assert!(is_valid_hash(&hash));
        assert!(verify_password("open-house-2024", &hash).unwrap());
        assert!(!verify_password("open-house-2025", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_password("x", "not-a-hash").is_err());
        assert!(!is_valid_hash("not-a-hash"));
    }

    #[test]
    fn test_tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_digest_is_stable() {
        assert_eq!(token_digest("abc"), token_digest("abc"));
        assert_ne!(token_digest("abc"), token_digest("abd"));
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret ", "s3cret"));
        assert!(!secrets_match("", "s3cret"));
    }

    #[test]
    fn test_resolve_plaintext_password() {
        let mut config = AdminConfig {
            password: Some("listing-day".to_string()),
            ..Default::default()
        };
        resolve_admin_password(&mut config).unwrap();
        assert!(config.password.is_none());
        let hash = config.password_hash.unwrap();
        assert!(verify_password("listing-day", &hash).unwrap());
    }

    #[test]
    fn test_resolve_prefers_valid_hash() {
        let hash = hash_password("from-hash").unwrap();
        let mut config = AdminConfig {
            password_hash: Some(format!(" {} ", hash)),
            password: Some("ignored".to_string()),
            ..Default::default()
        };
        resolve_admin_password(&mut config).unwrap();
        assert_eq!(config.password_hash.as_deref(), Some(hash.as_str()));
        assert!(config.password.is_none());
    }

    #[test]
    fn test_resolve_rejects_bad_hash_and_allows_none() {
        let mut config = AdminConfig {
            password_hash: Some("plaintext-by-mistake".to_string()),
            ..Default::default()
        };
        assert!(resolve_admin_password(&mut config).is_err());

        let mut config = AdminConfig::default();
        resolve_admin_password(&mut config).unwrap();
        assert!(config.password_hash.is_none());
    }
}

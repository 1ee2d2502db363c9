//! Credential verification.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::instrument;

use super::error::AuthError;
use crate::user::{User, UserStore};

/// A well-formed bcrypt hash that matches no password. Compared against on
/// every miss path so "unknown email" and "wrong password" take the same
/// time and shape.
const PLACEHOLDER_HASH: &str = "$2b$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy";

/// Verifies email+password pairs against stored hashed credentials.
/// Read-only: never mutates the store.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn UserStore>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Verify a credentials pair.
    ///
    /// Rejects with the same error for a missing user, a provider-only
    /// account without a password, a deactivated account, and a wrong
    /// password. The returned user has its password hash cleared.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn verify(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if password.is_empty() {
            return Self::reject_uniform(password);
        }

        let user = self
            .store
            .find_by_email(email)
            .await
            .map_err(|e| AuthError::Infrastructure(format!("{e:#}")))?;

        let Some(user) = user else {
            return Self::reject_uniform(password);
        };

        let Some(hash) = user.password_hash.clone() else {
            return Self::reject_uniform(password);
        };

        let matches = verify_password(password, &hash)
            .map_err(|e| AuthError::Infrastructure(format!("{e:#}")))?;

        if !matches || !user.is_active {
            return Err(AuthError::RejectedCredentials);
        }

        let mut user = user;
        user.password_hash = None;
        Ok(user)
    }

    fn reject_uniform(password: &str) -> Result<User, AuthError> {
        let _ = bcrypt::verify(password, PLACEHOLDER_HASH);
        Err(AuthError::RejectedCredentials)
    }
}

/// Hash a password using bcrypt.
pub fn hash_password(password: &str) -> Result<String> {
    // Lower cost factor keeps debug builds and tests fast
    let cost = if cfg!(debug_assertions) { 4 } else { 10 };
    bcrypt::hash(password, cost).context("Failed to hash password")
}

/// Verify a password against a bcrypt hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password")
}

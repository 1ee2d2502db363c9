//! Session token issuance and refresh.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use tracing::warn;

use super::claims::Claims;
use super::error::AuthError;
use crate::user::{Role, User, UserStore};

/// A minted session token: the signed wire form plus its decoded claims.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub claims: Claims,
    pub encoded: String,
}

/// The shape handed to the route gate and UI layers. Never carries store
/// internals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub id: String,
    pub role: Role,
}

/// Mints and refreshes signed session tokens.
pub struct TokenIssuer {
    store: Arc<dyn UserStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn UserStore>, signing_secret: &str, ttl_secs: i64) -> Self {
        Self {
            store,
            encoding_key: EncodingKey::from_secret(signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(signing_secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Mint a token for a user with a resolved role.
    pub fn mint(&self, user: &User, role: Role) -> Result<SessionToken, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.clone(),
            role,
            exp: now + self.ttl_secs,
            iat: now,
            email: Some(user.email.clone()),
            name: Some(user.display_name.clone()),
        };

        self.encode(claims)
    }

    /// Decode and verify a token from its wire form.
    pub fn decode(&self, raw: &str) -> Result<SessionToken, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();

        let token_data = decode::<Claims>(raw, &self.decoding_key, &validation).map_err(|e| {
            warn!("session token validation failed: {:?}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(SessionToken {
            claims: token_data.claims,
            encoded: raw.to_string(),
        })
    }

    /// Re-read the subject's role and return a token carrying it, so role
    /// changes made out-of-band propagate within one request.
    ///
    /// A missing subject or a store failure leaves the token unchanged:
    /// availability is favored over strict freshness, and callers must
    /// tolerate a slightly stale role during store outages.
    pub async fn refresh(&self, token: &SessionToken) -> SessionToken {
        let current_role = match self.store.find_by_id(&token.claims.sub).await {
            Ok(Some(user)) => user.role.unwrap_or(token.claims.role),
            Ok(None) => token.claims.role,
            Err(e) => {
                warn!(subject = %token.claims.sub, error = %format!("{e:#}"), "role refresh skipped, keeping prior token");
                return token.clone();
            }
        };

        if current_role == token.claims.role {
            return token.clone();
        }

        let claims = Claims {
            role: current_role,
            ..token.claims.clone()
        };
        match self.encode(claims) {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(subject = %token.claims.sub, error = %e, "re-encoding refreshed token failed, keeping prior token");
                token.clone()
            }
        }
    }

    /// The externally exposed shape of a token.
    pub fn to_public_view(&self, token: &SessionToken) -> SessionView {
        SessionView {
            id: token.claims.sub.clone(),
            role: token.claims.role,
        }
    }

    fn encode(&self, claims: Claims) -> Result<SessionToken, AuthError> {
        let encoded = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Infrastructure(e.to_string()))?;

        Ok(SessionToken { claims, encoded })
    }
}

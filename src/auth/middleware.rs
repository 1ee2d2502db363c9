//! Authentication middleware.

use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::claims::Claims;
use super::error::AuthError;
use super::gate::{Access, DenyReason, RouteGate};
use super::tokens::TokenIssuer;
use crate::user::Role;

/// Name of the session cookie set on sign-in.
pub const SESSION_COOKIE: &str = "auth_token";

const SIGN_IN_PATH: &str = "/sign-in";
const ACCESS_DENIED_PATH: &str = "/access-denied";

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::MissingToken)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingToken);
    }

    let token = parts.next().ok_or(AuthError::MissingToken)?;
    if token.is_empty() || parts.next().is_some() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim())
        } else {
            None
        }
    })
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    issuer: Arc<TokenIssuer>,
    gate: Arc<RouteGate>,
}

impl AuthState {
    pub fn new(issuer: Arc<TokenIssuer>, gate: RouteGate) -> Self {
        Self {
            issuer,
            gate: Arc::new(gate),
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn gate(&self) -> &RouteGate {
        &self.gate
    }
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// Refreshed session claims.
    pub claims: Claims,
}

impl CurrentUser {
    /// Get the user ID.
    pub fn id(&self) -> &str {
        &self.claims.sub
    }

    /// Get the user's role.
    pub fn role(&self) -> Role {
        self.claims.role
    }

    /// Check if user is admin.
    pub fn is_admin(&self) -> bool {
        self.claims.is_admin()
    }

    /// Get display name.
    pub fn display_name(&self) -> &str {
        self.claims.display_name()
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

/// Session middleware.
///
/// Runs on every request: extracts the session token (Authorization header
/// first, then the session cookie), verifies it, re-reads the subject's
/// role from the store, and lets the route gate decide access. Allowed
/// requests get `CurrentUser` injected; denied requests are redirected to
/// sign-in or the access-denied page depending on the reason.
pub async fn session_middleware(
    State(auth): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let raw_token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| bearer_token_from_header(h).ok())
        .or_else(|| {
            req.headers()
                .get(axum::http::header::COOKIE)
                .and_then(|h| h.to_str().ok())
                .and_then(|cookies| token_from_cookie_header(cookies, SESSION_COOKIE))
        })
        .map(str::to_string);

    let session = match raw_token {
        Some(raw) => match auth.issuer.decode(&raw) {
            // Role changes propagate within one request at most.
            Ok(token) => Some(auth.issuer.refresh(&token).await),
            Err(e) => {
                debug!("request carried an unusable session token: {}", e);
                None
            }
        },
        None => None,
    };

    let view = session.as_ref().map(|t| auth.issuer.to_public_view(t));
    match auth.gate.authorize(req.uri().path(), view.as_ref()) {
        Access::Allow => {
            if let Some(token) = session {
                req.extensions_mut().insert(CurrentUser {
                    claims: token.claims,
                });
            }
            next.run(req).await
        }
        Access::Deny(DenyReason::Unauthenticated) => Redirect::to(SIGN_IN_PATH).into_response(),
        Access::Deny(DenyReason::Forbidden) => Redirect::to(ACCESS_DENIED_PATH).into_response(),
    }
}

/// Require admin role.
///
/// Use as an extractor in handlers that require admin access.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingToken)?;

        if !user.is_admin() {
            return Err(AuthError::Forbidden("admin role required".to_string()));
        }

        Ok(RequireAdmin(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_from_header_valid() {
        assert_eq!(
            bearer_token_from_header("Bearer abc.def.ghi").unwrap(),
            "abc.def.ghi"
        );
        assert_eq!(
            bearer_token_from_header("bearer   token123").unwrap(),
            "token123"
        );
    }

    #[test]
    fn test_bearer_token_from_header_invalid() {
        let cases = [
            "",
            "Bearer",
            "Bearer ",
            "Token something",
            "Bearer token extra",
            "bear token",
        ];

        for case in cases {
            assert!(
                bearer_token_from_header(case).is_err(),
                "{case} should fail"
            );
        }
    }

    #[test]
    fn test_token_from_cookie_header() {
        let cookies = "theme=dark; auth_token=abc.def; locale=en";
        assert_eq!(
            token_from_cookie_header(cookies, SESSION_COOKIE),
            Some("abc.def")
        );
        assert_eq!(token_from_cookie_header("theme=dark", SESSION_COOKIE), None);
        assert_eq!(
            token_from_cookie_header("auth_token = spaced ", SESSION_COOKIE),
            Some("spaced")
        );
    }

    #[test]
    fn test_current_user_accessors() {
        let claims = Claims {
            sub: "user1".to_string(),
            role: Role::Admin,
            exp: 0,
            iat: 0,
            email: Some("user@example.com".to_string()),
            name: Some("Test User".to_string()),
        };

        let user = CurrentUser { claims };
        assert_eq!(user.id(), "user1");
        assert!(user.is_admin());
        assert_eq!(user.display_name(), "Test User");
    }
}

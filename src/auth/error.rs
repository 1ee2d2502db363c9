//! Authentication errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Authentication errors.
///
/// Rejections stay generic on purpose: the response must not reveal whether
/// an account exists, has no password, or had a wrong password.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No session token on a request that needs one.
    #[error("missing session token")]
    MissingToken,

    /// Malformed or unverifiable token.
    #[error("invalid session token")]
    InvalidToken(String),

    /// Token expired.
    #[error("session expired")]
    TokenExpired,

    /// Sign-in rejected. Covers every rejection sub-case.
    #[error("invalid credentials")]
    RejectedCredentials,

    /// Valid session, insufficient role.
    #[error("insufficient role: {0}")]
    Forbidden(String),

    /// Store or cryptographic failure, distinct from rejection so callers
    /// can meaningfully retry.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AuthError::MissingToken => {
                (StatusCode::UNAUTHORIZED, "missing_token", self.to_string())
            }
            AuthError::InvalidToken(_) => {
                (StatusCode::UNAUTHORIZED, "invalid_token", "invalid session token".to_string())
            }
            AuthError::TokenExpired => {
                (StatusCode::UNAUTHORIZED, "session_expired", self.to_string())
            }
            AuthError::RejectedCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", self.to_string())
            }
            AuthError::Forbidden(_) => {
                (StatusCode::FORBIDDEN, "forbidden", self.to_string())
            }
            AuthError::Infrastructure(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "temporarily unavailable, try again later".to_string(),
            ),
        };

        if let AuthError::Infrastructure(detail) = &self {
            tracing::error!(detail = %detail, "auth infrastructure failure");
        }

        let body = Json(AuthErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_message_is_generic() {
        let err = AuthError::RejectedCredentials;
        assert_eq!(err.to_string(), "invalid credentials");
    }

    #[test]
    fn test_invalid_token_detail_not_displayed() {
        // The decode detail is kept for logs, never for the response body.
        let err = AuthError::InvalidToken("signature mismatch".to_string());
        assert_eq!(err.to_string(), "invalid session token");
    }
}

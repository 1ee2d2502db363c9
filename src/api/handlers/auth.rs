//! Authentication handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::auth::{AuthError, CurrentUser, SESSION_COOKIE, SignInAttempt};
use crate::user::UserInfo;

const AUTH_ERROR_PATH: &str = "/auth/error";

/// Credentials sign-in request.
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Session response.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserInfo,
}

/// Identity assertion delivered by a trusted provider callback.
#[derive(Debug, Deserialize)]
pub struct ProviderAssertion {
    pub subject: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

fn session_cookie(state: &AppState, token: &str) -> String {
    // Secure flag is configurable so plain-http local setups keep working.
    let secure_flag = if state.auth_config.cookie_secure {
        " Secure;"
    } else {
        ""
    };
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax;{} Max-Age={}",
        SESSION_COOKIE, token, secure_flag, state.auth_config.token_ttl_secs
    )
}

/// Credentials sign-in endpoint.
///
/// Rejections surface as a single generic 401 regardless of the sub-case.
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let outcome = state
        .sign_in
        .authenticate(SignInAttempt::Credentials {
            email: request.email,
            password: request.password,
        })
        .await?;

    let cookie = session_cookie(&state, &outcome.token.encoded);
    info!(user_id = %outcome.user.id, "user signed in");

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(SessionResponse {
            token: outcome.token.encoded,
            user: outcome.user,
        }),
    ))
}

/// Identity-provider callback endpoint.
///
/// The assertion is trusted; the provider handshake happened upstream.
/// Rejections redirect to the error page rather than answering 401, since
/// the caller is a browser finishing a provider round-trip.
#[instrument(skip(state, assertion), fields(provider = %provider))]
pub async fn provider_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(assertion): Json<ProviderAssertion>,
) -> Response {
    if state.auth_config.provider(&provider).is_none() {
        warn!(provider = %provider, "callback for unconfigured provider");
        return Redirect::to(AUTH_ERROR_PATH).into_response();
    }

    let attempt = SignInAttempt::IdentityProvider {
        provider,
        subject: assertion.subject,
        email: assertion.email,
        name: assertion.name,
    };

    match state.sign_in.authenticate(attempt).await {
        Ok(outcome) => {
            let cookie = session_cookie(&state, &outcome.token.encoded);
            info!(user_id = %outcome.user.id, "provider sign-in finalized");
            (
                AppendHeaders([(SET_COOKIE, cookie)]),
                Json(SessionResponse {
                    token: outcome.token.encoded,
                    user: outcome.user,
                }),
            )
                .into_response()
        }
        Err(AuthError::RejectedCredentials) => Redirect::to(AUTH_ERROR_PATH).into_response(),
        Err(other) => other.into_response(),
    }
}

/// Sign-out endpoint (clears the session cookie).
pub async fn sign_out() -> impl IntoResponse {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    );

    (AppendHeaders([(SET_COOKIE, cookie)]), StatusCode::NO_CONTENT)
}

/// Get current user profile.
#[instrument(skip(state, user))]
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<UserInfo>> {
    if let Some(stored) = state.store.find_by_id(user.id()).await? {
        return Ok(Json(stored.into()));
    }

    // Subject no longer in the store; answer from the refreshed claims.
    Ok(Json(UserInfo {
        id: user.id().to_string(),
        email: user.claims.email.clone().unwrap_or_default(),
        display_name: user.display_name().to_string(),
        role: user.role(),
        email_verified: false,
        is_active: true,
        created_at: String::new(),
        last_sign_in_at: None,
    }))
}

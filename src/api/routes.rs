//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::session_middleware;

use super::handlers::{admin, auth, misc};
use super::state::AppState;

/// Create the application router.
///
/// Every route passes through the session middleware: it validates and
/// refreshes the token when one is present, and enforces the route gate
/// (public paths fall through, employee paths need a session, admin paths
/// need the admin role).
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let auth_state = state.auth.clone();

    Router::new()
        // Public entry points
        .route("/health", get(misc::health))
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/callback/{provider}", post(auth::provider_callback))
        .route("/auth/sign-out", post(auth::sign_out))
        .route("/auth/me", get(auth::me))
        // Employee-gated surface
        .route("/dashboard", get(misc::dashboard))
        // Admin user administration
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{user_id}", get(admin::get_user))
        .route("/api/admin/users/{user_id}/role", put(admin::update_role))
        .layer(middleware::from_fn_with_state(
            auth_state,
            session_middleware,
        ))
        .with_state(state)
        .layer(cors)
        .layer(trace_layer)
}

/// Build the CORS layer from configured origins.
///
/// With no configured origins, all cross-origin requests are denied.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
        header::COOKIE,
    ];

    let origins: Vec<HeaderValue> = state
        .auth_config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, denying all cross-origin requests");
        CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")))
    } else {
        tracing::info!("CORS: Allowing {} origin(s)", origins.len());
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
    }
}

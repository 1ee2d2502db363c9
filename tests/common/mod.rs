//! Test utilities and common setup.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use staffgate::api::{self, AppState};
use staffgate::auth::{
    AuthConfig, AuthState, CredentialVerifier, ProviderConfig, RouteGate, SignInFlow, TokenIssuer,
    hash_password,
};
use staffgate::db::Database;
use staffgate::user::{NewUser, Role, SqliteUserStore, UserStore};

pub const TEST_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password-123";
pub const EMPLOYEE_EMAIL: &str = "employee@example.com";
pub const EMPLOYEE_PASSWORD: &str = "employee-password-123";
pub const ROLELESS_EMAIL: &str = "roleless@example.com";
pub const ROLELESS_PASSWORD: &str = "roleless-password-123";

/// A fully wired application over an in-memory database, with a direct
/// store handle for assertions.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<SqliteUserStore>,
}

fn test_auth_config() -> AuthConfig {
    AuthConfig {
        signing_secret: Some(TEST_SECRET.to_string()),
        cookie_secure: false,
        providers: vec![ProviderConfig {
            name: "globalid".to_string(),
            client_id: "test-client".to_string(),
            client_secret: "test-client-secret".to_string(),
        }],
        ..AuthConfig::default()
    }
}

/// Create a test application with seeded users.
pub async fn test_app() -> TestApp {
    let db = Database::in_memory().await.unwrap();
    let store_impl = Arc::new(SqliteUserStore::new(db.pool().clone()));

    store_impl
        .create(NewUser {
            email: ADMIN_EMAIL.to_string(),
            password_hash: Some(hash_password(ADMIN_PASSWORD).unwrap()),
            display_name: "Admin".to_string(),
            role: Some(Role::Admin),
        })
        .await
        .unwrap();

    store_impl
        .create(NewUser {
            email: EMPLOYEE_EMAIL.to_string(),
            password_hash: Some(hash_password(EMPLOYEE_PASSWORD).unwrap()),
            display_name: "Employee".to_string(),
            role: Some(Role::Employee),
        })
        .await
        .unwrap();

    store_impl
        .create(NewUser {
            email: ROLELESS_EMAIL.to_string(),
            password_hash: Some(hash_password(ROLELESS_PASSWORD).unwrap()),
            display_name: "Roleless".to_string(),
            role: None,
        })
        .await
        .unwrap();

    let store: Arc<dyn UserStore> = store_impl.clone();
    let auth_config = test_auth_config();

    let issuer = Arc::new(TokenIssuer::new(
        store.clone(),
        TEST_SECRET,
        auth_config.token_ttl_secs,
    ));
    let verifier = CredentialVerifier::new(store.clone());
    let sign_in = SignInFlow::new(store.clone(), verifier, issuer.clone());
    let auth_state = AuthState::new(issuer.clone(), RouteGate::default());

    let state = AppState::new(store, sign_in, issuer, auth_state, auth_config);

    TestApp {
        router: api::create_router(state),
        store: store_impl,
    }
}

/// POST a JSON body and return the response.
pub async fn post_json(router: &Router, uri: &str, body: Value) -> axum::http::Response<Body> {
    router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// GET with an optional bearer token.
pub async fn get_with_token(
    router: &Router,
    uri: &str,
    token: Option<&str>,
) -> axum::http::Response<Body> {
    let mut builder = Request::builder().uri(uri).method(Method::GET);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::http::Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Sign in with credentials and return the session token string.
pub async fn sign_in_token(router: &Router, email: &str, password: &str) -> String {
    let response = post_json(
        router,
        "/auth/sign-in",
        json!({ "email": email, "password": password }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    json["token"].as_str().unwrap().to_string()
}

//! Miscellaneous handlers.

use axum::Json;
use serde_json::{Value, json};

use crate::auth::CurrentUser;

/// Health check endpoint.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Session probe behind the employee gate; the shell page calls this to
/// decide what to render.
pub async fn dashboard(user: CurrentUser) -> Json<Value> {
    Json(json!({
        "user_id": user.id(),
        "display_name": user.display_name(),
        "role": user.role(),
    }))
}

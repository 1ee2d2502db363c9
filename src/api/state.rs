//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::{AuthConfig, AuthState, SignInFlow, TokenIssuer};
use crate::user::UserStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// User store adapter, shared by reference with the auth components.
    pub store: Arc<dyn UserStore>,
    /// Sign-in flow driver.
    pub sign_in: Arc<SignInFlow>,
    /// Session token issuer.
    pub issuer: Arc<TokenIssuer>,
    /// Authentication state for the session middleware.
    pub auth: AuthState,
    /// Authentication configuration (cookie flags, providers, origins).
    pub auth_config: Arc<AuthConfig>,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        store: Arc<dyn UserStore>,
        sign_in: SignInFlow,
        issuer: Arc<TokenIssuer>,
        auth: AuthState,
        auth_config: AuthConfig,
    ) -> Self {
        Self {
            store,
            sign_in: Arc::new(sign_in),
            issuer,
            auth,
            auth_config: Arc::new(auth_config),
        }
    }
}

//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret for signing session tokens (HS256).
    /// Supports `env:VAR_NAME` indirection.
    pub signing_secret: Option<String>,

    /// Session token lifetime in seconds.
    pub token_ttl_secs: i64,

    /// Whether the session cookie carries the Secure flag.
    /// Disable only for plain-http local development.
    pub cookie_secure: bool,

    /// Identity providers trusted to assert user identities.
    pub providers: Vec<ProviderConfig>,

    /// Allowed CORS origins. If empty, cross-origin requests are denied.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // No default secret - must be explicitly configured
            signing_secret: None,
            token_ttl_secs: 60 * 60 * 24,
            cookie_secure: true,
            providers: Vec::new(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
        }
    }
}

impl AuthConfig {
    /// Resolve the signing secret, expanding `env:VAR_NAME` syntax.
    /// Returns the resolved secret or None if not configured.
    pub fn resolve_signing_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        match &self.signing_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
                    }
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    /// Validate the configuration before serving.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let secret = self.resolve_signing_secret()?;

        match secret {
            None => Err(ConfigValidationError::MissingSigningSecret),
            Some(secret) if secret.len() < 32 => Err(ConfigValidationError::SigningSecretTooShort),
            Some(_) => Ok(()),
        }
    }

    /// Look up a configured identity provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Generate a secure random signing secret using the OS-backed RNG.
    pub fn generate_signing_secret() -> String {
        use rand::Rng;

        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        const SECRET_LENGTH: usize = 64;

        let mut rng = rand::rng();
        (0..SECRET_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

/// Credentials for one trusted identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name as it appears in callback paths.
    pub name: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret. Supports `env:VAR_NAME` indirection.
    pub client_secret: String,
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// A signing secret is required to serve.
    MissingSigningSecret,
    /// Signing secret is too short (minimum 32 characters).
    SigningSecretTooShort,
    /// Environment variable not found (for `env:VAR_NAME` syntax).
    EnvVarNotFound(String),
    /// Environment variable is empty (for `env:VAR_NAME` syntax).
    EnvVarEmpty(String),
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSigningSecret => {
                write!(
                    f,
                    "A signing secret is required. Set STAFFGATE__AUTH__SIGNING_SECRET or auth.signing_secret in config."
                )
            }
            Self::SigningSecretTooShort => {
                write!(
                    f,
                    "Signing secret must be at least 32 characters long for security."
                )
            }
            Self::EnvVarNotFound(var) => {
                write!(
                    f,
                    "Environment variable '{}' not found (referenced via env:{} in config).",
                    var, var
                )
            }
            Self::EnvVarEmpty(var) => {
                write!(
                    f,
                    "Environment variable '{}' is empty (referenced via env:{} in config).",
                    var, var
                )
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert!(config.signing_secret.is_none());
        assert!(config.providers.is_empty());
        assert!(config.cookie_secure);
        assert_eq!(config.token_ttl_secs, 86400);
    }

    #[test]
    fn test_validation_missing_secret() {
        let config = AuthConfig::default();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::MissingSigningSecret
        );
    }

    #[test]
    fn test_validation_short_secret() {
        let config = AuthConfig {
            signing_secret: Some("tooshort".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::SigningSecretTooShort
        );
    }

    #[test]
    fn test_validation_ok() {
        let config = AuthConfig {
            signing_secret: Some("a-very-long-and-secure-signing-secret-over-32-chars".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_secret_literal() {
        let config = AuthConfig {
            signing_secret: Some("my-literal-secret".to_string()),
            ..Default::default()
        };
        let resolved = config.resolve_signing_secret().unwrap();
        assert_eq!(resolved, Some("my-literal-secret".to_string()));
    }

    #[test]
    fn test_resolve_secret_env_var() {
        // SAFETY: test-only environment variable with a unique name
        unsafe {
            std::env::set_var("TEST_SIGNING_SECRET_90731", "secret-from-env-at-least-32-chars-long");
        }

        let config = AuthConfig {
            signing_secret: Some("env:TEST_SIGNING_SECRET_90731".to_string()),
            ..Default::default()
        };
        let resolved = config.resolve_signing_secret().unwrap();
        assert_eq!(
            resolved,
            Some("secret-from-env-at-least-32-chars-long".to_string())
        );

        // SAFETY: cleaning up test environment variable
        unsafe {
            std::env::remove_var("TEST_SIGNING_SECRET_90731");
        }
    }

    #[test]
    fn test_resolve_secret_env_var_missing() {
        let config = AuthConfig {
            signing_secret: Some("env:NONEXISTENT_VAR_90731".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_signing_secret().unwrap_err(),
            ConfigValidationError::EnvVarNotFound("NONEXISTENT_VAR_90731".to_string())
        );
    }

    #[test]
    fn test_provider_lookup() {
        let config = AuthConfig {
            providers: vec![ProviderConfig {
                name: "globalid".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
            }],
            ..Default::default()
        };

        assert!(config.provider("globalid").is_some());
        assert!(config.provider("other").is_none());
    }

    #[test]
    fn test_generate_signing_secret() {
        let secret = AuthConfig::generate_signing_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));

        // Two draws should not collide.
        assert_ne!(secret, AuthConfig::generate_signing_secret());
    }
}

//! User store adapter.
//!
//! The rest of the crate only sees the [`UserStore`] trait; the sqlite
//! implementation below is injected once at startup and shared by reference.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::models::{NewUser, ProviderDefaults, Role, User};

const SELECT_COLUMNS: &str = r#"
    SELECT id, email, password_hash, display_name, role, provider,
           provider_subject, email_verified_at, is_active, created_at,
           updated_at, last_sign_in_at
    FROM users
"#;

/// Operations the authentication core needs from the user collection.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn create(&self, user: NewUser) -> Result<User>;

    async fn update_role(&self, id: &str, role: Role) -> Result<()>;

    /// Find-or-create keyed by identity-provider subject. Must be atomic:
    /// repeated or concurrent calls for the same subject yield one record.
    /// Links to an existing record with the same email, stamping
    /// `email_verified_at` on first association.
    async fn upsert_by_provider_subject(
        &self,
        provider: &str,
        subject: &str,
        defaults: ProviderDefaults,
    ) -> Result<User>;

    async fn touch_last_sign_in(&self, id: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<User>>;
}

/// Sqlite-backed user store.
#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Generate a unique user ID from an email address.
    /// Always includes a random suffix to guarantee uniqueness without a
    /// store lookup.
    fn generate_user_id(email: &str) -> String {
        let local = email.split('@').next().unwrap_or("user");
        let mut base: String = local
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '_' | '-' => c,
                _ => '-',
            })
            .collect();
        base = base.trim_matches('-').to_string();
        if base.is_empty() {
            base = "user".to_string();
        }
        if base.len() > 31 {
            base.truncate(31);
        }
        format!("{}-{}", base, nanoid::nanoid!(6))
    }

    async fn find_by_provider_subject(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<User>> {
        let sql = format!("{SELECT_COLUMNS} WHERE provider = ? AND provider_subject = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(provider)
            .bind(subject)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by provider subject")?;

        Ok(user)
    }
}

/// Emails are stored and looked up lowercased so provider casing never
/// produces duplicate accounts.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl UserStore for SqliteUserStore {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("{SELECT_COLUMNS} WHERE email = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")?;

        Ok(user)
    }

    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn create(&self, user: NewUser) -> Result<User> {
        let email = normalize_email(&user.email);
        let id = Self::generate_user_id(&email);

        debug!("Creating user: {} ({})", email, id);

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, display_name, role)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.role)
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after creation"))
    }

    #[instrument(skip(self))]
    async fn update_role(&self, id: &str, role: Role) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET role = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(role)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update role")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("User not found: {}", id);
        }

        Ok(())
    }

    #[instrument(skip(self, defaults), fields(provider = %provider))]
    async fn upsert_by_provider_subject(
        &self,
        provider: &str,
        subject: &str,
        defaults: ProviderDefaults,
    ) -> Result<User> {
        if let Some(user) = self.find_by_provider_subject(provider, subject).await? {
            return Ok(user);
        }

        let email = normalize_email(&defaults.email);
        let id = Self::generate_user_id(&email);

        // One statement covers both races: a concurrent provision for the
        // same subject, and an existing credentials account with the same
        // email (which gets linked, keeping its role if it has one).
        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, role, provider,
                               provider_subject, email_verified_at)
            VALUES (?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(provider, provider_subject) WHERE provider_subject IS NOT NULL
                DO UPDATE SET updated_at = datetime('now')
            ON CONFLICT(email) DO UPDATE SET
                provider = excluded.provider,
                provider_subject = excluded.provider_subject,
                email_verified_at = COALESCE(users.email_verified_at, excluded.email_verified_at),
                role = COALESCE(users.role, excluded.role),
                updated_at = datetime('now')
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(&defaults.display_name)
        .bind(defaults.role)
        .bind(provider)
        .bind(subject)
        .execute(&self.pool)
        .await
        .context("Failed to upsert user by provider subject")?;

        self.find_by_provider_subject(provider, subject)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after provider upsert"))
    }

    #[instrument(skip(self))]
    async fn touch_last_sign_in(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET last_sign_in_at = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update last sign-in")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<User>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY created_at DESC");
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup_store() -> SqliteUserStore {
        let db = Database::in_memory().await.unwrap();
        SqliteUserStore::new(db.pool().clone())
    }

    fn provider_defaults(email: &str) -> ProviderDefaults {
        ProviderDefaults {
            email: email.to_string(),
            display_name: "Provider User".to_string(),
            role: Role::Employee,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = setup_store().await;

        let user = store
            .create(NewUser {
                email: "Test@Example.com".to_string(),
                password_hash: Some("hash".to_string()),
                display_name: "Test User".to_string(),
                role: None,
            })
            .await
            .unwrap();

        // Email is normalized on the way in.
        assert_eq!(user.email, "test@example.com");
        assert!(user.role.is_none());
        assert!(user.is_active);

        let by_id = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.id, user.id);

        let by_email = store.find_by_email("TEST@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn test_update_role() {
        let store = setup_store().await;

        let user = store
            .create(NewUser {
                email: "role@example.com".to_string(),
                password_hash: None,
                display_name: "Role User".to_string(),
                role: None,
            })
            .await
            .unwrap();

        store.update_role(&user.id, Role::Admin).await.unwrap();

        let updated = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(updated.role, Some(Role::Admin));

        assert!(store.update_role("missing", Role::Admin).await.is_err());
    }

    #[tokio::test]
    async fn test_provider_upsert_is_idempotent() {
        let store = setup_store().await;

        let first = store
            .upsert_by_provider_subject("globalid", "sub-1", provider_defaults("idp@example.com"))
            .await
            .unwrap();
        let second = store
            .upsert_by_provider_subject("globalid", "sub-1", provider_defaults("idp@example.com"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(first.email_verified_at.is_some());
        assert_eq!(first.role, Some(Role::Employee));
    }

    #[tokio::test]
    async fn test_provider_upsert_links_existing_email() {
        let store = setup_store().await;

        let existing = store
            .create(NewUser {
                email: "linked@example.com".to_string(),
                password_hash: Some("hash".to_string()),
                display_name: "Linked".to_string(),
                role: Some(Role::Admin),
            })
            .await
            .unwrap();
        assert!(existing.email_verified_at.is_none());

        let linked = store
            .upsert_by_provider_subject("globalid", "sub-2", provider_defaults("linked@example.com"))
            .await
            .unwrap();

        assert_eq!(linked.id, existing.id);
        assert_eq!(linked.provider_subject.as_deref(), Some("sub-2"));
        assert!(linked.email_verified_at.is_some());
        // Linking never downgrades an existing role.
        assert_eq!(linked.role, Some(Role::Admin));
        // The credentials stay usable.
        assert_eq!(linked.password_hash.as_deref(), Some("hash"));
    }

    #[tokio::test]
    async fn test_generate_user_id_shape() {
        let id = SqliteUserStore::generate_user_id("Jane.Doe@example.com");
        assert!(id.starts_with("jane-doe-"));

        let odd = SqliteUserStore::generate_user_id("@example.com");
        assert!(odd.starts_with("user-"));
    }
}

//! User records and API-token storage.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::AuthDb;
use crate::error::{AuthError, AuthResult};
use crate::links::timestamp_to_datetime;

/// A user account, anchored by its Spotify identity.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub spotify_user_id: String,
    /// Display name from the Spotify profile, refreshed on login.
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Bearer token embedded in the posting URL. Always present; rotation
    /// replaces it atomically.
    pub api_url_token: Uuid,
    /// SHA-256 hash of the optional header token. Never stores plaintext.
    pub api_header_token_hash: Option<String>,
    pub api_header_token_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for the users table.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    spotify_user_id: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    api_url_token: String,
    api_header_token_hash: Option<String>,
    api_header_token_enabled: bool,
    created_at: i64,
    updated_at: i64,
}

impl UserRow {
    fn into_user(self) -> AuthResult<User> {
        let id = Uuid::parse_str(&self.id).map_err(|_| AuthError::InvalidId(self.id.clone()))?;
        let api_url_token = Uuid::parse_str(&self.api_url_token)
            .map_err(|_| AuthError::InvalidId(self.api_url_token.clone()))?;

        Ok(User {
            id,
            spotify_user_id: self.spotify_user_id,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            api_url_token,
            api_header_token_hash: self.api_header_token_hash,
            api_header_token_enabled: self.api_header_token_enabled,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        })
    }
}

const SELECT_USER: &str = r#"
    SELECT id, spotify_user_id, display_name, avatar_url, api_url_token,
           api_header_token_hash, api_header_token_enabled,
           created_at, updated_at
    FROM users
"#;

impl AuthDb {
    /// Create a user on first Spotify login, or refresh display attributes
    /// on a returning one. Keyed on the Spotify account id; the internal id
    /// and API URL token are minted once and survive re-login.
    pub async fn upsert_user(
        &self,
        spotify_user_id: &str,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> AuthResult<User> {
        let now = Utc::now().timestamp();

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (
                id, spotify_user_id, display_name, avatar_url, api_url_token,
                api_header_token_enabled, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT (spotify_user_id) DO UPDATE SET
                display_name = excluded.display_name,
                avatar_url = excluded.avatar_url,
                updated_at = excluded.updated_at
            RETURNING id, spotify_user_id, display_name, avatar_url, api_url_token,
                      api_header_token_hash, api_header_token_enabled,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(spotify_user_id)
        .bind(display_name)
        .bind(avatar_url)
        .bind(Uuid::new_v4().to_string())
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        row.into_user()
    }

    /// Look up a user by internal id.
    pub async fn get_user(&self, id: Uuid) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    /// Look up a user by their posting URL token.
    pub async fn get_user_by_api_url_token(&self, token: Uuid) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE api_url_token = ?"))
            .bind(token.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    /// Rotate the posting URL token.
    ///
    /// One UPDATE: the old value stops validating in the same statement that
    /// activates the new one, so there is no window of dual validity.
    pub async fn regenerate_api_url_token(&self, user_id: Uuid) -> AuthResult<Uuid> {
        let new_token = Uuid::new_v4();
        let now = Utc::now().timestamp();

        sqlx::query("UPDATE users SET api_url_token = ?, updated_at = ? WHERE id = ?")
            .bind(new_token.to_string())
            .bind(now)
            .bind(user_id.to_string())
            .execute(self.pool())
            .await?;

        Ok(new_token)
    }

    /// Store a new header token hash and enable header-token enforcement.
    pub async fn set_api_header_token(&self, user_id: Uuid, token_hash: &str) -> AuthResult<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE users SET
                api_header_token_hash = ?,
                api_header_token_enabled = 1,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .bind(user_id.to_string())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Disable header-token enforcement and drop the stored hash.
    pub async fn disable_api_header_token(&self, user_id: Uuid) -> AuthResult<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE users SET
                api_header_token_hash = NULL,
                api_header_token_enabled = 0,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(user_id.to_string())
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_token;

    #[tokio::test]
    async fn upsert_creates_then_refreshes() {
        let db = AuthDb::open_in_memory().await.unwrap();

        let created = db
            .upsert_user("spotify-1", Some("First Name"), None)
            .await
            .unwrap();
        assert_eq!(created.spotify_user_id, "spotify-1");
        assert_eq!(created.display_name.as_deref(), Some("First Name"));
        assert!(!created.api_header_token_enabled);

        let updated = db
            .upsert_user("spotify-1", Some("New Name"), Some("https://img.example/a.png"))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id, "internal id survives re-login");
        assert_eq!(
            updated.api_url_token, created.api_url_token,
            "posting token survives re-login"
        );
        assert_eq!(updated.display_name.as_deref(), Some("New Name"));
    }

    #[tokio::test]
    async fn url_token_rotation_is_atomic() {
        let db = AuthDb::open_in_memory().await.unwrap();
        let user = db.upsert_user("spotify-2", None, None).await.unwrap();
        let old_token = user.api_url_token;

        assert!(
            db.get_user_by_api_url_token(old_token)
                .await
                .unwrap()
                .is_some()
        );

        let new_token = db.regenerate_api_url_token(user.id).await.unwrap();
        assert_ne!(new_token, old_token);

        // The old value is dead the instant rotation commits.
        assert!(
            db.get_user_by_api_url_token(old_token)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            db.get_user_by_api_url_token(new_token)
                .await
                .unwrap()
                .unwrap()
                .id,
            user.id
        );
    }

    #[tokio::test]
    async fn header_token_set_and_disable() {
        let db = AuthDb::open_in_memory().await.unwrap();
        let user = db.upsert_user("spotify-3", None, None).await.unwrap();

        let hash = hash_token("plaintext-header-token");
        db.set_api_header_token(user.id, &hash).await.unwrap();

        let stored = db.get_user(user.id).await.unwrap().unwrap();
        assert!(stored.api_header_token_enabled);
        assert_eq!(stored.api_header_token_hash.as_deref(), Some(hash.as_str()));

        db.disable_api_header_token(user.id).await.unwrap();
        let stored = db.get_user(user.id).await.unwrap().unwrap();
        assert!(!stored.api_header_token_enabled);
        assert!(stored.api_header_token_hash.is_none());
    }
}

//! Browser session storage.
//!
//! Sessions are keyed by the SHA-256 hash of an opaque random token; the
//! plaintext token lives only in the user's cookie. Because validation is a
//! store lookup, deleting the row revokes the session immediately.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::AuthDb;
use crate::error::{AuthError, AuthResult};

impl AuthDb {
    /// Store a new session row.
    pub async fn create_session(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(token_hash)
        .bind(user_id.to_string())
        .bind(now)
        .bind(expires_at.timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Resolve a session token hash to its user id. Expired rows are misses.
    pub async fn session_user_id(&self, token_hash: &str) -> AuthResult<Option<Uuid>> {
        let now = Utc::now().timestamp();

        let row: Option<(String,)> = sqlx::query_as(
            "SELECT user_id FROM sessions WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(|(id,)| Uuid::parse_str(&id).map_err(|_| AuthError::InvalidId(id.clone())))
            .transpose()
    }

    /// Delete a session row (logout). Idempotent.
    pub async fn delete_session(&self, token_hash: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Sweep expired session rows.
    pub async fn delete_expired_sessions(&self) -> AuthResult<u64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}

//! Browser session management.
//!
//! Session tokens are opaque 32-byte random values; only their SHA-256 hash
//! is stored, and authentication is always a store lookup, so invalidation
//! takes effect immediately rather than waiting for an expiry to pass.

use chrono::{Duration, Utc};
use refrain_auth::{AuthDb, User, generate_token, hash_token};

use crate::error::{CoreError, Result};

pub struct SessionManager {
    db: AuthDb,
    ttl_days: i64,
}

impl SessionManager {
    pub fn new(db: AuthDb, ttl_days: i64) -> Self {
        Self { db, ttl_days }
    }

    /// Session lifetime, for cookie max-age.
    pub fn ttl(&self) -> Duration {
        Duration::days(self.ttl_days)
    }

    /// Create a session for a user. The returned token is the only copy of
    /// the plaintext; it goes into the cookie and nowhere else.
    pub async fn create(&self, user: &User) -> Result<String> {
        let token = generate_token(32);
        self.db
            .create_session(&hash_token(&token), user.id, Utc::now() + self.ttl())
            .await?;
        Ok(token)
    }

    /// Resolve a session token to its user, or fail `Unauthenticated`.
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let user_id = self
            .db
            .session_user_id(&hash_token(token))
            .await?
            .ok_or(CoreError::Unauthenticated)?;

        self.db
            .get_user(user_id)
            .await?
            .ok_or(CoreError::Unauthenticated)
    }

    /// Invalidate a session (logout). Idempotent.
    pub async fn invalidate(&self, token: &str) -> Result<()> {
        self.db.delete_session(&hash_token(token)).await?;
        Ok(())
    }
}

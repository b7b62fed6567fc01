//! In-flight handshake attempts.
//!
//! A row is written when a provider handshake starts and consumed exactly
//! once by the matching callback. Consumption is an atomic
//! `DELETE ... RETURNING`, so a second callback with the same state finds
//! nothing. Expiry is checked at lookup; the sweeper is an optimization.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::db::AuthDb;
use crate::error::{AuthError, AuthResult};
use crate::links::{ProviderKind, timestamp_to_datetime};

/// Server-held state for one redirect round-trip.
#[derive(Debug, Clone)]
pub struct LinkAttempt {
    /// Opaque CSRF value carried through the redirect. For Misskey this is
    /// the MiAuth session id.
    pub state: String,
    /// Absent for the Spotify login flow, where no user exists yet.
    pub user_id: Option<Uuid>,
    pub provider: ProviderKind,
    /// PKCE code verifier (Twitter only).
    pub pkce_verifier: Option<String>,
    /// Target instance base URL (Misskey only).
    pub instance_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LinkAttemptRow {
    state: String,
    user_id: Option<String>,
    provider: String,
    pkce_verifier: Option<String>,
    instance_url: Option<String>,
    created_at: i64,
    expires_at: i64,
}

impl LinkAttemptRow {
    fn into_attempt(self) -> AuthResult<LinkAttempt> {
        let user_id = self
            .user_id
            .as_deref()
            .map(|id| Uuid::parse_str(id).map_err(|_| AuthError::InvalidId(id.to_string())))
            .transpose()?;

        Ok(LinkAttempt {
            state: self.state,
            user_id,
            provider: ProviderKind::parse(&self.provider)?,
            pkce_verifier: self.pkce_verifier,
            instance_url: self.instance_url,
            created_at: timestamp_to_datetime(self.created_at),
            expires_at: timestamp_to_datetime(self.expires_at),
        })
    }
}

impl AuthDb {
    /// Persist a new handshake attempt.
    pub async fn put_attempt(&self, attempt: &LinkAttempt) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO link_attempts (
                state, user_id, provider, pkce_verifier, instance_url,
                created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.state)
        .bind(attempt.user_id.map(|id| id.to_string()))
        .bind(attempt.provider.as_str())
        .bind(&attempt.pkce_verifier)
        .bind(&attempt.instance_url)
        .bind(attempt.created_at.timestamp())
        .bind(attempt.expires_at.timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Consume the attempt matching `state`.
    ///
    /// Returns `None` for a missing, already-consumed, or expired attempt —
    /// the callers treat all three identically. The row is deleted either
    /// way, so the same state can never complete twice.
    pub async fn take_attempt(&self, state: &str) -> AuthResult<Option<LinkAttempt>> {
        let row = sqlx::query_as::<_, LinkAttemptRow>(
            r#"
            DELETE FROM link_attempts
            WHERE state = ?
            RETURNING state, user_id, provider, pkce_verifier, instance_url,
                      created_at, expires_at
            "#,
        )
        .bind(state)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let attempt = row.into_attempt()?;
        if attempt.expires_at <= Utc::now() {
            debug!(state, provider = %attempt.provider, "handshake attempt expired");
            return Ok(None);
        }

        Ok(Some(attempt))
    }

    /// Sweep attempts past their expiry. Correctness does not depend on
    /// this running; `take_attempt` rejects stale rows on its own.
    pub async fn cleanup_expired_attempts(&self) -> AuthResult<u64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query("DELETE FROM link_attempts WHERE expires_at < ?")
            .bind(now)
            .execute(self.pool())
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!("Cleaned up {} expired link attempts", deleted);
        }
        Ok(deleted)
    }
}

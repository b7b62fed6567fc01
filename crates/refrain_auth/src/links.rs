//! Provider credential links.
//!
//! One row per (user, provider). A row existing means a usable credential is
//! stored for it; there is no separate "connected" flag, and a credential
//! that turns out to be permanently invalid deletes the row.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::AuthDb;
use crate::error::{AuthError, AuthResult};

/// The three identity providers a user can hold credentials for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Spotify. Anchors the user account; always uses refreshable
    /// authorization-code credentials.
    Spotify,
    /// A Misskey instance, linked via MiAuth. Credentials never expire.
    Misskey,
    /// X/Twitter, linked via OAuth 2.0 PKCE.
    Twitter,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Spotify => "spotify",
            ProviderKind::Misskey => "misskey",
            ProviderKind::Twitter => "twitter",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AuthError> {
        match s {
            "spotify" => Ok(ProviderKind::Spotify),
            "misskey" => Ok(ProviderKind::Misskey),
            "twitter" => Ok(ProviderKind::Twitter),
            other => Err(AuthError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored provider credential plus the linked identity it belongs to.
#[derive(Debug, Clone)]
pub struct ProviderLink {
    pub user_id: Uuid,
    pub provider: ProviderKind,
    /// The provider-side account id.
    pub external_id: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absent for non-expiring credentials (Misskey).
    pub expires_at: Option<DateTime<Utc>>,
    /// Base URL of the Misskey instance, scheme included.
    pub instance_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Margin under which a credential is treated as already expired, so a
/// just-resolved credential cannot lapse mid-request.
const EXPIRY_SKEW_SECONDS: i64 = 30;

impl ProviderLink {
    /// Whether the access credential is expired (or will be within the skew
    /// margin). Credentials without an expiry never expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS),
            None => false,
        }
    }

    /// Hostname of the Misskey instance, without scheme.
    pub fn instance_host(&self) -> Option<String> {
        let raw = self.instance_url.as_deref()?;
        match url::Url::parse(raw) {
            Ok(parsed) => parsed.host_str().map(|h| match parsed.port() {
                Some(port) => format!("{h}:{port}"),
                None => h.to_string(),
            }),
            Err(_) => Some(raw.to_string()),
        }
    }
}

/// Database row for the provider_links table.
#[derive(Debug, sqlx::FromRow)]
struct ProviderLinkRow {
    user_id: String,
    provider: String,
    external_id: String,
    username: Option<String>,
    avatar_url: Option<String>,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    instance_url: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl AuthDb {
    fn link_from_row(&self, row: ProviderLinkRow) -> AuthResult<ProviderLink> {
        let user_id = Uuid::parse_str(&row.user_id)
            .map_err(|_| AuthError::InvalidId(row.user_id.clone()))?;
        let access_token = self.unseal(&row.access_token)?;
        let refresh_token = row
            .refresh_token
            .as_deref()
            .map(|t| self.unseal(t))
            .transpose()?;

        Ok(ProviderLink {
            user_id,
            provider: ProviderKind::parse(&row.provider)?,
            external_id: row.external_id,
            username: row.username,
            avatar_url: row.avatar_url,
            access_token,
            refresh_token,
            expires_at: row.expires_at.map(timestamp_to_datetime),
            instance_url: row.instance_url,
            created_at: timestamp_to_datetime(row.created_at),
            updated_at: timestamp_to_datetime(row.updated_at),
        })
    }

    /// Get the credential link for a (user, provider), if one exists.
    pub async fn get_link(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> AuthResult<Option<ProviderLink>> {
        let row = sqlx::query_as::<_, ProviderLinkRow>(
            r#"
            SELECT user_id, provider, external_id, username, avatar_url,
                   access_token, refresh_token, expires_at, instance_url,
                   created_at, updated_at
            FROM provider_links
            WHERE user_id = ? AND provider = ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(provider.as_str())
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| self.link_from_row(r)).transpose()
    }

    /// List every credential link a user holds.
    pub async fn list_links(&self, user_id: Uuid) -> AuthResult<Vec<ProviderLink>> {
        let rows = sqlx::query_as::<_, ProviderLinkRow>(
            r#"
            SELECT user_id, provider, external_id, username, avatar_url,
                   access_token, refresh_token, expires_at, instance_url,
                   created_at, updated_at
            FROM provider_links
            WHERE user_id = ?
            ORDER BY provider
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(|r| self.link_from_row(r)).collect()
    }

    /// Store or replace a credential link.
    ///
    /// Upserts on (user, provider): a new link for the same provider
    /// atomically replaces the old one, whole-row, last-committed-wins.
    pub async fn put_link(&self, link: &ProviderLink) -> AuthResult<()> {
        let access_token = self.seal(&link.access_token)?;
        let refresh_token = link
            .refresh_token
            .as_deref()
            .map(|t| self.seal(t))
            .transpose()?;
        let expires_at = link.expires_at.map(|dt| dt.timestamp());
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO provider_links (
                user_id, provider, external_id, username, avatar_url,
                access_token, refresh_token, expires_at, instance_url,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, provider) DO UPDATE SET
                external_id = excluded.external_id,
                username = excluded.username,
                avatar_url = excluded.avatar_url,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                instance_url = excluded.instance_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(link.user_id.to_string())
        .bind(link.provider.as_str())
        .bind(&link.external_id)
        .bind(&link.username)
        .bind(&link.avatar_url)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(&link.instance_url)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Delete a credential link. Returns whether a row was removed.
    pub async fn delete_link(&self, user_id: Uuid, provider: ProviderKind) -> AuthResult<bool> {
        let result = sqlx::query("DELETE FROM provider_links WHERE user_id = ? AND provider = ?")
            .bind(user_id.to_string())
            .bind(provider.as_str())
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Convert a Unix timestamp (seconds) to a DateTime<Utc>.
pub(crate) fn timestamp_to_datetime(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now)
}

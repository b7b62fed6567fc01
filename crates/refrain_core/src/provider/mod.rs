//! Provider adapters.
//!
//! Each provider's OAuth variant sits behind one [`ProviderAdapter`]
//! interface, dispatched by [`ProviderKind`] through the [`Adapters`]
//! registry. Spotify and Twitter are authorization-code exchanges with
//! refresh credentials; Misskey's MiAuth mints a single non-expiring token,
//! so its `refresh` hands back the stored credential unchanged.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use refrain_auth::{LinkAttempt, ProviderKind, ProviderLink};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{CoreError, Result};

pub mod misskey;
pub mod spotify;
pub mod twitter;

pub use misskey::MisskeyAdapter;
pub use spotify::SpotifyAdapter;
pub use twitter::TwitterAdapter;

/// Inputs to starting a handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandshakeParams<'a> {
    /// Absent only for the Spotify login flow, which precedes the user.
    pub user_id: Option<Uuid>,
    /// User-supplied instance host (Misskey only).
    pub instance_host: Option<&'a str>,
}

/// A started handshake: where to send the browser, and the server-held
/// state the callback must match.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub auth_url: String,
    pub attempt: LinkAttempt,
}

/// Parameters the provider sent back through the redirect.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    /// Authorization code (Spotify and Twitter).
    pub code: Option<String>,
}

/// An access credential freshly obtained from a provider.
#[derive(Debug, Clone)]
pub struct ProviderCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The provider-side identity behind a credential.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub external_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Build the provider authorization URL and the attempt to persist.
    async fn begin_handshake(&self, params: HandshakeParams<'_>) -> Result<Handshake>;

    /// Exchange the callback's authorization artifact for a credential.
    /// State matching and attempt expiry are the orchestrator's job; this
    /// only talks to the provider.
    async fn complete_handshake(
        &self,
        attempt: &LinkAttempt,
        callback: &CallbackParams,
    ) -> Result<ProviderCredential>;

    /// Exchange the refresh credential for a new access credential.
    /// Fails `RefreshRevoked` when the provider reports the refresh
    /// credential invalid; the caller deletes the link, never retries.
    async fn refresh(&self, link: &ProviderLink) -> Result<ProviderCredential>;

    /// Fetch the provider's "who am I" endpoint with a fresh credential.
    async fn identify(
        &self,
        access_token: &str,
        instance_url: Option<&str>,
    ) -> Result<ProviderIdentity>;
}

/// Registry of the three adapters, dispatched by kind.
pub struct Adapters {
    spotify: SpotifyAdapter,
    misskey: MisskeyAdapter,
    twitter: TwitterAdapter,
}

impl Adapters {
    pub fn new(config: std::sync::Arc<crate::config::AppConfig>, http: reqwest::Client) -> Self {
        Self {
            spotify: SpotifyAdapter::new(config.clone(), http.clone()),
            misskey: MisskeyAdapter::new(config.clone(), http.clone()),
            twitter: TwitterAdapter::new(config, http),
        }
    }

    /// Assemble from individually-constructed adapters (tests override
    /// endpoint bases this way).
    pub fn from_parts(
        spotify: SpotifyAdapter,
        misskey: MisskeyAdapter,
        twitter: TwitterAdapter,
    ) -> Self {
        Self {
            spotify,
            misskey,
            twitter,
        }
    }

    pub fn get(&self, kind: ProviderKind) -> &dyn ProviderAdapter {
        match kind {
            ProviderKind::Spotify => &self.spotify,
            ProviderKind::Misskey => &self.misskey,
            ProviderKind::Twitter => &self.twitter,
        }
    }
}

/// Opaque CSRF state for a new handshake.
pub(crate) fn generate_state() -> String {
    refrain_auth::generate_token(16)
}

/// Build the attempt row for a handshake starting now.
pub(crate) fn new_attempt(
    state: String,
    provider: ProviderKind,
    params: &HandshakeParams<'_>,
    ttl_minutes: i64,
) -> LinkAttempt {
    let now = Utc::now();
    LinkAttempt {
        state,
        user_id: params.user_id,
        provider,
        pkce_verifier: None,
        instance_url: None,
        created_at: now,
        expires_at: now + Duration::minutes(ttl_minutes),
    }
}

/// Check the response status and decode JSON, converting provider-side
/// errors into `ProviderRejected` without leaking the body to callers.
pub(crate) async fn expect_json<T: DeserializeOwned>(
    response: reqwest::Response,
    provider: ProviderKind,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%provider, %status, body, "provider endpoint returned an error");
        return Err(CoreError::ProviderRejected {
            provider,
            detail: format!("status {status}"),
        });
    }

    Ok(response.json().await?)
}

/// Token endpoint response shared by the authorization-code providers.
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl OAuthTokenResponse {
    pub(crate) fn into_credential(self) -> ProviderCredential {
        ProviderCredential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
        }
    }
}

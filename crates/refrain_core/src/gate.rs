//! Dispatch gating: eligibility and credential resolution.
//!
//! `resolve_credential` is the sole path by which any caller obtains a live
//! outbound credential. Refresh happens here, on use, under a per-(user,
//! provider) lock, so no caller can bypass refresh by caching raw
//! credentials.

use refrain_auth::{AuthDb, ProviderKind, ProviderLink};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, Eligibility};
use crate::error::{CoreError, Result};
use crate::provider::Adapters;

/// Per-provider permission snapshot for the optional posting destinations.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReport {
    pub misskey: Eligibility,
    pub twitter: Eligibility,
}

/// A credential ready for outbound use, plus the instance it belongs to
/// (Misskey only). Callers hold this for at most one request.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub access_token: String,
    pub instance_url: Option<String>,
}

impl ResolvedCredential {
    fn from_link(link: ProviderLink) -> Self {
        Self {
            access_token: link.access_token,
            instance_url: link.instance_url,
        }
    }
}

pub struct DispatchGate {
    db: AuthDb,
    adapters: Arc<Adapters>,
    config: Arc<AppConfig>,
    // One lock per (user, provider) so concurrent requests serialize their
    // refresh instead of racing the token endpoint.
    refresh_locks: Mutex<HashMap<(Uuid, ProviderKind), Arc<Mutex<()>>>>,
}

impl DispatchGate {
    pub fn new(db: AuthDb, adapters: Arc<Adapters>, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            adapters,
            config,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Compute eligibility from the user's current links. Derived, never
    /// cached: unlinking Misskey flips a dependent Twitter rule on the very
    /// next query.
    pub async fn eligibility(&self, user_id: Uuid) -> Result<EligibilityReport> {
        let links = self.db.list_links(user_id).await?;
        Ok(self.eligibility_for(&links))
    }

    /// Pure eligibility over a known link set.
    pub fn eligibility_for(&self, links: &[ProviderLink]) -> EligibilityReport {
        let misskey_link = links.iter().find(|l| l.provider == ProviderKind::Misskey);

        let misskey = if misskey_link.is_some() {
            Eligibility::allowed()
        } else {
            Eligibility::blocked("Misskey is not connected")
        };

        EligibilityReport {
            misskey,
            twitter: self.config.twitter.check_eligibility(misskey_link),
        }
    }

    /// Fetch a usable access credential for a provider, refreshing if the
    /// stored one has expired. Fails `NotConnected` when no link exists —
    /// including the case where a refresh just revealed the link as dead.
    pub async fn resolve_credential(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<ResolvedCredential> {
        let link = self
            .db
            .get_link(user_id, provider)
            .await?
            .ok_or(CoreError::NotConnected { provider })?;

        if !link.is_expired() {
            return Ok(ResolvedCredential::from_link(link));
        }

        self.refresh_link(user_id, provider, false).await
    }

    /// Refresh regardless of stored expiry. Used for the single retry after
    /// a provider rejects a credential the store still considered live.
    pub async fn force_refresh(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<ResolvedCredential> {
        self.refresh_link(user_id, provider, true).await
    }

    async fn refresh_lock(&self, key: (Uuid, ProviderKind)) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks.entry(key).or_default().clone()
    }

    async fn refresh_link(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
        force: bool,
    ) -> Result<ResolvedCredential> {
        let lock = self.refresh_lock((user_id, provider)).await;
        let _guard = lock.lock().await;

        // Re-read under the lock: another request may have refreshed (or
        // deleted) the link while we waited.
        let link = self
            .db
            .get_link(user_id, provider)
            .await?
            .ok_or(CoreError::NotConnected { provider })?;

        if !force && !link.is_expired() {
            return Ok(ResolvedCredential::from_link(link));
        }

        match self.adapters.get(provider).refresh(&link).await {
            Ok(credential) => {
                let updated = ProviderLink {
                    access_token: credential.access_token,
                    // Providers may omit the refresh token on rotation.
                    refresh_token: credential.refresh_token.or(link.refresh_token.clone()),
                    expires_at: credential.expires_at,
                    ..link
                };
                self.db.put_link(&updated).await?;
                info!(%provider, %user_id, "credential refreshed");
                Ok(ResolvedCredential::from_link(updated))
            }
            Err(CoreError::RefreshRevoked { .. }) => {
                // The credential is permanently dead; the link goes with it.
                warn!(%provider, %user_id, "refresh credential revoked, deleting link");
                self.db.delete_link(user_id, provider).await?;
                Err(CoreError::NotConnected { provider })
            }
            Err(other) => Err(other),
        }
    }
}

//! Link lifecycle orchestration.
//!
//! Drives the connect/disconnect state machine per (user, provider):
//! `Unlinked -> HandshakeStarted -> (Linked | Failed)`. All writes go
//! through the store; a failed exchange leaves prior links untouched.

use chrono::Utc;
use refrain_auth::{AuthDb, ProviderKind, ProviderLink, User};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{CoreError, Result};
use crate::provider::{Adapters, CallbackParams, HandshakeParams};

/// What a completed link resolved to, for session creation and the
/// dashboard redirect.
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub user: User,
    pub provider: ProviderKind,
    pub username: Option<String>,
}

pub struct LinkingOrchestrator {
    db: AuthDb,
    adapters: Arc<Adapters>,
    config: Arc<AppConfig>,
}

impl LinkingOrchestrator {
    pub fn new(db: AuthDb, adapters: Arc<Adapters>, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            adapters,
            config,
        }
    }

    /// Start a handshake and return the authorization URL to redirect to.
    ///
    /// Spotify anchors the account: relinking while linked is refused
    /// (`user = None` is the login flow). Misskey and Twitter may start a
    /// new handshake while linked; completing it replaces the old link
    /// atomically. Twitter additionally requires eligibility up front.
    pub async fn start_link(
        &self,
        user: Option<&User>,
        provider: ProviderKind,
        instance_host: Option<&str>,
    ) -> Result<String> {
        match provider {
            ProviderKind::Spotify => {
                if let Some(user) = user {
                    if self.db.get_link(user.id, provider).await?.is_some() {
                        return Err(CoreError::AlreadyLinked { provider });
                    }
                }
            }
            ProviderKind::Misskey => {
                user.ok_or(CoreError::Unauthenticated)?;
            }
            ProviderKind::Twitter => {
                let user = user.ok_or(CoreError::Unauthenticated)?;
                let links = self.db.list_links(user.id).await?;
                let misskey = links.iter().find(|l| l.provider == ProviderKind::Misskey);
                let eligibility = self.config.twitter.check_eligibility(misskey);
                if !eligibility.eligible {
                    return Err(CoreError::NotEligible {
                        provider,
                        reason: eligibility
                            .reason
                            .unwrap_or_else(|| "not eligible".to_string()),
                    });
                }
            }
        }

        let handshake = self
            .adapters
            .get(provider)
            .begin_handshake(HandshakeParams {
                user_id: user.map(|u| u.id),
                instance_host,
            })
            .await?;

        self.db.put_attempt(&handshake.attempt).await?;
        info!(%provider, "handshake started");

        Ok(handshake.auth_url)
    }

    /// Complete a handshake from its callback.
    ///
    /// Consumes the attempt matching `state` — exactly once; a replayed,
    /// unknown, or stale state fails `HandshakeExpired`. On success the
    /// credential and identity are written through as one link row, and for
    /// Spotify the user record is created or refreshed first.
    pub async fn complete_link(
        &self,
        provider: ProviderKind,
        state: &str,
        callback: &CallbackParams,
    ) -> Result<LinkOutcome> {
        let attempt = self
            .db
            .take_attempt(state)
            .await?
            .ok_or(CoreError::HandshakeExpired)?;

        if attempt.provider != provider {
            return Err(CoreError::StateMismatch);
        }

        let adapter = self.adapters.get(provider);
        let credential = adapter.complete_handshake(&attempt, callback).await?;
        let identity = adapter
            .identify(&credential.access_token, attempt.instance_url.as_deref())
            .await?;

        let user = match provider {
            ProviderKind::Spotify => {
                self.db
                    .upsert_user(
                        &identity.external_id,
                        identity.display_name.as_deref(),
                        identity.avatar_url.as_deref(),
                    )
                    .await?
            }
            _ => {
                let user_id = attempt.user_id.ok_or(CoreError::StateMismatch)?;
                self.db
                    .get_user(user_id)
                    .await?
                    .ok_or(CoreError::Unauthenticated)?
            }
        };

        let now = Utc::now();
        let link = ProviderLink {
            user_id: user.id,
            provider,
            external_id: identity.external_id,
            username: identity.username.clone(),
            avatar_url: identity.avatar_url,
            access_token: credential.access_token,
            refresh_token: credential.refresh_token,
            expires_at: credential.expires_at,
            instance_url: attempt.instance_url,
            created_at: now,
            updated_at: now,
        };
        self.db.put_link(&link).await?;

        info!(%provider, user_id = %user.id, "provider linked");

        Ok(LinkOutcome {
            user,
            provider,
            username: identity.username,
        })
    }

    /// Remove a provider link. Spotify is refused: it anchors the account.
    /// Idempotent for the other providers.
    pub async fn unlink(&self, user_id: Uuid, provider: ProviderKind) -> Result<()> {
        if provider == ProviderKind::Spotify {
            return Err(CoreError::AnchorUnlink { provider });
        }

        if self.db.delete_link(user_id, provider).await? {
            info!(%provider, %user_id, "provider unlinked");
        }
        Ok(())
    }
}

//! Posting fan-out.
//!
//! One now-playing fetch, then an independent post per connected target.
//! A failure on one provider never affects the other; the outcome carries
//! per-target results and an overall "did anything succeed" flag.

use refrain_auth::{ProviderKind, User, hash_token};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::gate::DispatchGate;
use crate::nowplaying::{NowPlayingService, format_post_text};

/// Post timeouts are longer than the player fetch: note/tweet creation on
/// small instances can be slow.
const POST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which destinations a post request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostTarget {
    Misskey,
    Twitter,
    Both,
}

impl PostTarget {
    /// Parse the `target` query parameter; anything unrecognized means both.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_lowercase()).as_deref() {
            Some("misskey") => PostTarget::Misskey,
            Some("twitter") => PostTarget::Twitter,
            _ => PostTarget::Both,
        }
    }

    fn includes(self, kind: ProviderKind) -> bool {
        matches!(
            (self, kind),
            (PostTarget::Both, _)
                | (PostTarget::Misskey, ProviderKind::Misskey)
                | (PostTarget::Twitter, ProviderKind::Twitter)
        )
    }
}

/// Result of one fan-out, per target.
#[derive(Debug, Clone, Serialize)]
pub struct PostOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, String>,
}

/// Enforce the optional header token on API posting requests.
///
/// With enforcement disabled this is a no-op. With it enabled, the request
/// must carry `Authorization: Bearer <token>` whose hash matches the stored
/// one; anything else is `Unauthenticated`.
pub fn verify_header_token(user: &User, authorization: Option<&str>) -> Result<()> {
    if !user.api_header_token_enabled {
        return Ok(());
    }

    let header = authorization.ok_or(CoreError::Unauthenticated)?;
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(CoreError::Unauthenticated);
    }

    match &user.api_header_token_hash {
        Some(stored) if *stored == hash_token(token) => Ok(()),
        _ => Err(CoreError::Unauthenticated),
    }
}

pub struct Poster {
    http: reqwest::Client,
    gate: Arc<DispatchGate>,
    nowplaying: Arc<NowPlayingService>,
    twitter_api_base: String,
}

impl Poster {
    pub fn new(
        gate: Arc<DispatchGate>,
        nowplaying: Arc<NowPlayingService>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            http,
            gate,
            nowplaying,
            twitter_api_base: "https://api.twitter.com".to_string(),
        }
    }

    /// Override the tweet endpoint base (tests).
    pub fn with_twitter_api_base(mut self, api_base: &str) -> Self {
        self.twitter_api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Fetch the current track and post it to the requested targets.
    ///
    /// Credentials are resolved once per target, up front; eligibility is a
    /// snapshot taken at the same moment. Nothing here revokes in-request
    /// state mid-flight.
    pub async fn post_now_playing(&self, user_id: Uuid, target: PostTarget) -> Result<PostOutcome> {
        let now_playing = self.nowplaying.current(user_id).await?;
        let Some(text) = format_post_text(&now_playing) else {
            return Ok(PostOutcome {
                success: false,
                message: Some("nothing is playing".to_string()),
                results: BTreeMap::new(),
            });
        };

        let eligibility = self.gate.eligibility(user_id).await?;
        let mut results = BTreeMap::new();

        if target.includes(ProviderKind::Misskey) {
            let outcome = self.post_misskey(user_id, &text).await;
            results.insert("misskey".to_string(), outcome);
        }

        if target.includes(ProviderKind::Twitter) {
            let outcome = if eligibility.twitter.eligible {
                self.post_twitter(user_id, &text).await
            } else {
                let reason = eligibility
                    .twitter
                    .reason
                    .unwrap_or_else(|| "not eligible".to_string());
                format!("blocked: {reason}")
            };
            results.insert("twitter".to_string(), outcome);
        }

        let success = results.values().any(|v| v == "success");

        Ok(PostOutcome {
            success,
            message: Some(text),
            results,
        })
    }

    async fn post_misskey(&self, user_id: Uuid, text: &str) -> String {
        let credential = match self
            .gate
            .resolve_credential(user_id, ProviderKind::Misskey)
            .await
        {
            Ok(credential) => credential,
            Err(CoreError::NotConnected { .. }) => return "not connected".to_string(),
            Err(error) => {
                warn!(%error, "misskey credential resolution failed");
                return format!("error: {error}");
            }
        };

        let Some(instance_url) = credential.instance_url else {
            return "error: link has no instance".to_string();
        };

        match self
            .create_note(&instance_url, &credential.access_token, text)
            .await
        {
            Ok(()) => "success".to_string(),
            Err(error) => {
                warn!(%error, instance_url, "misskey post failed");
                format!("error: {error}")
            }
        }
    }

    async fn create_note(&self, instance_url: &str, access_token: &str, text: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{instance_url}/api/notes/create"))
            .timeout(POST_TIMEOUT)
            .json(&serde_json::json!({
                "i": access_token,
                "text": text,
                "visibility": "public",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::ProviderRejected {
                provider: ProviderKind::Misskey,
                detail: format!("status {status}"),
            });
        }
        Ok(())
    }

    async fn post_twitter(&self, user_id: Uuid, text: &str) -> String {
        let credential = match self
            .gate
            .resolve_credential(user_id, ProviderKind::Twitter)
            .await
        {
            Ok(credential) => credential,
            Err(CoreError::NotConnected { .. }) => return "not connected".to_string(),
            Err(error) => {
                warn!(%error, "twitter credential resolution failed");
                return format!("error: {error}");
            }
        };

        match self.create_tweet(&credential.access_token, text).await {
            Ok(()) => "success".to_string(),
            Err(error) => {
                warn!(%error, "twitter post failed");
                format!("error: {error}")
            }
        }
    }

    async fn create_tweet(&self, access_token: &str, text: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/2/tweets", self.twitter_api_base))
            .timeout(POST_TIMEOUT)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::ProviderRejected {
                provider: ProviderKind::Twitter,
                detail: format!("status {status}"),
            });
        }
        Ok(())
    }
}

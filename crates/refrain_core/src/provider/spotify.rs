//! Spotify adapter: standard authorization-code exchange with refresh.

use async_trait::async_trait;
use refrain_auth::{LinkAttempt, ProviderKind, ProviderLink};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::{CoreError, Result};
use crate::provider::{
    CallbackParams, Handshake, HandshakeParams, OAuthTokenResponse, ProviderAdapter,
    ProviderCredential, ProviderIdentity, expect_json, generate_state, new_attempt,
};

const SCOPES: &str = "user-read-currently-playing user-read-playback-state";

pub struct SpotifyAdapter {
    http: reqwest::Client,
    config: Arc<AppConfig>,
    accounts_base: String,
    api_base: String,
}

impl SpotifyAdapter {
    pub fn new(config: Arc<AppConfig>, http: reqwest::Client) -> Self {
        Self {
            http,
            config,
            accounts_base: "https://accounts.spotify.com".to_string(),
            api_base: "https://api.spotify.com".to_string(),
        }
    }

    /// Override the endpoint bases (tests).
    pub fn with_endpoints(mut self, accounts_base: &str, api_base: &str) -> Self {
        self.accounts_base = accounts_base.trim_end_matches('/').to_string();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn redirect_uri(&self) -> String {
        format!("{}/api/auth/spotify/callback", self.config.base_url)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_base))
            .basic_auth(
                &self.config.spotify.client_id,
                Some(&self.config.spotify.client_secret),
            )
            .form(form)
            .send()
            .await?;
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct SpotifyProfile {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[async_trait]
impl ProviderAdapter for SpotifyAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Spotify
    }

    async fn begin_handshake(&self, params: HandshakeParams<'_>) -> Result<Handshake> {
        let state = generate_state();

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.config.spotify.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri())
            .append_pair("scope", SCOPES)
            .append_pair("state", &state)
            .finish();

        Ok(Handshake {
            auth_url: format!("{}/authorize?{}", self.accounts_base, query),
            attempt: new_attempt(
                state,
                ProviderKind::Spotify,
                &params,
                self.config.attempt_ttl_minutes,
            ),
        })
    }

    async fn complete_handshake(
        &self,
        _attempt: &LinkAttempt,
        callback: &CallbackParams,
    ) -> Result<ProviderCredential> {
        let code = callback.code.as_deref().ok_or(CoreError::ProviderRejected {
            provider: ProviderKind::Spotify,
            detail: "callback carried no authorization code".to_string(),
        })?;

        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.redirect_uri()),
            ])
            .await?;

        let tokens: OAuthTokenResponse = expect_json(response, ProviderKind::Spotify).await?;
        Ok(tokens.into_credential())
    }

    async fn refresh(&self, link: &ProviderLink) -> Result<ProviderCredential> {
        let Some(refresh_token) = link.refresh_token.as_deref() else {
            // A refreshable credential without a refresh token is unusable.
            return Err(CoreError::RefreshRevoked {
                provider: ProviderKind::Spotify,
            });
        };

        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;

        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                warn!(body, "spotify reported refresh token invalid");
                Err(CoreError::RefreshRevoked {
                    provider: ProviderKind::Spotify,
                })
            }
            _ => {
                let tokens: OAuthTokenResponse =
                    expect_json(response, ProviderKind::Spotify).await?;
                Ok(tokens.into_credential())
            }
        }
    }

    async fn identify(
        &self,
        access_token: &str,
        _instance_url: Option<&str>,
    ) -> Result<ProviderIdentity> {
        let response = self
            .http
            .get(format!("{}/v1/me", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        let profile: SpotifyProfile = expect_json(response, ProviderKind::Spotify).await?;

        Ok(ProviderIdentity {
            external_id: profile.id,
            username: None,
            display_name: profile.display_name,
            avatar_url: profile.images.into_iter().next().map(|i| i.url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SpotifySettings, TwitterSettings};
    use chrono::Utc;

    fn test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            base_url: "https://refrain.example".to_string(),
            app_name: "refrain".to_string(),
            market: "JP".to_string(),
            attempt_ttl_minutes: 10,
            session_ttl_days: 7,
            spotify: SpotifySettings {
                client_id: "spotify-client".to_string(),
                client_secret: "spotify-secret".to_string(),
            },
            twitter: TwitterSettings::default(),
        })
    }

    #[tokio::test]
    async fn begin_handshake_builds_url_and_attempt() {
        let adapter = SpotifyAdapter::new(test_config(), reqwest::Client::new());
        let handshake = adapter
            .begin_handshake(HandshakeParams::default())
            .await
            .unwrap();

        assert!(
            handshake
                .auth_url
                .starts_with("https://accounts.spotify.com/authorize?")
        );
        assert!(handshake.auth_url.contains("client_id=spotify-client"));
        assert!(handshake.auth_url.contains("response_type=code"));
        assert!(
            handshake
                .auth_url
                .contains(&format!("state={}", handshake.attempt.state))
        );
        assert_eq!(handshake.attempt.provider, ProviderKind::Spotify);
        assert!(handshake.attempt.user_id.is_none());
        assert!(handshake.attempt.expires_at > Utc::now());
    }
}

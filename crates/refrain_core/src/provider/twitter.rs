//! Twitter adapter: OAuth 2.0 authorization-code with PKCE (S256).

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use refrain_auth::{LinkAttempt, ProviderKind, ProviderLink};
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::{CoreError, Result};
use crate::provider::{
    CallbackParams, Handshake, HandshakeParams, OAuthTokenResponse, ProviderAdapter,
    ProviderCredential, ProviderIdentity, expect_json, generate_state, new_attempt,
};

const SCOPES: &str = "tweet.read tweet.write users.read offline.access";

pub struct TwitterAdapter {
    http: reqwest::Client,
    config: Arc<AppConfig>,
    auth_base: String,
    api_base: String,
}

impl TwitterAdapter {
    pub fn new(config: Arc<AppConfig>, http: reqwest::Client) -> Self {
        Self {
            http,
            config,
            auth_base: "https://x.com".to_string(),
            api_base: "https://api.twitter.com".to_string(),
        }
    }

    /// Override the endpoint bases (tests).
    pub fn with_endpoints(mut self, auth_base: &str, api_base: &str) -> Self {
        self.auth_base = auth_base.trim_end_matches('/').to_string();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn redirect_uri(&self) -> String {
        format!("{}/api/twitter/callback", self.config.base_url)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/2/oauth2/token", self.api_base))
            .basic_auth(
                &self.config.twitter.client_id,
                Some(&self.config.twitter.client_secret),
            )
            .form(form)
            .send()
            .await?;
        Ok(response)
    }
}

/// PKCE code challenge (S256) for a verifier.
fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Debug, Deserialize)]
struct TwitterUserResponse {
    data: TwitterUser,
}

#[derive(Debug, Deserialize)]
struct TwitterUser {
    id: String,
    username: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    profile_image_url: Option<String>,
}

#[async_trait]
impl ProviderAdapter for TwitterAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Twitter
    }

    async fn begin_handshake(&self, params: HandshakeParams<'_>) -> Result<Handshake> {
        let state = generate_state();
        let verifier = refrain_auth::generate_token(32);

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.twitter.client_id)
            .append_pair("redirect_uri", &self.redirect_uri())
            .append_pair("scope", SCOPES)
            .append_pair("state", &state)
            .append_pair("code_challenge", &pkce_challenge(&verifier))
            .append_pair("code_challenge_method", "S256")
            .finish();

        let mut attempt = new_attempt(
            state,
            ProviderKind::Twitter,
            &params,
            self.config.attempt_ttl_minutes,
        );
        attempt.pkce_verifier = Some(verifier);

        Ok(Handshake {
            auth_url: format!("{}/i/oauth2/authorize?{}", self.auth_base, query),
            attempt,
        })
    }

    async fn complete_handshake(
        &self,
        attempt: &LinkAttempt,
        callback: &CallbackParams,
    ) -> Result<ProviderCredential> {
        let code = callback.code.as_deref().ok_or(CoreError::ProviderRejected {
            provider: ProviderKind::Twitter,
            detail: "callback carried no authorization code".to_string(),
        })?;
        let verifier = attempt
            .pkce_verifier
            .as_deref()
            .ok_or(CoreError::StateMismatch)?;

        let response = self
            .token_request(&[
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", &self.redirect_uri()),
                ("code_verifier", verifier),
            ])
            .await?;

        let tokens: OAuthTokenResponse = expect_json(response, ProviderKind::Twitter).await?;
        Ok(tokens.into_credential())
    }

    async fn refresh(&self, link: &ProviderLink) -> Result<ProviderCredential> {
        let Some(refresh_token) = link.refresh_token.as_deref() else {
            return Err(CoreError::RefreshRevoked {
                provider: ProviderKind::Twitter,
            });
        };

        let response = self
            .token_request(&[
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;

        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                warn!(body, "twitter reported refresh token invalid");
                Err(CoreError::RefreshRevoked {
                    provider: ProviderKind::Twitter,
                })
            }
            _ => {
                let tokens: OAuthTokenResponse =
                    expect_json(response, ProviderKind::Twitter).await?;
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
            .get(format!(
                "{}/2/users/me?user.fields=profile_image_url",
                self.api_base
            ))
            .bearer_auth(access_token)
            .send()
            .await?;

        let user: TwitterUserResponse = expect_json(response, ProviderKind::Twitter).await?;

        Ok(ProviderIdentity {
            external_id: user.data.id,
            username: Some(user.data.username),
            display_name: user.data.name,
            avatar_url: user.data.profile_image_url,
        })
    }
}

//! Now-playing fetch and formatting against the Spotify player API.

use refrain_auth::ProviderKind;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::gate::DispatchGate;

/// What the player is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NowPlaying {
    Track {
        name: String,
        artists: String,
        url: String,
    },
    Episode {
        name: String,
        show: String,
        url: String,
    },
    Nothing,
}

/// Raw player API response. Only the fields the share text needs.
#[derive(Debug, Default, Deserialize)]
pub struct PlayerResponse {
    #[serde(default)]
    pub currently_playing_type: Option<String>,
    #[serde(default)]
    pub item: Option<PlayerItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayerItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<PlayerArtist>,
    #[serde(default)]
    pub show: Option<PlayerShow>,
    #[serde(default)]
    pub external_urls: PlayerExternalUrls,
}

#[derive(Debug, Deserialize)]
pub struct PlayerArtist {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayerShow {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayerExternalUrls {
    #[serde(default)]
    pub spotify: String,
}

/// Reduce a player response to the share-worthy facts. Anything that is not
/// a track or an episode counts as nothing playing.
pub fn parse_player_response(response: &PlayerResponse) -> NowPlaying {
    let Some(item) = &response.item else {
        return NowPlaying::Nothing;
    };

    match response.currently_playing_type.as_deref() {
        Some("track") => NowPlaying::Track {
            name: item.name.clone(),
            artists: item
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            url: item.external_urls.spotify.clone(),
        },
        Some("episode") => NowPlaying::Episode {
            name: item.name.clone(),
            show: item
                .show
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            url: item.external_urls.spotify.clone(),
        },
        _ => NowPlaying::Nothing,
    }
}

/// Share text for a playing item, `None` when nothing is playing.
pub fn format_post_text(now_playing: &NowPlaying) -> Option<String> {
    match now_playing {
        NowPlaying::Track { name, artists, url } => Some(format!(
            "{name} / {artists}\n#NowPlaying #PsrPlaying\n{url}"
        )),
        NowPlaying::Episode { name, show, url } => {
            Some(format!("{name} / {show}\n#NowPlaying\n{url}"))
        }
        NowPlaying::Nothing => None,
    }
}

/// Fetches the current player state with a gate-resolved credential.
pub struct NowPlayingService {
    http: reqwest::Client,
    gate: Arc<DispatchGate>,
    api_base: String,
    market: String,
}

impl NowPlayingService {
    pub fn new(gate: Arc<DispatchGate>, http: reqwest::Client, market: String) -> Self {
        Self {
            http,
            gate,
            api_base: "https://api.spotify.com".to_string(),
            market,
        }
    }

    /// Override the player API base (tests).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Fetch the current player state for a user.
    ///
    /// A 401 triggers exactly one forced refresh and retry; the gate deletes
    /// the link if the refresh credential turns out to be revoked.
    pub async fn current(&self, user_id: Uuid) -> Result<NowPlaying> {
        let credential = self
            .gate
            .resolve_credential(user_id, ProviderKind::Spotify)
            .await?;

        let response = self.fetch_player(&credential.access_token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let credential = self
                .gate
                .force_refresh(user_id, ProviderKind::Spotify)
                .await?;
            let retried = self.fetch_player(&credential.access_token).await?;
            return Self::decode_player(retried).await;
        }

        Self::decode_player(response).await
    }

    async fn fetch_player(&self, access_token: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(format!(
                "{}/v1/me/player?market={}",
                self.api_base, self.market
            ))
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(response)
    }

    async fn decode_player(response: reqwest::Response) -> Result<NowPlaying> {
        // 204 means the player is idle.
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(NowPlaying::Nothing);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::ProviderRejected {
                provider: ProviderKind::Spotify,
                detail: format!("player status {status}"),
            });
        }

        let body: PlayerResponse = response.json().await?;
        Ok(parse_player_response(&body))
    }
}

//! Shared fixtures for the integration tests: an in-memory store and
//! adapters pointed at wiremock servers instead of the real providers.
#![allow(dead_code)]

use refrain_auth::{AuthDb, User};
use refrain_core::config::{AppConfig, SpotifySettings, TwitterSettings};
use refrain_core::provider::{Adapters, MisskeyAdapter, SpotifyAdapter, TwitterAdapter};
use std::sync::Arc;

pub fn test_config() -> AppConfig {
    AppConfig {
        base_url: "https://refrain.example".to_string(),
        app_name: "refrain".to_string(),
        market: "JP".to_string(),
        attempt_ttl_minutes: 10,
        session_ttl_days: 7,
        spotify: SpotifySettings {
            client_id: "spotify-client".to_string(),
            client_secret: "spotify-secret".to_string(),
        },
        twitter: TwitterSettings {
            enabled: true,
            client_id: "twitter-client".to_string(),
            client_secret: "twitter-secret".to_string(),
            require_misskey: false,
            allowed_hosts: vec![],
        },
    }
}

/// Adapters with every provider endpoint pointed at `mock_base`.
pub fn mock_adapters(config: Arc<AppConfig>, mock_base: &str) -> Arc<Adapters> {
    let http = reqwest::Client::new();
    Arc::new(Adapters::from_parts(
        SpotifyAdapter::new(config.clone(), http.clone()).with_endpoints(mock_base, mock_base),
        MisskeyAdapter::new(config.clone(), http.clone()),
        TwitterAdapter::new(config, http).with_endpoints(mock_base, mock_base),
    ))
}

pub async fn seeded_user(db: &AuthDb) -> User {
    db.upsert_user("spotify-user", Some("Seed User"), None)
        .await
        .expect("user upsert")
}

/// Pull the `state` query parameter out of an authorization URL.
pub fn state_param(auth_url: &str) -> String {
    let parsed = url::Url::parse(auth_url).expect("auth url parses");
    parsed
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state present")
}

/// Pull the MiAuth session id out of a `{instance}/miauth/{session}?...` URL.
pub fn miauth_session(auth_url: &str) -> String {
    let parsed = url::Url::parse(auth_url).expect("auth url parses");
    parsed
        .path_segments()
        .and_then(|mut segments| segments.nth(1))
        .expect("miauth session segment")
        .to_string()
}

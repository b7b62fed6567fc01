//! Now-playing fetch and posting fan-out against mocked endpoints.

mod common;

use chrono::{Duration, Utc};
use common::{mock_adapters, seeded_user, test_config};
use refrain_auth::{AuthDb, ProviderKind, ProviderLink};
use refrain_core::config::AppConfig;
use refrain_core::gate::DispatchGate;
use refrain_core::nowplaying::{NowPlaying, NowPlayingService};
use refrain_core::post::{PostTarget, Poster};
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    db: AuthDb,
    gate: Arc<DispatchGate>,
    poster: Poster,
    nowplaying: Arc<NowPlayingService>,
}

async fn fixture(config: AppConfig, server: &MockServer) -> Fixture {
    let db = AuthDb::open_in_memory().await.unwrap();
    let config = Arc::new(config);
    let gate = Arc::new(DispatchGate::new(
        db.clone(),
        mock_adapters(config.clone(), &server.uri()),
        config,
    ));
    let nowplaying = Arc::new(
        NowPlayingService::new(gate.clone(), reqwest::Client::new(), "JP".to_string())
            .with_api_base(&server.uri()),
    );
    let poster = Poster::new(gate.clone(), nowplaying.clone(), reqwest::Client::new())
        .with_twitter_api_base(&server.uri());
    Fixture {
        db,
        gate,
        poster,
        nowplaying,
    }
}

fn live_link(user_id: Uuid, provider: ProviderKind, access: &str) -> ProviderLink {
    let now = Utc::now();
    ProviderLink {
        user_id,
        provider,
        external_id: "ext".to_string(),
        username: None,
        avatar_url: None,
        access_token: access.to_string(),
        refresh_token: Some("refresh-1".to_string()),
        expires_at: Some(now + Duration::hours(1)),
        instance_url: None,
        created_at: now,
        updated_at: now,
    }
}

fn track_body() -> serde_json::Value {
    serde_json::json!({
        "currently_playing_type": "track",
        "item": {
            "name": "Song",
            "artists": [{"name": "Artist"}],
            "external_urls": {"spotify": "https://open.spotify.com/track/abc"}
        }
    })
}

#[tokio::test]
async fn player_401_forces_one_refresh_and_retries() {
    let server = MockServer::start().await;

    // The stored token is rejected, the refreshed one works.
    Mock::given(method("GET"))
        .and(path("/v1/me/player"))
        .and(header("authorization", "Bearer stale-token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/me/player"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_body()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-token",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let f = fixture(test_config(), &server).await;
    let user = seeded_user(&f.db).await;
    // Not expired by the store's clock, but the provider disagrees.
    f.db.put_link(&live_link(user.id, ProviderKind::Spotify, "stale-token"))
        .await
        .unwrap();

    let playing = f.nowplaying.current(user.id).await.unwrap();
    assert!(matches!(playing, NowPlaying::Track { .. }));

    let stored = f
        .db
        .get_link(user.id, ProviderKind::Spotify)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token, "fresh-token");
}

#[tokio::test]
async fn fan_out_is_independent_per_target() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/me/player"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_body()))
        .mount(&server)
        .await;
    // Misskey accepts the note; Twitter is down.
    Mock::given(method("POST"))
        .and(path("/api/notes/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let f = fixture(test_config(), &server).await;
    let user = seeded_user(&f.db).await;
    f.db.put_link(&live_link(user.id, ProviderKind::Spotify, "spotify-token"))
        .await
        .unwrap();

    let mut misskey = live_link(user.id, ProviderKind::Misskey, "miauth-token");
    misskey.refresh_token = None;
    misskey.expires_at = None;
    misskey.instance_url = Some(server.uri());
    f.db.put_link(&misskey).await.unwrap();

    f.db.put_link(&live_link(user.id, ProviderKind::Twitter, "twitter-token"))
        .await
        .unwrap();

    let outcome = f
        .poster
        .post_now_playing(user.id, PostTarget::Both)
        .await
        .unwrap();

    assert!(outcome.success, "one target succeeding is success");
    assert_eq!(outcome.results.get("misskey").unwrap(), "success");
    assert!(outcome.results.get("twitter").unwrap().starts_with("error"));
    assert_eq!(
        outcome.message.as_deref(),
        Some("Song / Artist\n#NowPlaying #PsrPlaying\nhttps://open.spotify.com/track/abc")
    );
}

#[tokio::test]
async fn nothing_playing_posts_nowhere() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/me/player"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let f = fixture(test_config(), &server).await;
    let user = seeded_user(&f.db).await;
    f.db.put_link(&live_link(user.id, ProviderKind::Spotify, "spotify-token"))
        .await
        .unwrap();

    let outcome = f
        .poster
        .post_now_playing(user.id, PostTarget::Both)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.message.as_deref(), Some("nothing is playing"));
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn unconnected_targets_report_not_connected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/me/player"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_body()))
        .mount(&server)
        .await;

    let f = fixture(test_config(), &server).await;
    let user = seeded_user(&f.db).await;
    f.db.put_link(&live_link(user.id, ProviderKind::Spotify, "spotify-token"))
        .await
        .unwrap();

    let outcome = f
        .poster
        .post_now_playing(user.id, PostTarget::Both)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.results.get("misskey").unwrap(), "not connected");
    assert_eq!(outcome.results.get("twitter").unwrap(), "not connected");
}

#[tokio::test]
async fn blocked_eligibility_stops_a_twitter_post_before_resolving() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/me/player"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_body()))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.twitter.require_misskey = true;

    let f = fixture(config, &server).await;
    let user = seeded_user(&f.db).await;
    f.db.put_link(&live_link(user.id, ProviderKind::Spotify, "spotify-token"))
        .await
        .unwrap();
    // Twitter is linked, but the rule requires Misskey too.
    f.db.put_link(&live_link(user.id, ProviderKind::Twitter, "twitter-token"))
        .await
        .unwrap();

    let outcome = f
        .poster
        .post_now_playing(user.id, PostTarget::Twitter)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.results.get("twitter").unwrap(),
        "blocked: Misskey connection required"
    );
    assert!(!outcome.results.contains_key("misskey"));

    // Eligibility blocked the post before any credential was resolved, so
    // the link itself is untouched.
    assert!(
        f.gate
            .resolve_credential(user.id, ProviderKind::Twitter)
            .await
            .is_ok()
    );
}

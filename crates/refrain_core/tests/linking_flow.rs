//! End-to-end linking flows against mocked provider endpoints.

mod common;

use chrono::{Duration, Utc};
use common::{miauth_session, mock_adapters, seeded_user, state_param, test_config};
use refrain_auth::{AuthDb, LinkAttempt, ProviderKind};
use refrain_core::config::AppConfig;
use refrain_core::error::CoreError;
use refrain_core::linking::LinkingOrchestrator;
use refrain_core::provider::CallbackParams;
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn orchestrator(db: &AuthDb, config: AppConfig, mock_base: &str) -> LinkingOrchestrator {
    let config = Arc::new(config);
    LinkingOrchestrator::new(
        db.clone(),
        mock_adapters(config.clone(), mock_base),
        config,
    )
}

async fn mount_miauth_approval(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/api/miauth/[^/]+/check$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "token": "miauth-token",
            "user": {"id": "mk-1", "username": "tester"}
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/i"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "mk-1",
            "username": "tester",
            "name": "Tester",
            "avatarUrl": "https://cdn.example/avatar.png"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn misskey_link_flow_creates_link_and_consumes_state() {
    let server = MockServer::start().await;
    mount_miauth_approval(&server).await;

    let db = AuthDb::open_in_memory().await.unwrap();
    let user = seeded_user(&db).await;

    let mut config = test_config();
    config.twitter.require_misskey = true;
    let orchestrator = orchestrator(&db, config, &server.uri());

    let auth_url = orchestrator
        .start_link(Some(&user), ProviderKind::Misskey, Some(&server.uri()))
        .await
        .unwrap();
    assert!(auth_url.starts_with(&format!("{}/miauth/", server.uri())));

    let session = miauth_session(&auth_url);
    let outcome = orchestrator
        .complete_link(ProviderKind::Misskey, &session, &CallbackParams::default())
        .await
        .unwrap();
    assert_eq!(outcome.user.id, user.id);
    assert_eq!(outcome.username.as_deref(), Some("tester"));

    let link = db
        .get_link(user.id, ProviderKind::Misskey)
        .await
        .unwrap()
        .expect("link stored");
    assert_eq!(link.access_token, "miauth-token");
    assert!(link.refresh_token.is_none());
    assert!(link.expires_at.is_none());

    // The mock server's host:port is the instance host.
    let expected_host = server.uri().trim_start_matches("http://").to_string();
    assert_eq!(link.instance_host().as_deref(), Some(expected_host.as_str()));

    // A second completion with the same state is a replay.
    let replay = orchestrator
        .complete_link(ProviderKind::Misskey, &session, &CallbackParams::default())
        .await;
    assert!(matches!(replay, Err(CoreError::HandshakeExpired)));
}

#[tokio::test]
async fn expired_attempt_fails_and_creates_no_link() {
    let server = MockServer::start().await;
    mount_miauth_approval(&server).await;

    let db = AuthDb::open_in_memory().await.unwrap();
    let user = seeded_user(&db).await;
    let orchestrator = orchestrator(&db, test_config(), &server.uri());

    // Handshake started 11 minutes ago with a 10 minute TTL.
    let started = Utc::now() - Duration::minutes(11);
    db.put_attempt(&LinkAttempt {
        state: "stale-session".to_string(),
        user_id: Some(user.id),
        provider: ProviderKind::Misskey,
        pkce_verifier: None,
        instance_url: Some(server.uri()),
        created_at: started,
        expires_at: started + Duration::minutes(10),
    })
    .await
    .unwrap();

    let result = orchestrator
        .complete_link(
            ProviderKind::Misskey,
            "stale-session",
            &CallbackParams::default(),
        )
        .await;
    assert!(matches!(result, Err(CoreError::HandshakeExpired)));
    assert!(
        db.get_link(user.id, ProviderKind::Misskey)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn spotify_login_creates_user_and_anchored_link() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "spotify-access",
            "refresh_token": "spotify-refresh",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "spo-42",
            "display_name": "Listener",
            "images": [{"url": "https://i.scdn.co/image/a"}]
        })))
        .mount(&server)
        .await;

    let db = AuthDb::open_in_memory().await.unwrap();
    let orchestrator = orchestrator(&db, test_config(), &server.uri());

    // Login flow: no user exists yet.
    let auth_url = orchestrator
        .start_link(None, ProviderKind::Spotify, None)
        .await
        .unwrap();
    let state = state_param(&auth_url);

    let outcome = orchestrator
        .complete_link(
            ProviderKind::Spotify,
            &state,
            &CallbackParams {
                code: Some("auth-code".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.user.spotify_user_id, "spo-42");
    assert_eq!(outcome.user.display_name.as_deref(), Some("Listener"));

    let link = db
        .get_link(outcome.user.id, ProviderKind::Spotify)
        .await
        .unwrap()
        .expect("anchor link stored");
    assert_eq!(link.access_token, "spotify-access");
    assert_eq!(link.refresh_token.as_deref(), Some("spotify-refresh"));
    assert!(!link.is_expired());

    // Relinking the anchor while linked is refused.
    let relink = orchestrator
        .start_link(Some(&outcome.user), ProviderKind::Spotify, None)
        .await;
    assert!(matches!(relink, Err(CoreError::AlreadyLinked { .. })));
}

#[tokio::test]
async fn callback_for_wrong_provider_is_a_state_mismatch() {
    let server = MockServer::start().await;
    let db = AuthDb::open_in_memory().await.unwrap();
    let user = seeded_user(&db).await;
    let orchestrator = orchestrator(&db, test_config(), &server.uri());

    let auth_url = orchestrator
        .start_link(Some(&user), ProviderKind::Misskey, Some(&server.uri()))
        .await
        .unwrap();
    let session = miauth_session(&auth_url);

    let result = orchestrator
        .complete_link(ProviderKind::Twitter, &session, &CallbackParams::default())
        .await;
    assert!(matches!(result, Err(CoreError::StateMismatch)));
}

#[tokio::test]
async fn unlink_rules() {
    let server = MockServer::start().await;
    mount_miauth_approval(&server).await;

    let db = AuthDb::open_in_memory().await.unwrap();
    let user = seeded_user(&db).await;

    let mut config = test_config();
    config.twitter.require_misskey = true;
    let orchestrator = orchestrator(&db, config, &server.uri());

    // Spotify anchors the account.
    let result = orchestrator.unlink(user.id, ProviderKind::Spotify).await;
    assert!(matches!(result, Err(CoreError::AnchorUnlink { .. })));

    // Link then unlink Misskey.
    let auth_url = orchestrator
        .start_link(Some(&user), ProviderKind::Misskey, Some(&server.uri()))
        .await
        .unwrap();
    let session = miauth_session(&auth_url);
    orchestrator
        .complete_link(ProviderKind::Misskey, &session, &CallbackParams::default())
        .await
        .unwrap();

    orchestrator
        .unlink(user.id, ProviderKind::Misskey)
        .await
        .unwrap();
    assert!(
        db.get_link(user.id, ProviderKind::Misskey)
            .await
            .unwrap()
            .is_none()
    );

    // Unlinking again is a no-op.
    orchestrator
        .unlink(user.id, ProviderKind::Misskey)
        .await
        .unwrap();
}

#[tokio::test]
async fn twitter_start_requires_eligibility() {
    let server = MockServer::start().await;
    let db = AuthDb::open_in_memory().await.unwrap();
    let user = seeded_user(&db).await;

    let mut config = test_config();
    config.twitter.require_misskey = true;
    let orchestrator = orchestrator(&db, config, &server.uri());

    let result = orchestrator
        .start_link(Some(&user), ProviderKind::Twitter, None)
        .await;
    match result {
        Err(CoreError::NotEligible { reason, .. }) => {
            assert_eq!(reason, "Misskey connection required");
        }
        other => panic!("expected NotEligible, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_instance_host_rejected_before_any_attempt() {
    let server = MockServer::start().await;
    let db = AuthDb::open_in_memory().await.unwrap();
    let user = seeded_user(&db).await;
    let orchestrator = orchestrator(&db, test_config(), &server.uri());

    for bad in ["", "misskey.io/notes", "https://a b"] {
        let result = orchestrator
            .start_link(Some(&user), ProviderKind::Misskey, Some(bad))
            .await;
        assert!(
            matches!(result, Err(CoreError::InvalidInstance { .. })),
            "expected InvalidInstance for {bad:?}"
        );
    }
}

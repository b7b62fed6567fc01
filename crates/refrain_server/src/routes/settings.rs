//! User info, API token settings, and app config.

use axum::Json;
use axum::extract::State;
use refrain_auth::{ProviderKind, generate_token, hash_token};
use refrain_core::config::Eligibility;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ServerResult;
use crate::extract::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub id: String,
    pub spotify_user_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_image_url: Option<String>,

    pub misskey_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub misskey_instance_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub misskey_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub misskey_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub misskey_avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub misskey_host: Option<String>,

    pub twitter_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_avatar_url: Option<String>,

    pub api_url_token: String,
    pub api_header_token_enabled: bool,
}

/// GET /api/me
///
/// Connected flags are derived from stored links, never tracked
/// separately: a deleted credential disappears from this response on the
/// next query.
pub async fn user_info(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ServerResult<Json<UserInfoResponse>> {
    let links = state.db.list_links(user.id).await?;
    let misskey = links.iter().find(|l| l.provider == ProviderKind::Misskey);
    let twitter = links.iter().find(|l| l.provider == ProviderKind::Twitter);

    Ok(Json(UserInfoResponse {
        id: user.id.to_string(),
        spotify_user_id: user.spotify_user_id,
        spotify_display_name: user.display_name,
        spotify_image_url: user.avatar_url,

        misskey_connected: misskey.is_some(),
        misskey_instance_url: misskey.and_then(|l| l.instance_url.clone()),
        misskey_user_id: misskey.map(|l| l.external_id.clone()),
        misskey_username: misskey.and_then(|l| l.username.clone()),
        misskey_avatar_url: misskey.and_then(|l| l.avatar_url.clone()),
        misskey_host: misskey.and_then(|l| l.instance_host()),

        twitter_connected: twitter.is_some(),
        twitter_user_id: twitter.map(|l| l.external_id.clone()),
        twitter_username: twitter.and_then(|l| l.username.clone()),
        twitter_avatar_url: twitter.and_then(|l| l.avatar_url.clone()),

        api_url_token: user.api_url_token.to_string(),
        api_header_token_enabled: user.api_header_token_enabled,
    }))
}

#[derive(Debug, Serialize)]
pub struct AppConfigResponse {
    pub twitter_available: bool,
    pub twitter_eligibility: Eligibility,
}

/// GET /api/config
pub async fn app_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ServerResult<Json<AppConfigResponse>> {
    let report = state.gate.eligibility(user.id).await?;

    Ok(Json(AppConfigResponse {
        twitter_available: state.config.twitter.is_available(),
        twitter_eligibility: report.twitter,
    }))
}

#[derive(Debug, Serialize)]
pub struct HeaderTokenResponse {
    pub token: String,
    pub message: String,
}

/// POST /api/settings/header-token
///
/// The plaintext token is returned exactly once; only its hash is stored.
pub async fn generate_header_token(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ServerResult<Json<HeaderTokenResponse>> {
    let token = generate_token(32);
    state
        .db
        .set_api_header_token(user.id, &hash_token(&token))
        .await?;

    Ok(Json(HeaderTokenResponse {
        token,
        message: "Token generated successfully. Save this token - it will not be shown again."
            .to_string(),
    }))
}

/// DELETE /api/settings/header-token
pub async fn disable_header_token(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ServerResult<Json<Value>> {
    state.db.disable_api_header_token(user.id).await?;
    Ok(Json(json!({ "message": "header token disabled" })))
}

/// POST /api/settings/api-url-token/regenerate
pub async fn regenerate_api_url_token(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ServerResult<Json<Value>> {
    let new_token = state.db.regenerate_api_url_token(user.id).await?;
    Ok(Json(json!({ "api_url_token": new_token.to_string() })))
}

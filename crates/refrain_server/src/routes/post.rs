//! API-token-authenticated posting endpoint.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use refrain_auth::ProviderKind;
use refrain_core::CoreError;
use refrain_core::post::{PostTarget, verify_header_token};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    pub target: Option<String>,
}

fn failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "success": false, "message": message })),
    )
        .into_response()
}

/// GET /api/post/:token
///
/// Authenticated by the URL token, plus the header token when the user has
/// enabled it. No browser session is involved.
pub async fn post_now_playing(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<PostQuery>,
    headers: HeaderMap,
) -> Response {
    let Ok(api_token) = Uuid::parse_str(&token) else {
        return failure(StatusCode::BAD_REQUEST, "invalid token");
    };

    let user = match state.db.get_user_by_api_url_token(api_token).await {
        Ok(Some(user)) => user,
        Ok(None) => return failure(StatusCode::NOT_FOUND, "token not found"),
        Err(error) => return ServerError::from(error).into_response(),
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if verify_header_token(&user, authorization).is_err() {
        return failure(StatusCode::UNAUTHORIZED, "invalid token");
    }

    let target = PostTarget::parse(query.target.as_deref());

    match state.poster.post_now_playing(user.id, target).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(CoreError::NotConnected {
            provider: ProviderKind::Spotify,
        }) => failure(StatusCode::BAD_REQUEST, "spotify not connected"),
        Err(error) => ServerError::from(error).into_response(),
    }
}

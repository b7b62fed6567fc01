//! Spotify login, session check, and logout.

use axum::Json;
use axum::extract::{Query, State};
use axum::response::Redirect;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use refrain_auth::ProviderKind;
use refrain_core::provider::CallbackParams;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{ServerResult, error_indicator};
use crate::extract::SESSION_COOKIE;
use crate::state::AppState;

/// GET /api/auth/spotify
///
/// With no session this is the login flow. A user who is already logged in
/// (and therefore linked) gets `AlreadyLinked` instead of a second
/// handshake for the anchor provider.
pub async fn login_spotify(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ServerResult<Redirect> {
    let user = match jar.get(SESSION_COOKIE) {
        Some(cookie) => state.sessions.authenticate(cookie.value()).await.ok(),
        None => None,
    };

    let auth_url = state
        .linking
        .start_link(user.as_ref(), ProviderKind::Spotify, None)
        .await?;
    Ok(Redirect::to(&auth_url))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /api/auth/spotify/callback
pub async fn spotify_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<OAuthCallbackQuery>,
) -> (CookieJar, Redirect) {
    if query.error.is_some() {
        return (jar, Redirect::to("/login?error=spotify_auth_denied"));
    }
    let Some(callback_state) = query.state else {
        return (jar, Redirect::to("/login?error=missing_params"));
    };
    if query.code.is_none() {
        return (jar, Redirect::to("/login?error=missing_code"));
    }

    let outcome = match state
        .linking
        .complete_link(
            ProviderKind::Spotify,
            &callback_state,
            &CallbackParams { code: query.code },
        )
        .await
    {
        Ok(outcome) => outcome,
        Err(error) => {
            return (
                jar,
                Redirect::to(&format!("/login?error={}", error_indicator(&error))),
            );
        }
    };

    match state.sessions.create(&outcome.user).await {
        Ok(token) => {
            let cookie = session_cookie(token);
            (jar.add(cookie), Redirect::to("/dashboard"))
        }
        Err(error) => {
            tracing::error!(%error, "session creation failed after login");
            (jar, Redirect::to("/login?error=session_failed"))
        }
    }
}

fn session_cookie(token: String) -> Cookie<'static> {
    // Server-side expiry governs the session lifetime; the cookie itself
    // carries no claims and no max-age.
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(std::env::var("ENV").as_deref() == Ok("production"))
        .build()
}

/// GET /api/auth/check
pub async fn check(State(state): State<AppState>, jar: CookieJar) -> Json<Value> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Json(json!({ "authenticated": false }));
    };

    match state.sessions.authenticate(cookie.value()).await {
        Ok(user) => Json(json!({
            "authenticated": true,
            "user_id": user.id.to_string(),
            "spotify_user_id": user.spotify_user_id,
        })),
        Err(_) => Json(json!({ "authenticated": false })),
    }
}

/// POST /api/logout
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ServerResult<(CookieJar, Json<Value>)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.invalidate(cookie.value()).await?;
    }

    let removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    Ok((jar.remove(removal), Json(json!({ "message": "logged out" }))))
}

//! Route table.

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod auth;
pub mod miauth;
pub mod post;
pub mod settings;
pub mod status;
pub mod twitter;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status::status))
        // Public auth routes
        .route("/api/auth/spotify", get(auth::login_spotify))
        .route("/api/auth/spotify/callback", get(auth::spotify_callback))
        .route("/api/auth/check", get(auth::check))
        .route("/api/logout", post(auth::logout))
        // Public API post route (authenticated by URL token + optional header token)
        .route("/api/post/:token", get(post::post_now_playing))
        // Provider callbacks (no session required; matched by handshake state)
        .route("/api/miauth/callback", get(miauth::callback))
        .route("/api/twitter/callback", get(twitter::callback))
        // Session-authenticated routes
        .route("/api/me", get(settings::user_info))
        .route("/api/config", get(settings::app_config))
        .route("/api/miauth/start", post(miauth::start))
        .route("/api/miauth", delete(miauth::disconnect))
        .route("/api/twitter/start", get(twitter::start))
        .route("/api/twitter", delete(twitter::disconnect))
        .route(
            "/api/settings/header-token",
            post(settings::generate_header_token).delete(settings::disable_header_token),
        )
        .route(
            "/api/settings/api-url-token/regenerate",
            post(settings::regenerate_api_url_token),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

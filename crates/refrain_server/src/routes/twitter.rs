//! Twitter connect, callback, and disconnect.

use axum::Json;
use axum::extract::{Query, State};
use axum::response::Redirect;
use refrain_auth::ProviderKind;
use refrain_core::provider::CallbackParams;
use serde_json::{Value, json};

use crate::error::{ServerResult, error_indicator};
use crate::extract::CurrentUser;
use crate::routes::auth::OAuthCallbackQuery;
use crate::state::AppState;

/// GET /api/twitter/start
///
/// Eligibility (availability, the Misskey requirement, the host allowlist)
/// is enforced before any handshake state is created; an ineligible user
/// gets a 403, not a provider redirect.
pub async fn start(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ServerResult<Redirect> {
    let auth_url = state
        .linking
        .start_link(Some(&user), ProviderKind::Twitter, None)
        .await?;
    Ok(Redirect::to(&auth_url))
}

/// GET /api/twitter/callback
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Redirect {
    if query.error.is_some() {
        return Redirect::to("/dashboard?error=twitter_auth_denied");
    }
    let Some(callback_state) = query.state else {
        return Redirect::to("/dashboard?error=missing_params");
    };
    if query.code.is_none() {
        return Redirect::to("/dashboard?error=missing_params");
    }

    match state
        .linking
        .complete_link(
            ProviderKind::Twitter,
            &callback_state,
            &CallbackParams { code: query.code },
        )
        .await
    {
        Ok(_) => Redirect::to("/dashboard?success=twitter_connected"),
        Err(error) => {
            Redirect::to(&format!("/dashboard?error={}", error_indicator(&error)))
        }
    }
}

/// DELETE /api/twitter
pub async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ServerResult<Json<Value>> {
    state.linking.unlink(user.id, ProviderKind::Twitter).await?;
    Ok(Json(json!({ "message": "twitter disconnected" })))
}

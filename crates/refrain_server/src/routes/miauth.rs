//! Misskey (MiAuth) connect, callback, and disconnect.

use axum::Json;
use axum::extract::{Query, State};
use axum::response::Redirect;
use refrain_auth::ProviderKind;
use refrain_core::provider::CallbackParams;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ServerResult, error_indicator};
use crate::extract::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MiAuthStartRequest {
    pub instance_url: String,
}

#[derive(Debug, Serialize)]
pub struct MiAuthStartResponse {
    pub auth_url: String,
}

/// POST /api/miauth/start
pub async fn start(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<MiAuthStartRequest>,
) -> ServerResult<Json<MiAuthStartResponse>> {
    let auth_url = state
        .linking
        .start_link(
            Some(&user),
            ProviderKind::Misskey,
            Some(&request.instance_url),
        )
        .await?;

    Ok(Json(MiAuthStartResponse { auth_url }))
}

#[derive(Debug, Deserialize)]
pub struct MiAuthCallbackQuery {
    pub session: Option<String>,
}

/// GET /api/miauth/callback
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<MiAuthCallbackQuery>,
) -> Redirect {
    let Some(session) = query.session else {
        return Redirect::to("/dashboard?error=missing_session");
    };

    match state
        .linking
        .complete_link(ProviderKind::Misskey, &session, &CallbackParams::default())
        .await
    {
        Ok(_) => Redirect::to("/dashboard?success=misskey_connected"),
        Err(error) => {
            Redirect::to(&format!("/dashboard?error={}", error_indicator(&error)))
        }
    }
}

/// DELETE /api/miauth
pub async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ServerResult<Json<Value>> {
    state.linking.unlink(user.id, ProviderKind::Misskey).await?;
    Ok(Json(json!({ "message": "misskey disconnected" })))
}

//! Request extractors.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::CookieJar;
use refrain_auth::User;
use refrain_core::CoreError;

use crate::error::ServerError;
use crate::state::AppState;

/// Name of the browser session cookie.
pub const SESSION_COOKIE: &str = "session_token";

/// The authenticated user, resolved from the session cookie through the
/// session store. Rejects with 401 when no valid session accompanies the
/// request.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or(CoreError::Unauthenticated)?;

        let user = state.sessions.authenticate(&token).await?;
        Ok(CurrentUser(user))
    }
}

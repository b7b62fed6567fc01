//! Error-to-response mapping for the HTTP boundary.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use miette::Diagnostic;
use refrain_core::CoreError;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error, Diagnostic)]
pub enum ServerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Auth(#[from] refrain_auth::AuthError),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        let ServerError::Core(core) = self else {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            );
        };

        match core {
            CoreError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            CoreError::InvalidInstance { .. }
            | CoreError::HandshakeExpired
            | CoreError::StateMismatch
            | CoreError::NotConnected { .. } => (StatusCode::BAD_REQUEST, core.to_string()),
            CoreError::NotEligible { .. } | CoreError::AnchorUnlink { .. } => {
                (StatusCode::FORBIDDEN, core.to_string())
            }
            CoreError::AlreadyLinked { .. } => (StatusCode::CONFLICT, core.to_string()),
            // Provider-side failures: the detail stays in the logs.
            CoreError::ProviderRejected { provider, .. }
            | CoreError::RefreshRevoked { provider } => (
                StatusCode::BAD_GATEWAY,
                format!("{provider} request failed"),
            ),
            CoreError::Config(_) | CoreError::Auth(_) | CoreError::Transport(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Short indicator for `?error=` redirect query strings on the callback
/// routes, where a JSON body would never be seen.
pub fn error_indicator(error: &CoreError) -> &'static str {
    match error {
        CoreError::HandshakeExpired => "handshake_expired",
        CoreError::StateMismatch => "state_mismatch",
        CoreError::InvalidInstance { .. } => "invalid_instance",
        CoreError::ProviderRejected { .. } => "provider_rejected",
        CoreError::Unauthenticated => "unauthorized",
        CoreError::AlreadyLinked { .. } => "already_linked",
        CoreError::NotEligible { .. } => "not_eligible",
        _ => "internal_error",
    }
}

//! The linking engine's error taxonomy.
//!
//! Provider/network failures are converted into these kinds at the
//! orchestrator and gate boundaries; raw provider error bodies are logged
//! but never surfaced to callers.

use miette::Diagnostic;
use refrain_auth::{AuthError, ProviderKind};
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error, Diagnostic)]
pub enum CoreError {
    /// The user-supplied instance host is malformed or unusable.
    #[error("Invalid instance host {host:?}: {reason}")]
    #[diagnostic(
        code(refrain_core::invalid_instance),
        help("Enter a plain hostname such as misskey.io")
    )]
    InvalidInstance { host: String, reason: String },

    /// The callback does not match the handshake it claims to complete.
    #[error("Handshake state does not match this linking attempt")]
    #[diagnostic(code(refrain_core::state_mismatch))]
    StateMismatch,

    /// The handshake attempt expired, was never started, or was already
    /// completed once.
    #[error("Handshake expired or already used")]
    #[diagnostic(
        code(refrain_core::handshake_expired),
        help("Restart the connection from the dashboard")
    )]
    HandshakeExpired,

    /// The provider's endpoint returned an error.
    #[error("{provider} rejected the request: {detail}")]
    #[diagnostic(code(refrain_core::provider_rejected))]
    ProviderRejected {
        provider: ProviderKind,
        detail: String,
    },

    /// The provider reported the refresh credential invalid. Handled
    /// locally by deleting the link; callers see `NotConnected` afterwards.
    #[error("{provider} reported the refresh credential as revoked")]
    #[diagnostic(code(refrain_core::refresh_revoked))]
    RefreshRevoked { provider: ProviderKind },

    /// No usable credential is stored for this provider.
    #[error("{provider} is not connected")]
    #[diagnostic(code(refrain_core::not_connected))]
    NotConnected { provider: ProviderKind },

    /// No valid session or API token accompanied the request.
    #[error("Unauthenticated")]
    #[diagnostic(code(refrain_core::unauthenticated))]
    Unauthenticated,

    /// Relinking a provider that anchors the account.
    #[error("{provider} is already linked to this account")]
    #[diagnostic(code(refrain_core::already_linked))]
    AlreadyLinked { provider: ProviderKind },

    /// Unlinking the provider that anchors the account.
    #[error("{provider} anchors this account and cannot be disconnected")]
    #[diagnostic(code(refrain_core::anchor_unlink))]
    AnchorUnlink { provider: ProviderKind },

    /// The eligibility rules forbid using this provider right now.
    #[error("{provider} is not available: {reason}")]
    #[diagnostic(code(refrain_core::not_eligible))]
    NotEligible {
        provider: ProviderKind,
        reason: String,
    },

    /// A required configuration value is missing or malformed.
    #[error("Configuration error: {0}")]
    #[diagnostic(code(refrain_core::config))]
    Config(String),

    /// Storage-layer error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Auth(#[from] AuthError),

    /// HTTP transport failure talking to a provider.
    #[error("Transport error: {0}")]
    #[diagnostic(code(refrain_core::transport))]
    Transport(#[from] reqwest::Error),
}

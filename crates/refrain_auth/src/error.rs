//! Error types for refrain_auth.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for auth storage operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur in auth storage operations.
#[derive(Debug, Error, Diagnostic)]
pub enum AuthError {
    /// Database error from sqlx.
    #[error("Database error: {0}")]
    #[diagnostic(code(refrain_auth::database))]
    Database(#[from] sqlx::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    #[diagnostic(code(refrain_auth::migration))]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// IO error.
    #[error("IO error: {0}")]
    #[diagnostic(code(refrain_auth::io))]
    Io(#[from] std::io::Error),

    /// Encryption key has the wrong length.
    #[error("Encryption key must be exactly 32 bytes (256 bits)")]
    #[diagnostic(code(refrain_auth::invalid_key))]
    InvalidKey,

    /// Sealing a credential for storage failed.
    #[error("Failed to encrypt credential for storage")]
    #[diagnostic(code(refrain_auth::encrypt))]
    Encrypt,

    /// A stored credential could not be decrypted.
    #[error("Failed to decrypt stored credential")]
    #[diagnostic(
        code(refrain_auth::decrypt),
        help("The encryption key may have changed since this credential was stored")
    )]
    Decrypt,

    /// A stored id column did not parse as a UUID.
    #[error("Invalid id in database: {0}")]
    #[diagnostic(code(refrain_auth::invalid_id))]
    InvalidId(String),

    /// A stored provider column held an unknown value.
    #[error("Unknown provider kind: {0}")]
    #[diagnostic(code(refrain_auth::unknown_provider))]
    UnknownProvider(String),
}

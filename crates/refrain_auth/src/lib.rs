//! refrain-auth - credential and session storage for refrain.
//!
//! This crate owns the durable state of the linking engine:
//! - users, anchored by their Spotify account
//! - per-provider credential links (a link exists iff a usable credential
//!   is stored for it)
//! - in-flight handshake attempts, consumed exactly once by their callback
//! - browser sessions and the API posting/header tokens
//!
//! Everything here is pure data access over SQLite; provider network calls
//! live in refrain-core. Credentials are sealed with AES-256-GCM before
//! storage when a [`TokenCipher`] is configured.

pub mod attempts;
pub mod crypto;
pub mod db;
pub mod error;
pub mod links;
pub mod sessions;
pub mod users;

pub use attempts::LinkAttempt;
pub use crypto::{TokenCipher, generate_token, hash_token};
pub use db::AuthDb;
pub use error::{AuthError, AuthResult};
pub use links::{ProviderKind, ProviderLink};
pub use users::User;

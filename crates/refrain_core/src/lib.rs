//! refrain-core - the multi-provider linking engine.
//!
//! Connects a Spotify-anchored user to Misskey and Twitter posting
//! identities and decides, per request, which destinations are usable and
//! with what credential:
//!
//! - [`provider`] - one adapter per OAuth variant behind a single trait
//! - [`linking`] - the connect/disconnect lifecycle
//! - [`session`] - opaque browser sessions
//! - [`gate`] - eligibility rules and refresh-on-use credential resolution
//! - [`nowplaying`] / [`post`] - the player fetch and posting fan-out

pub mod config;
pub mod error;
pub mod gate;
pub mod linking;
pub mod nowplaying;
pub mod post;
pub mod provider;
pub mod session;

pub use config::AppConfig;
pub use error::{CoreError, Result};
pub use gate::{DispatchGate, ResolvedCredential};
pub use linking::{LinkOutcome, LinkingOrchestrator};
pub use session::SessionManager;

/// Shared HTTP client for provider calls.
pub fn refrain_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("refrain/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(10))
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()
        // panics for the same reasons Client::new() would
        .expect("failed to construct HTTP client")
}

//! Application configuration, loaded from environment variables.

use refrain_auth::ProviderLink;
use serde::Serialize;

use crate::error::{CoreError, Result};

/// Top-level configuration for the linking engine.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Public origin of this service, used to build OAuth callback URLs.
    pub base_url: String,
    /// Name shown on provider consent screens.
    pub app_name: String,
    /// Market parameter for the Spotify player API.
    pub market: String,
    /// How long a started handshake stays completable.
    pub attempt_ttl_minutes: i64,
    /// Browser session lifetime.
    pub session_ttl_days: i64,
    pub spotify: SpotifySettings,
    pub twitter: TwitterSettings,
}

#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
}

/// Twitter integration settings, including the eligibility rules.
#[derive(Debug, Clone, Default)]
pub struct TwitterSettings {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    /// When set, connecting Twitter requires a linked Misskey instance.
    pub require_misskey: bool,
    /// Misskey hosts allowed to unlock Twitter. Empty means any host.
    pub allowed_hosts: Vec<String>,
}

/// Whether an optional provider may currently be used, and why not.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Eligibility {
    pub fn allowed() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reason: Some(reason.into()),
        }
    }
}

impl TwitterSettings {
    /// Whether the integration is usable at all (enabled and credentialed).
    pub fn is_available(&self) -> bool {
        self.enabled && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Compute the eligibility of Twitter for a user, given their current
    /// Misskey link (if any). Pure; recomputed on every query.
    pub fn check_eligibility(&self, misskey_link: Option<&ProviderLink>) -> Eligibility {
        if !self.enabled {
            return Eligibility::blocked("Twitter integration is disabled");
        }
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Eligibility::blocked("Twitter API credentials not configured");
        }

        if self.require_misskey {
            let Some(link) = misskey_link else {
                return Eligibility::blocked("Misskey connection required");
            };

            if !self.allowed_hosts.is_empty() {
                let host = link
                    .instance_host()
                    .map(|h| h.to_lowercase())
                    .unwrap_or_default();
                if !self.allowed_hosts.iter().any(|allowed| *allowed == host) {
                    return Eligibility::blocked(
                        "Your Misskey instance is not in the allowed list",
                    );
                }
            }
        }

        Eligibility::allowed()
    }
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// Fails fast on missing required variables, matching the boot-time
    /// validation the server performs before binding a port.
    pub fn from_env() -> Result<Self> {
        let base_url = required("BASE_URL")?;
        let spotify = SpotifySettings {
            client_id: required("SPOTIFY_CLIENT_ID")?,
            client_secret: required("SPOTIFY_CLIENT_SECRET")?,
        };

        let twitter = TwitterSettings {
            enabled: env_or("TWITTER_ENABLED", "true") != "false",
            client_id: env_or("TWITTER_CLIENT_ID", ""),
            client_secret: env_or("TWITTER_CLIENT_SECRET", ""),
            require_misskey: env_or("TWITTER_REQUIRE_MISSKEY", "false") == "true",
            allowed_hosts: parse_host_list(&env_or("TWITTER_ALLOWED_HOSTS", "")),
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            app_name: env_or("APP_NAME", "refrain"),
            market: env_or("SPOTIFY_MARKET", "JP"),
            attempt_ttl_minutes: parse_i64("LINK_ATTEMPT_TTL_MINUTES", 10)?,
            session_ttl_days: parse_i64("SESSION_TTL_DAYS", 7)?,
            spotify,
            twitter,
        })
    }
}

fn required(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(CoreError::Config(format!(
            "required environment variable {name} is not set"
        ))),
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_i64(name: &str, default: i64) -> Result<i64> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| CoreError::Config(format!("{name} must be an integer, got {value:?}"))),
        Err(_) => Ok(default),
    }
}

fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use refrain_auth::ProviderKind;
    use uuid::Uuid;

    fn misskey_link(instance_url: &str) -> ProviderLink {
        let now = Utc::now();
        ProviderLink {
            user_id: Uuid::new_v4(),
            provider: ProviderKind::Misskey,
            external_id: "m1".into(),
            username: Some("tester".into()),
            avatar_url: None,
            access_token: "token".into(),
            refresh_token: None,
            expires_at: None,
            instance_url: Some(instance_url.into()),
            created_at: now,
            updated_at: now,
        }
    }

    fn settings() -> TwitterSettings {
        TwitterSettings {
            enabled: true,
            client_id: "id".into(),
            client_secret: "secret".into(),
            require_misskey: false,
            allowed_hosts: vec![],
        }
    }

    #[test]
    fn disabled_integration_blocks() {
        let s = TwitterSettings {
            enabled: false,
            ..settings()
        };
        assert!(!s.check_eligibility(None).eligible);
        assert!(!s.is_available());
    }

    #[test]
    fn missing_credentials_block() {
        let s = TwitterSettings {
            client_secret: String::new(),
            ..settings()
        };
        assert!(!s.check_eligibility(None).eligible);
    }

    #[test]
    fn require_misskey_without_link_blocks() {
        let s = TwitterSettings {
            require_misskey: true,
            ..settings()
        };
        let result = s.check_eligibility(None);
        assert!(!result.eligible);
        assert_eq!(result.reason.as_deref(), Some("Misskey connection required"));
    }

    #[test]
    fn allowlist_matches_host_not_url() {
        let s = TwitterSettings {
            require_misskey: true,
            allowed_hosts: vec!["misskey.io".into()],
            ..settings()
        };

        let link = misskey_link("https://misskey.io");
        assert!(s.check_eligibility(Some(&link)).eligible);

        let other = misskey_link("https://misskey.example");
        assert!(!s.check_eligibility(Some(&other)).eligible);
    }

    #[test]
    fn empty_allowlist_allows_any_host() {
        let s = TwitterSettings {
            require_misskey: true,
            ..settings()
        };
        let link = misskey_link("https://anything.example");
        assert!(s.check_eligibility(Some(&link)).eligible);
    }

    #[test]
    fn host_list_parsing() {
        assert_eq!(
            parse_host_list(" Misskey.io, , mi.example.com "),
            vec!["misskey.io".to_string(), "mi.example.com".to_string()]
        );
        assert!(parse_host_list("").is_empty());
    }
}

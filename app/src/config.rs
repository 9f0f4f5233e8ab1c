//! Configuration management for the caption client.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unparsable values fall back to the default.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use caption_client_runtime::StoreConfig;
use caption_client_transport::{ChannelConfig, CorrelatorConfig, ReconnectPolicy};
use serde::{Deserialize, Serialize};

/// Which side of the product this client drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// Booking owner / caption viewer
    #[default]
    Viewer,
    /// Administrator; also loads the user list
    Admin,
}

impl ClientRole {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "viewer" => Some(Self::Viewer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Reconnection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// First delay in milliseconds
    pub initial_delay_ms: u64,
    /// Delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Give up after this many failures (`None` = never)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint of the backend
    pub backend_url: String,
    /// Deadline for each request in milliseconds
    pub request_timeout_ms: u64,
    /// Reconnection backoff
    pub reconnect: ReconnectConfig,
    /// File holding the login token
    pub token_path: PathBuf,
    /// Viewer or admin
    pub role: ClientRole,
    /// Fail dispatches on state invariant violations
    pub strict_invariants: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "ws://localhost:3000/socket".to_string(),
            request_timeout_ms: 10_000,
            reconnect: ReconnectConfig::default(),
            token_path: PathBuf::from("./.caption-client/token"),
            role: ClientRole::Viewer,
            strict_invariants: cfg!(debug_assertions),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse().ok());

        Self {
            backend_url: lookup("BACKEND_URL").unwrap_or(defaults.backend_url),
            request_timeout_ms: parsed("REQUEST_TIMEOUT_MS").unwrap_or(defaults.request_timeout_ms),
            reconnect: ReconnectConfig {
                initial_delay_ms: parsed("RECONNECT_INITIAL_DELAY_MS")
                    .unwrap_or(defaults.reconnect.initial_delay_ms),
                max_delay_ms: parsed("RECONNECT_MAX_DELAY_MS")
                    .unwrap_or(defaults.reconnect.max_delay_ms),
                multiplier: lookup("RECONNECT_MULTIPLIER")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.reconnect.multiplier),
                max_attempts: lookup("RECONNECT_MAX_ATTEMPTS").and_then(|s| s.trim().parse().ok()),
            },
            token_path: lookup("TOKEN_PATH").map_or(defaults.token_path, PathBuf::from),
            role: lookup("CLIENT_ROLE")
                .and_then(|s| ClientRole::parse(&s))
                .unwrap_or(defaults.role),
            strict_invariants: lookup("STRICT_INVARIANTS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.strict_invariants),
        }
    }

    /// Set the backend endpoint.
    #[must_use]
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    /// Set the request deadline.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Deadlines never approach u64::MAX ms
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the reconnection settings.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the token file.
    #[must_use]
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Set the client role.
    #[must_use]
    pub const fn with_role(mut self, role: ClientRole) -> Self {
        self.role = role;
        self
    }

    /// Enable or disable strict invariant checking.
    #[must_use]
    pub const fn with_strict_invariants(mut self, strict: bool) -> Self {
        self.strict_invariants = strict;
        self
    }

    /// Request deadline as a duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Transport channel settings.
    #[must_use]
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::default().with_reconnect(
            ReconnectPolicy::builder()
                .initial_delay(Duration::from_millis(self.reconnect.initial_delay_ms))
                .max_delay(Duration::from_millis(self.reconnect.max_delay_ms))
                .multiplier(self.reconnect.multiplier)
                .max_attempts(self.reconnect.max_attempts)
                .build(),
        )
    }

    /// Correlator settings.
    #[must_use]
    pub const fn correlator_config(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            request_timeout: self.request_timeout(),
        }
    }

    /// Store settings.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default().with_strict_invariants(self.strict_invariants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_values_are_read_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("BACKEND_URL", "wss://captions.example/socket"),
            ("REQUEST_TIMEOUT_MS", "2500"),
            ("RECONNECT_MAX_ATTEMPTS", "4"),
            ("RECONNECT_MULTIPLIER", "1.5"),
            ("CLIENT_ROLE", "Admin"),
            ("STRICT_INVARIANTS", "false"),
            ("TOKEN_PATH", "/tmp/token"),
        ]));

        assert_eq!(config.backend_url, "wss://captions.example/socket");
        assert_eq!(config.request_timeout_ms, 2500);
        assert_eq!(config.reconnect.max_attempts, Some(4));
        assert!((config.reconnect.multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.role, ClientRole::Admin);
        assert!(!config.strict_invariants);
        assert_eq!(config.token_path, PathBuf::from("/tmp/token"));
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("REQUEST_TIMEOUT_MS", "soon"),
            ("CLIENT_ROLE", "superuser"),
        ]));
        assert_eq!(config.request_timeout_ms, 10_000);
        assert_eq!(config.role, ClientRole::Viewer);
    }

    #[test]
    fn test_channel_config_carries_backoff() {
        let config = ClientConfig::default().with_reconnect(ReconnectConfig {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 3.0,
            max_attempts: Some(5),
        });

        let policy = config.channel_config().reconnect;

        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, Some(5));
    }
}

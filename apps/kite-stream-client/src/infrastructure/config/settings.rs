//! Ticker Configuration Settings
//!
//! Connection parameters and credentials for the Kite feed, loaded from
//! environment variables.

use std::time::Duration;

use url::Url;

use crate::infrastructure::kite::heartbeat::DEFAULT_READ_TIMEOUT;
use crate::infrastructure::kite::reconnect::ReconnectConfig;

/// Default WebSocket root URL.
pub const DEFAULT_WS_ROOT: &str = "wss://ws.zerodha.com/";

/// API key presented by the browser-session handshake.
const DEFAULT_API_KEY: &str = "kitefront";

/// Client version advertised in the handshake.
const DEFAULT_VERSION: &str = "2.9.10";

/// User agent advertised in the handshake.
const DEFAULT_USER_AGENT: &str = "kite3-web";

/// Feed credentials: a user id plus the session's encrypted token.
#[derive(Clone)]
pub struct Credentials {
    user_id: String,
    enctoken: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(user_id: String, enctoken: String) -> Self {
        Self { user_id, enctoken }
    }

    /// Get the user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get the encrypted session token.
    #[must_use]
    pub fn enctoken(&self) -> &str {
        &self.enctoken
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("enctoken", &"[REDACTED]")
            .finish()
    }
}

/// Complete ticker configuration.
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// WebSocket root URL (query string appended per connection).
    pub root_url: String,
    /// Feed credentials.
    pub credentials: Credentials,
    /// Handshake api key.
    pub api_key: String,
    /// Handshake client version.
    pub version: String,
    /// Silence window after which the connection is considered dead.
    pub read_timeout: Duration,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
}

impl TickerConfig {
    /// Create a configuration with defaults for everything but credentials.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            root_url: DEFAULT_WS_ROOT.to_string(),
            credentials,
            api_key: DEFAULT_API_KEY.to_string(),
            version: DEFAULT_VERSION.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Required: `KITE_USER_ID`, `KITE_ENCTOKEN`.
    /// Optional: `KITE_WS_ROOT`, `KITE_READ_TIMEOUT_SECS`,
    /// `KITE_RECONNECT_ENABLED`, `KITE_RECONNECT_MAX_RETRIES`,
    /// `KITE_RECONNECT_MAX_DELAY_SECS`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let user_id = require_env("KITE_USER_ID")?;
        let enctoken = require_env("KITE_ENCTOKEN")?;

        let mut config = Self::new(Credentials::new(user_id, enctoken));

        if let Ok(root) = std::env::var("KITE_WS_ROOT") {
            config.root_url = root;
        }
        config.read_timeout =
            parse_env_duration_secs("KITE_READ_TIMEOUT_SECS", DEFAULT_READ_TIMEOUT);

        let enabled = std::env::var("KITE_RECONNECT_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let max_retries = std::env::var("KITE_RECONNECT_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok());
        let max_delay = std::env::var("KITE_RECONNECT_MAX_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        config.reconnect = ReconnectConfig::new(enabled, max_retries, max_delay);

        Ok(config)
    }

    /// Build the handshake URL with the authentication query string.
    ///
    /// `uid` is the current epoch-millis timestamp, making every
    /// connection's URL unique; the connection loop uses that to tell
    /// stale socket callbacks from live ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the root URL does not parse.
    pub fn ws_url(&self) -> Result<Url, ConfigError> {
        let uid = chrono::Utc::now().timestamp_millis().to_string();
        Url::parse_with_params(
            &self.root_url,
            &[
                ("api_key", self.api_key.as_str()),
                ("user_id", self.credentials.user_id()),
                ("enctoken", self.credentials.enctoken()),
                ("uid", uid.as_str()),
                ("user-agent", DEFAULT_USER_AGENT),
                ("version", self.version.as_str()),
            ],
        )
        .map_err(|e| ConfigError::InvalidUrl(self.root_url.clone(), e))
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// The WebSocket root URL does not parse.
    #[error("invalid WebSocket root URL {0}: {1}")]
    InvalidUrl(String, #[source] url::ParseError),
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    let value =
        std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

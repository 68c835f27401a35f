//! Client configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::ws::ReconnectConfig;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_WS_URL: &str = "ws://localhost:5000/ws";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for REST calls.
    pub api_url: String,
    /// Live-update endpoint; the session token is appended as `?token=`.
    pub ws_url: String,
    pub reconnect: ReconnectConfig,
    /// Where the session file lives. `None` means the platform config dir.
    pub config_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            config_dir: None,
        }
    }
}

impl ClientConfig {
    /// Read configuration from the environment.
    ///
    /// Environment variables:
    /// - `CLASSROOM_API_URL`: REST base URL (default: "http://localhost:5000")
    /// - `CLASSROOM_WS_URL`: live-update endpoint (default: derived from the API
    ///   URL, "ws://localhost:5000/ws")
    /// - `CLASSROOM_RECONNECT_MAX_ATTEMPTS`: automatic reconnect budget (default: 5)
    /// - `CLASSROOM_RECONNECT_BASE_DELAY_MS`: linear backoff unit (default: 3000)
    /// - `CLASSROOM_CONFIG_DIR`: directory for the persisted session
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ReconnectConfig::default();

        let api_url = lookup("CLASSROOM_API_URL")
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let ws_url = lookup("CLASSROOM_WS_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| ws_url_for(&api_url));

        let max_attempts = lookup("CLASSROOM_RECONNECT_MAX_ATTEMPTS")
            .and_then(|v| parse_or_warn("CLASSROOM_RECONNECT_MAX_ATTEMPTS", &v))
            .unwrap_or(defaults.max_attempts);

        let base_delay = lookup("CLASSROOM_RECONNECT_BASE_DELAY_MS")
            .and_then(|v| parse_or_warn::<u64>("CLASSROOM_RECONNECT_BASE_DELAY_MS", &v))
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay);

        let config_dir = lookup("CLASSROOM_CONFIG_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            api_url,
            ws_url,
            reconnect: ReconnectConfig {
                max_attempts,
                base_delay,
            },
            config_dir,
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value, "ignoring unparseable setting");
            None
        }
    }
}

/// Convert an HTTP/HTTPS base URL to the live-update endpoint.
pub fn ws_url_for(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/ws")
}

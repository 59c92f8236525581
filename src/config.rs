// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The endpoint needs four Feishu values to function. They are checked once
//! at startup so a missing one is reported as a configuration error instead
//! of producing malformed requests later.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Origins the production game is served from.
const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = [
    "https://celine0257.github.io",
    "https://piying-collector-site.vercel.app",
];

/// Server configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Bitable app token (the `app_token` path segment)
    pub feishu_app_token: String,
    /// Bitable table id
    pub feishu_table_id: String,
    /// Feishu Open API root
    pub feishu_base_url: String,
    /// Per-request timeout for Feishu calls; a timeout is a transport failure
    pub feishu_request_timeout: Duration,
    /// Browser origins allowed by CORS (localhost is always allowed)
    pub allowed_origins: Vec<String>,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Feishu self-built app id
    pub feishu_app_id: String,
    /// Feishu self-built app secret
    pub feishu_app_secret: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            feishu_app_token: "bascnTestAppToken1234".to_string(),
            feishu_table_id: "tblTestTable5678".to_string(),
            feishu_base_url: crate::services::feishu::DEFAULT_BASE_URL.to_string(),
            feishu_request_timeout: crate::services::feishu::DEFAULT_REQUEST_TIMEOUT,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            port: 8080,
            feishu_app_id: "cli_test_app_id".to_string(),
            feishu_app_secret: "test_app_secret".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        Ok(Self {
            feishu_app_token: required("FEISHU_APP_TOKEN")?,
            feishu_table_id: required("FEISHU_TABLE_ID")?,
            feishu_base_url: lookup("FEISHU_BASE_URL")
                .unwrap_or_else(|| crate::services::feishu::DEFAULT_BASE_URL.to_string()),
            feishu_request_timeout: lookup("FEISHU_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(crate::services::feishu::DEFAULT_REQUEST_TIMEOUT),
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| {
                    DEFAULT_ALLOWED_ORIGINS
                        .iter()
                        .map(|s| s.to_string())
                        .collect()
                }),
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            feishu_app_id: required("FEISHU_APP_ID")?,
            feishu_app_secret: required("FEISHU_APP_SECRET")?,
        })
    }

    /// Last four characters of an identifier, safe to show in health output.
    pub fn tail(value: &str) -> String {
        let chars: Vec<char> = value.chars().collect();
        let start = chars.len().saturating_sub(4);
        chars[start..].iter().collect()
    }
}

/// Submission agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Collect endpoint URL
    pub endpoint: String,
    /// Directory holding the persisted retry queue
    pub queue_dir: PathBuf,
    /// Per-request timeout; a timeout counts as a transport failure
    pub request_timeout: Duration,
    /// Window in which repeated move events are ignored
    pub move_throttle: Duration,
    /// Delay before the first queue drain after `configure`
    pub initial_drain_delay: Duration,
    /// Maximum queued submissions; oldest are evicted first
    pub max_queue_len: usize,
    /// Queued submissions older than this are dropped
    pub max_queue_age: chrono::Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://piying-feishu-backend.vercel.app/api/collect".to_string(),
            queue_dir: PathBuf::from(".piying"),
            request_timeout: Duration::from_secs(15),
            move_throttle: Duration::from_millis(60),
            initial_drain_delay: Duration::from_millis(800),
            max_queue_len: 200,
            max_queue_age: chrono::Duration::days(7),
        }
    }
}

impl AgentConfig {
    /// Defaults, with endpoint and queue directory overridable from the environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            endpoint: env::var("COLLECT_ENDPOINT").unwrap_or(defaults.endpoint),
            queue_dir: env::var("COLLECT_QUEUE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.queue_dir),
            ..defaults
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

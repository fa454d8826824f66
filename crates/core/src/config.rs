use crate::tuning::Tuning;
use serde::{Deserialize, Serialize};

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the provider API (quota charged to `api_key`).
    pub direct_base_url: String,
    /// Base URL of the caching intermediary.
    pub mediated_base_url: String,
    pub api_key: String,
    /// Private-access token for restricted profiles.
    pub session_key: Option<String>,
    /// Entries requested per history fetch.
    pub history_limit: u32,
    pub request_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            direct_base_url: "https://ws.audioscrobbler.com/2.0".to_string(),
            mediated_base_url: "https://example.invalid/api/listening".to_string(),
            api_key: "YOUR_API_KEY".to_string(),
            session_key: None,
            history_limit: 10,
            request_timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigIntervals {
    /// Facet refresh cadence while the progress clock is running.
    pub facet_refresh_ms: u64,
    pub file_watch_poll_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            facet_refresh_ms: 1_000,
            file_watch_poll_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// The one tracked identity; one engine instance per user.
    pub username: String,
    pub upstream: UpstreamConfig,
    pub intervals: ConfigIntervals,
    #[serde(default)]
    pub tuning: Tuning,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            username: "YOUR_USERNAME".to_string(),
            upstream: UpstreamConfig::default(),
            intervals: ConfigIntervals::default(),
            tuning: Tuning::default(),
            log_level: "info".to_string(),
        }
    }
}

use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::models::TopK;
use crate::orchestrator::CoreSettings;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base URL of the remote recommendation service
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Timeout applied to every outbound request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Quiescence window before a search is issued
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Initial number of recommendations to request
    #[serde(default = "default_top_k")]
    pub default_top_k: i64,

    /// Redis connection URL; the session lives in process memory when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Session to resume (Redis backend only)
    #[serde(default)]
    pub session_id: Option<String>,

    /// Lifetime of persisted session keys
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_search_debounce_ms() -> u64 {
    500
}

fn default_top_k() -> i64 {
    i64::from(TopK::DEFAULT)
}

fn default_session_ttl_secs() -> u64 {
    1800
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Load configuration from explicit key/value pairs
    pub fn from_pairs<I>(pairs: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(pairs)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Session id to use for the Redis backend; a fresh one unless resuming
    pub fn session_uuid(&self) -> anyhow::Result<Uuid> {
        match self.session_id.as_deref() {
            Some(raw) => Uuid::parse_str(raw.trim())
                .map_err(|e| anyhow::anyhow!("Invalid SESSION_ID {:?}: {}", raw, e)),
            None => Ok(Uuid::new_v4()),
        }
    }

    pub fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            search_debounce: Duration::from_millis(self.search_debounce_ms),
            default_top_k: TopK::clamped(self.default_top_k),
        }
    }
}

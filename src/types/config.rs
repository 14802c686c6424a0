//! Configuration structures.
//!
//! Configuration is loaded from environment variables. Core modules receive
//! already-resolved values; only the binary reads the process environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Error, Result};

/// Global server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote Stash connection.
    #[serde(default)]
    pub stash: StashConfig,

    /// Cache time-to-live settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Analysis defaults and limits.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Remote Stash connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct StashConfig {
    /// Base URL of the Stash instance (without `/graphql`).
    pub endpoint: String,

    /// API key sent in the `ApiKey` header. Required.
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Connection attempts at startup.
    pub connect_retries: u32,

    /// Delay between startup connection attempts.
    #[serde(with = "humantime_serde")]
    pub connect_delay: Duration,

    /// Per-request timeout for remote queries.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for StashConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9999".to_string(),
            api_key: String::new(),
            connect_retries: 3,
            connect_delay: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// Keeps the API key out of logs.
impl std::fmt::Debug for StashConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StashConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("connect_retries", &self.connect_retries)
            .field("connect_delay", &self.connect_delay)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Cache time-to-live settings, per class of operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Fallback TTL for operations without a specific setting.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Performer and scene listings.
    #[serde(with = "humantime_serde")]
    pub listing_ttl: Duration,

    /// Favorite-performer listing backing statistics and recommendations.
    #[serde(with = "humantime_serde")]
    pub stats_ttl: Duration,

    /// Single performer and tag lookups.
    #[serde(with = "humantime_serde")]
    pub lookup_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            listing_ttl: Duration::from_secs(300),
            stats_ttl: Duration::from_secs(1800),
            lookup_ttl: Duration::from_secs(600),
        }
    }
}

/// Analysis defaults and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Default for `favorites_only` on performer listings.
    pub favorites_only_default: bool,

    /// Default cap for batch insights.
    pub max_batch_performers: usize,

    /// Similar performers returned by a single analysis.
    pub similar_limit: usize,

    /// Default shortlist size for recommendations.
    pub recommendation_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            favorites_only_default: true,
            max_batch_performers: 10,
            similar_limit: 5,
            recommendation_limit: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults; set but unparsable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(endpoint) = get("STASH_ENDPOINT") {
            config.stash.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(api_key) = get("STASH_API_KEY") {
            config.stash.api_key = api_key;
        }
        if let Some(raw) = get("STASH_CONNECT_RETRIES") {
            config.stash.connect_retries = parse_number("STASH_CONNECT_RETRIES", &raw)?;
        }
        if let Some(raw) = get("STASH_CONNECT_DELAY_SECONDS") {
            config.stash.connect_delay = parse_seconds("STASH_CONNECT_DELAY_SECONDS", &raw)?;
        }
        if let Some(raw) = get("STASH_REQUEST_TIMEOUT_SECONDS") {
            config.stash.request_timeout = parse_seconds("STASH_REQUEST_TIMEOUT_SECONDS", &raw)?;
        }
        if let Some(raw) = get("STASH_CACHE_TTL_SECONDS") {
            let ttl = parse_seconds("STASH_CACHE_TTL_SECONDS", &raw)?;
            config.cache.default_ttl = ttl;
            config.cache.listing_ttl = ttl;
            config.cache.lookup_ttl = ttl;
        }
        if let Some(raw) = get("STASH_STATS_CACHE_TTL_SECONDS") {
            config.cache.stats_ttl = parse_seconds("STASH_STATS_CACHE_TTL_SECONDS", &raw)?;
        }
        if let Some(raw) = get("FAVORITES") {
            config.analysis.favorites_only_default = raw.eq_ignore_ascii_case("true");
        }
        if let Some(raw) = get("STASH_MAX_BATCH_PERFORMERS") {
            config.analysis.max_batch_performers =
                parse_number("STASH_MAX_BATCH_PERFORMERS", &raw)?;
        }
        if let Some(level) = get("STASH_LOG_LEVEL") {
            config.observability.log_level = level.to_ascii_lowercase();
        }
        if let Some(format) = get("STASH_LOG_FORMAT") {
            config.observability.json_logs = format.eq_ignore_ascii_case("json");
        }

        Ok(config)
    }

    /// Check startup-fatal invariants.
    pub fn validate(&self) -> Result<()> {
        if self.stash.api_key.is_empty() {
            return Err(Error::config(
                "STASH_API_KEY is not set; add it to the environment or a .env file",
            ));
        }
        if self.stash.connect_retries == 0 {
            return Err(Error::config("STASH_CONNECT_RETRIES must be at least 1"));
        }
        if self.analysis.max_batch_performers == 0 {
            return Err(Error::config("STASH_MAX_BATCH_PERFORMERS must be positive"));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::config(format!("{key} must be a non-negative integer, got '{raw}'")))
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| Error::config(format!("{key} must be a number of seconds, got '{raw}'")))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::config(format!("{key} must be a non-negative number, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.stash.endpoint, "http://localhost:9999");
        assert_eq!(config.stash.connect_retries, 3);
        assert_eq!(config.stash.connect_delay, Duration::from_millis(1500));
        assert!(config.analysis.favorites_only_default);
        assert_eq!(config.analysis.max_batch_performers, 10);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("STASH_ENDPOINT", "https://stash.local:9999/"),
            ("STASH_API_KEY", "secret"),
            ("STASH_CONNECT_RETRIES", "5"),
            ("STASH_CONNECT_DELAY_SECONDS", "0.25"),
            ("FAVORITES", "false"),
            ("STASH_STATS_CACHE_TTL_SECONDS", "60"),
            ("STASH_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.stash.endpoint, "https://stash.local:9999");
        assert_eq!(config.stash.api_key, "secret");
        assert_eq!(config.stash.connect_retries, 5);
        assert_eq!(config.stash.connect_delay, Duration::from_millis(250));
        assert!(!config.analysis.favorites_only_default);
        assert_eq!(config.cache.stats_ttl, Duration::from_secs(60));
        assert!(config.observability.json_logs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("STASH_API_KEY"));
    }

    #[test]
    fn test_unparsable_value_rejected() {
        let err = Config::from_lookup(lookup(&[("STASH_CONNECT_RETRIES", "three")])).unwrap_err();
        assert!(err.to_string().contains("STASH_CONNECT_RETRIES"));

        let err =
            Config::from_lookup(lookup(&[("STASH_CONNECT_DELAY_SECONDS", "-1")])).unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = Config::default();
        config.stash.api_key = "super-secret".to_string();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}

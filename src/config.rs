use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub weatherapi_key: String,
    pub weatherapi_base_url: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub disable_persistence: bool,
    pub demo_mode: bool,
    pub seed_default_cities: bool,
    pub bind_addr: String,
    pub search_timeout_ms: u64,
    pub upstream_timeout_ms: u64,
    pub weather_deadline_ms: u64,
    pub cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            weatherapi_key: env::var("WEATHERAPI_KEY").unwrap_or_default(),
            weatherapi_base_url: env::var("WEATHERAPI_BASE_URL")
                .unwrap_or_else(|_| "https://api.weatherapi.com".to_string()),
            database_url: non_empty_var("DATABASE_URL"),
            redis_url: non_empty_var("REDIS_URL"),
            disable_persistence: flag_var("DISABLE_PERSISTENCE"),
            demo_mode: flag_var("WEATHER_DEMO_MODE"),
            seed_default_cities: flag_var("SEED_DEFAULT_CITIES"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            search_timeout_ms: number_var("SEARCH_TIMEOUT_MS", 2500)?,
            upstream_timeout_ms: number_var("UPSTREAM_TIMEOUT_MS", 4000)?,
            weather_deadline_ms: number_var("WEATHER_DEADLINE_MS", 2500)?,
            cache_ttl_secs: number_var("CACHE_TTL_SECS", 30 * 60)?,
        })
    }

    /// Whether a live upstream can be called at all.
    pub fn has_api_key(&self) -> bool {
        !self.weatherapi_key.trim().is_empty()
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn weather_deadline(&self) -> Duration {
        Duration::from_millis(self.weather_deadline_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Persistence is used only when a database URL is configured and not switched off.
    pub fn persistent_database_url(&self) -> Option<&str> {
        if self.disable_persistence {
            return None;
        }
        self.database_url.as_deref()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            weatherapi_key: String::new(),
            weatherapi_base_url: "https://api.weatherapi.com".to_string(),
            database_url: None,
            redis_url: None,
            disable_persistence: false,
            demo_mode: false,
            seed_default_cities: false,
            bind_addr: "0.0.0.0:8080".to_string(),
            search_timeout_ms: 2500,
            upstream_timeout_ms: 4000,
            weather_deadline_ms: 2500,
            cache_ttl_secs: 30 * 60,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn flag_var(name: &str) -> bool {
    env::var(name).map(|v| parse_flag(&v)).unwrap_or(false)
}

fn number_var(name: &str, default: u64) -> anyhow::Result<u64> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got {:?}", name, raw)),
        _ => Ok(default),
    }
}

pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_persistence_switch() {
        let mut config = Config {
            database_url: Some("sqlite::memory:".to_string()),
            ..Config::default()
        };
        assert_eq!(config.persistent_database_url(), Some("sqlite::memory:"));

        config.disable_persistence = true;
        assert_eq!(config.persistent_database_url(), None);
    }

    #[test]
    fn test_default_timeouts() {
        let config = Config::default();
        assert_eq!(config.search_timeout(), Duration::from_millis(2500));
        assert_eq!(config.upstream_timeout(), Duration::from_secs(4));
        assert_eq!(config.weather_deadline(), Duration::from_millis(2500));
        assert_eq!(config.cache_ttl(), Duration::from_secs(1800));
        assert!(!config.has_api_key());
    }
}

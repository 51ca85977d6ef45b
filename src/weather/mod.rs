pub mod cache;
pub mod demo;
pub mod fetcher;
pub mod resolver;
pub mod service;
pub mod types;
pub mod weatherapi;

use serde::Serialize;

/// Fast-tier key for a requested city, built from the raw request values.
pub fn cache_key(city: &str, country: &str) -> String {
    format!("weather:{}:{}", city, country)
}

/// Where a served snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeatherSource {
    Live,
    FastCache,
    DurableCache,
    Demo,
    Fallback,
}

impl WeatherSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherSource::Live => "live",
            WeatherSource::FastCache => "fast-cache",
            WeatherSource::DurableCache => "durable-cache",
            WeatherSource::Demo => "demo",
            WeatherSource::Fallback => "fallback",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, WeatherSource::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key("London", "GB"), "weather:London:GB");
        assert_eq!(cache_key("New York", "US"), "weather:New York:US");
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(WeatherSource::FastCache.as_str(), "fast-cache");
        assert_eq!(
            serde_json::to_value(WeatherSource::DurableCache).unwrap(),
            serde_json::json!("durable-cache")
        );
        assert!(WeatherSource::Fallback.is_degraded());
        assert!(!WeatherSource::Live.is_degraded());
    }
}

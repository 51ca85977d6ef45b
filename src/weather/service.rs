use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::demo::placeholder_snapshot;
use super::fetcher::WeatherFetcher;
use super::types::{SearchLocation, WeatherSnapshot};
use super::weatherapi::WeatherApiClient;
use super::WeatherSource;
use crate::database::DurableWeatherCache;

/// A served snapshot plus where it came from. `fallback_reason` is set only
/// when the placeholder stood in for live data.
#[derive(Debug, Clone)]
pub struct WeatherOutcome {
    pub snapshot: WeatherSnapshot,
    pub source: WeatherSource,
    pub fallback_reason: Option<String>,
}

impl WeatherOutcome {
    fn served(snapshot: WeatherSnapshot, source: WeatherSource) -> Self {
        Self {
            snapshot,
            source,
            fallback_reason: None,
        }
    }

    fn fallback(city: &str, country: &str, reason: String) -> Self {
        Self {
            snapshot: placeholder_snapshot(city, country, Utc::now()),
            source: WeatherSource::Fallback,
            fallback_reason: Some(reason),
        }
    }
}

pub struct WeatherService {
    client: Arc<WeatherApiClient>,
    fetcher: WeatherFetcher,
    durable: Option<Arc<dyn DurableWeatherCache>>,
    demo_mode: bool,
    deadline: Duration,
}

impl WeatherService {
    pub fn new(
        client: Arc<WeatherApiClient>,
        fetcher: WeatherFetcher,
        durable: Option<Arc<dyn DurableWeatherCache>>,
        demo_mode: bool,
        deadline: Duration,
    ) -> Self {
        Self {
            client,
            fetcher,
            durable,
            demo_mode,
            deadline,
        }
    }

    /// Durable tier, then the fetcher under the overall deadline. Always
    /// produces a snapshot; failures are reported through the outcome. The
    /// fetcher writes both tiers after a live fetch.
    pub async fn get_weather(&self, city: &str, country: &str) -> WeatherOutcome {
        if self.demo_mode {
            return WeatherOutcome::served(
                placeholder_snapshot(city, country, Utc::now()),
                WeatherSource::Demo,
            );
        }

        if let Some(durable) = &self.durable {
            match durable.latest_fresh(city, country, Utc::now()).await {
                Ok(Some(snapshot)) => {
                    tracing::debug!("Durable cache hit for {}/{}", city, country);
                    return WeatherOutcome::served(snapshot, WeatherSource::DurableCache);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Durable cache read failed: {}", e),
            }
        }

        match tokio::time::timeout(self.deadline, self.fetcher.fetch_with_source(city, country))
            .await
        {
            Ok(Ok(fetched)) => WeatherOutcome::served(fetched.snapshot, fetched.source),
            Ok(Err(e)) => {
                tracing::warn!("Serving placeholder for {}/{}: {}", city, country, e);
                WeatherOutcome::fallback(city, country, e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    "Serving placeholder for {}/{}: no data within {:?}",
                    city,
                    country,
                    self.deadline
                );
                WeatherOutcome::fallback(
                    city,
                    country,
                    format!("deadline of {:?} exceeded", self.deadline),
                )
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn wait_for_writes(&self) {
        self.fetcher.wait_for_writes().await;
    }

    /// Location search passthrough; failures become an empty list.
    pub async fn search(&self, query: &str) -> Vec<SearchLocation> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        match self.client.search(query).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("Location search for {:?} failed: {}", query, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::database::SqliteStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(uri: String) -> Arc<WeatherApiClient> {
        Arc::new(
            WeatherApiClient::new(Config {
                weatherapi_key: "test-key".to_string(),
                weatherapi_base_url: uri,
                ..Config::default()
            })
            .unwrap(),
        )
    }

    fn service(
        client: Arc<WeatherApiClient>,
        durable: Option<Arc<dyn DurableWeatherCache>>,
        deadline: Duration,
    ) -> WeatherService {
        let fetcher =
            WeatherFetcher::new(client.clone(), None, durable.clone(), Duration::from_secs(1800));
        WeatherService::new(client, fetcher, durable, false, deadline)
    }

    async fn mount_live(server: &MockServer, expected_current_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/v1/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/current.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "location": { "name": "Oslo", "country": "Norway", "lat": 59.91, "lon": 10.75 },
                "current": { "temp_c": 4.0, "humidity": 80, "condition": { "text": "Mist", "code": 1030 } }
            })))
            .expect(expected_current_calls)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "forecast": { "forecastday": [] }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_live_result_is_written_to_durable_tier() {
        let server = MockServer::start().await;
        mount_live(&server, 1).await;

        let store: Arc<dyn DurableWeatherCache> =
            Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let service = service(client_for(server.uri()), Some(store), Duration::from_secs(2));

        let first = service.get_weather("Oslo", "NO").await;
        service.wait_for_writes().await;
        let second = service.get_weather("Oslo", "NO").await;

        assert_eq!(first.source, WeatherSource::Live);
        assert_eq!(second.source, WeatherSource::DurableCache);
        assert_eq!(first.snapshot, second.snapshot);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_deadline_serves_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/current.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "current": { "temp_c": 1.0 } }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let service = service(client_for(server.uri()), None, Duration::from_millis(100));
        let outcome = service.get_weather("Paris", "FR").await;

        assert_eq!(outcome.source, WeatherSource::Fallback);
        assert!(outcome.fallback_reason.is_some());
        assert_eq!(outcome.snapshot.current.temp_c, 28.0);
    }

    #[tokio::test]
    async fn test_upstream_error_serves_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let service = service(client_for(server.uri()), None, Duration::from_secs(2));
        let outcome = service.get_weather("Paris", "FR").await;

        assert_eq!(outcome.source, WeatherSource::Fallback);
        assert_eq!(outcome.snapshot.current.condition.text, "Partly cloudy");
    }

    #[tokio::test]
    async fn test_demo_mode_skips_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(server.uri());
        let fetcher = WeatherFetcher::new(client.clone(), None, None, Duration::from_secs(1800));
        let service = WeatherService::new(client, fetcher, None, true, Duration::from_secs(2));

        let outcome = service.get_weather("Paris", "FR").await;
        assert_eq!(outcome.source, WeatherSource::Demo);
        assert!(outcome.fallback_reason.is_none());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_search_failure_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = service(client_for(server.uri()), None, Duration::from_secs(2));
        assert!(service.search("Par").await.is_empty());
        assert!(service.search("  ").await.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_reason_hides_api_key() {
        let client = Arc::new(
            WeatherApiClient::new(Config {
                weatherapi_key: "SECRET-KEY-123".to_string(),
                weatherapi_base_url: "http://127.0.0.1:1".to_string(),
                ..Config::default()
            })
            .unwrap(),
        );
        let service = service(client, None, Duration::from_secs(2));

        let outcome = service.get_weather("Paris", "FR").await;

        assert_eq!(outcome.source, WeatherSource::Fallback);
        let reason = outcome.fallback_reason.unwrap();
        assert!(!reason.contains("SECRET-KEY-123"), "{reason}");
    }
}

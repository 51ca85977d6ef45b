use super::types::SearchLocation;
use super::weatherapi::WeatherApiClient;
use std::sync::Arc;

/// Turns a free-text city/country pair into the query string sent to the
/// current and forecast endpoints. Never fails: any search problem yields
/// the plain fallback query.
pub struct GeocodeResolver {
    client: Arc<WeatherApiClient>,
}

impl GeocodeResolver {
    pub fn new(client: Arc<WeatherApiClient>) -> Self {
        Self { client }
    }

    pub async fn resolve(&self, city: &str, country: &str) -> String {
        if !self.client.has_api_key() {
            return fallback_query(city, country);
        }

        match self.client.search(city).await {
            Ok(results) => {
                if let Some(query) = pick_query(&results, city, country) {
                    tracing::debug!("Resolved {:?}/{:?} to {:?}", city, country, query);
                    return query;
                }
                tracing::debug!("Location search for {:?} returned no matches", city);
            }
            Err(e) => {
                tracing::debug!("Location search for {:?} failed: {}", city, e);
            }
        }

        fallback_query(city, country)
    }
}

/// Prefers an exact (case-insensitive) name match, else the first result.
pub fn pick_query(results: &[SearchLocation], city: &str, country_hint: &str) -> Option<String> {
    let wanted = city.to_lowercase();
    let best = results
        .iter()
        .find(|loc| loc.name.to_lowercase() == wanted)
        .or_else(|| results.first())?;

    let name = if best.name.trim().is_empty() {
        city
    } else {
        best.name.as_str()
    };

    let code_source = best
        .country_code
        .as_deref()
        .filter(|cc| !cc.trim().is_empty())
        .or_else(|| Some(best.country.as_str()).filter(|c| !c.trim().is_empty()))
        .unwrap_or(country_hint);
    let code: String = code_source.trim().chars().take(2).collect();

    if code.is_empty() {
        Some(name.to_string())
    } else {
        Some(format!("{},{}", name, code))
    }
}

/// Country hints longer than three characters are treated as full names and dropped.
pub fn fallback_query(city: &str, country_hint: &str) -> String {
    let hint = country_hint.trim();
    if !hint.is_empty() && hint.chars().count() <= 3 {
        format!("{},{}", city, hint)
    } else {
        city.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn location(name: &str, country: &str, code: Option<&str>) -> SearchLocation {
        SearchLocation {
            id: None,
            name: name.to_string(),
            region: String::new(),
            country: country.to_string(),
            country_code: code.map(str::to_string),
            lat: 0.0,
            lon: 0.0,
            url: None,
        }
    }

    #[test]
    fn test_pick_query_prefers_exact_name() {
        let results = vec![
            location("Parisot", "France", Some("FR")),
            location("Paris", "United States of America", Some("US")),
        ];
        assert_eq!(pick_query(&results, "paris", "FR").as_deref(), Some("Paris,US"));
    }

    #[test]
    fn test_pick_query_falls_back_to_first_result() {
        let results = vec![location("Londonderry", "United Kingdom", None)];
        assert_eq!(
            pick_query(&results, "London", "GB").as_deref(),
            Some("Londonderry,Un")
        );
    }

    #[test]
    fn test_pick_query_uses_hint_without_country() {
        let results = vec![location("Tokyo", "", None)];
        assert_eq!(pick_query(&results, "Tokyo", "JP").as_deref(), Some("Tokyo,JP"));
        assert_eq!(pick_query(&[], "Tokyo", "JP"), None);
    }

    #[test]
    fn test_fallback_query() {
        assert_eq!(fallback_query("Paris", "FR"), "Paris,FR");
        assert_eq!(fallback_query("Paris", "FRA"), "Paris,FRA");
        assert_eq!(fallback_query("Paris", "France"), "Paris");
        assert_eq!(fallback_query("Paris", ""), "Paris");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "name": "Paris", "country": "France" }]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = WeatherApiClient::new(Config {
            weatherapi_key: "test-key".to_string(),
            weatherapi_base_url: server.uri(),
            search_timeout_ms: 50,
            ..Config::default()
        })
        .unwrap();
        let resolver = GeocodeResolver::new(Arc::new(client));

        assert_eq!(resolver.resolve("Paris", "FR").await, "Paris,FR");
    }

    #[tokio::test]
    async fn test_resolve_uses_search_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "name": "Sydney", "country": "Australia" }
            ])))
            .mount(&server)
            .await;

        let client = WeatherApiClient::new(Config {
            weatherapi_key: "test-key".to_string(),
            weatherapi_base_url: server.uri(),
            ..Config::default()
        })
        .unwrap();
        let resolver = GeocodeResolver::new(Arc::new(client));

        assert_eq!(resolver.resolve("sydney", "Australia").await, "Sydney,Au");
    }
}

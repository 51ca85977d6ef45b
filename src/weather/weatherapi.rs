use super::types::*;
use crate::config::Config;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherApiError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("empty response body")]
    EmptyBody,
    #[error("WEATHERAPI_KEY not set")]
    MissingApiKey,
}

pub struct WeatherApiClient {
    client: Client,
    config: Config,
}

impl WeatherApiClient {
    pub fn new(config: Config) -> Result<Self, WeatherApiError> {
        let client = Client::builder()
            .user_agent("WeatherDashboard/1.0")
            .build()?;

        Ok(Self { client, config })
    }

    pub fn has_api_key(&self) -> bool {
        self.config.has_api_key()
    }

    /// Location search, bounded by the search timeout.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchLocation>, WeatherApiError> {
        self.get_json(
            "/v1/search.json",
            &[("q", query)],
            self.config.search_timeout(),
        )
        .await
    }

    pub async fn get_current(&self, query: &str) -> Result<CurrentResponse, WeatherApiError> {
        self.get_json(
            "/v1/current.json",
            &[("q", query), ("aqi", "yes")],
            self.config.upstream_timeout(),
        )
        .await
    }

    pub async fn get_forecast(
        &self,
        query: &str,
        days: u32,
    ) -> Result<ForecastResponse, WeatherApiError> {
        let days = days.to_string();
        self.get_json(
            "/v1/forecast.json",
            &[("q", query), ("days", &days), ("aqi", "yes")],
            self.config.upstream_timeout(),
        )
        .await
    }

    /// Single attempt, no retries. The timeout covers connect, headers and body.
    /// Request URLs carry the API key, so they are stripped from transport errors.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<T, WeatherApiError> {
        if !self.has_api_key() {
            return Err(WeatherApiError::MissingApiKey);
        }

        let url = format!(
            "{}{}",
            self.config.weatherapi_base_url.trim_end_matches('/'),
            path
        );

        let request = async {
            let response = self
                .client
                .get(&url)
                .query(&[("key", self.config.weatherapi_key.as_str())])
                .query(params)
                .send()
                .await
                .map_err(|e| WeatherApiError::RequestFailed(e.without_url()))?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(WeatherApiError::ApiError(format!(
                    "HTTP {}: {}",
                    status, error_text
                )));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| WeatherApiError::RequestFailed(e.without_url()))?;
            Ok::<_, WeatherApiError>(body)
        };

        let body = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| WeatherApiError::Timeout(timeout))??;

        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(WeatherApiError::EmptyBody);
        }

        let json: Value = serde_json::from_slice(&body)?;
        if json.is_null() {
            return Err(WeatherApiError::EmptyBody);
        }

        Ok(serde_json::from_value(json)?)
    }
}

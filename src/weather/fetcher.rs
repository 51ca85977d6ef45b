use super::cache::SharedFastCache;
use super::resolver::GeocodeResolver;
use super::types::*;
use super::weatherapi::{WeatherApiClient, WeatherApiError};
use super::{cache_key, WeatherSource};
use crate::database::DurableWeatherCache;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};

pub const FORECAST_DAYS: u32 = 5;

#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("current conditions request for {query:?} failed: {source}")]
    Current {
        query: String,
        #[source]
        source: Arc<WeatherApiError>,
    },
    #[error("current conditions missing from response for {query:?}")]
    MissingCurrent { query: String },
    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub snapshot: WeatherSnapshot,
    pub source: WeatherSource,
}

type InFlight = Shared<BoxFuture<'static, Result<WeatherSnapshot, Arc<FetchError>>>>;

/// Fast tier, then resolver and provider. Concurrent fetches for the same
/// key share one upstream pipeline, and that pipeline alone writes both
/// cache tiers.
#[derive(Clone)]
pub struct WeatherFetcher {
    pipeline: Arc<Pipeline>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

struct Pipeline {
    client: Arc<WeatherApiClient>,
    resolver: GeocodeResolver,
    fast_cache: Option<SharedFastCache>,
    durable: Option<Arc<dyn DurableWeatherCache>>,
    ttl: Duration,
}

impl WeatherFetcher {
    pub fn new(
        client: Arc<WeatherApiClient>,
        fast_cache: Option<SharedFastCache>,
        durable: Option<Arc<dyn DurableWeatherCache>>,
        ttl: Duration,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                resolver: GeocodeResolver::new(client.clone()),
                client,
                fast_cache,
                durable,
                ttl,
            }),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn fetch_with_source(
        &self,
        city: &str,
        country: &str,
    ) -> Result<Fetched, FetchError> {
        let key = cache_key(city, country);

        if let Some(snapshot) = self.pipeline.read_fast(&key).await {
            tracing::debug!("Fast cache hit for {}", key);
            return Ok(Fetched {
                snapshot,
                source: WeatherSource::FastCache,
            });
        }

        let pending = self.join_or_start(key, city, country).await;

        match pending.await {
            Ok(snapshot) => Ok(Fetched {
                snapshot,
                source: WeatherSource::Live,
            }),
            Err(e) => Err((*e).clone()),
        }
    }

    /// The pipeline runs on its own task so it still completes when every
    /// waiter gives up early. Waiters are released as soon as the snapshot is
    /// built; cache writes follow, and the in-flight entry is dropped only
    /// after them, so callers arriving meanwhile reuse the result.
    async fn join_or_start(&self, key: String, city: &str, country: &str) -> InFlight {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(pending) = in_flight.get(&key) {
            tracing::debug!("Joining in-flight fetch for {}", key);
            return pending.clone();
        }

        let pipeline = self.pipeline.clone();
        let registry = self.in_flight.clone();
        let (city, country, task_key) = (city.to_string(), country.to_string(), key.clone());
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = pipeline.fetch_live(&city, &country).await;
            let fresh = result.as_ref().ok().cloned();
            let _ = tx.send(result);

            if let Some(snapshot) = fresh {
                pipeline.persist(&task_key, &city, &country, &snapshot).await;
            }
            registry.lock().await.remove(&task_key);
        });

        let pending = async move {
            match rx.await {
                Ok(result) => result.map_err(Arc::new),
                Err(_) => Err(Arc::new(FetchError::Aborted(
                    "fetch task ended without a result".to_string(),
                ))),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key, pending.clone());
        pending
    }

    /// Resolves once no pipeline is running or still writing.
    #[cfg(test)]
    pub(crate) async fn wait_for_writes(&self) {
        while !self.in_flight.lock().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Pipeline {
    async fn read_fast(&self, key: &str) -> Option<WeatherSnapshot> {
        let raw = self.fast_cache.as_ref()?.get(key).await?;
        match serde_json::from_str::<WeatherSnapshot>(&raw) {
            Ok(snapshot) if snapshot.is_fresh_at(Utc::now()) => Some(snapshot),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Best-effort writes to both tiers, once per live fetch.
    async fn persist(&self, key: &str, city: &str, country: &str, snapshot: &WeatherSnapshot) {
        if let Some(cache) = self.fast_cache.as_ref() {
            match serde_json::to_string(snapshot) {
                Ok(raw) => cache.set_ex(key, self.ttl, raw).await,
                Err(e) => tracing::warn!("Could not serialize snapshot for {}: {}", key, e),
            }
        }

        if let Some(durable) = self.durable.as_ref() {
            if let Err(e) = durable.store_snapshot(city, country, snapshot).await {
                tracing::warn!("Durable cache write failed for {}: {}", key, e);
            }
        }
    }

    async fn fetch_live(&self, city: &str, country: &str) -> Result<WeatherSnapshot, FetchError> {
        let query = self.resolver.resolve(city, country).await;

        let response = self
            .client
            .get_current(&query)
            .await
            .map_err(|e| FetchError::Current {
                query: query.clone(),
                source: Arc::new(e),
            })?;
        let current = response
            .current
            .ok_or_else(|| FetchError::MissingCurrent {
                query: query.clone(),
            })?;

        let forecast = match self.client.get_forecast(&query, FORECAST_DAYS).await {
            Ok(response) => response
                .forecast
                .map(|f| f.forecastday.into_iter().map(ForecastDay::from).collect())
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Forecast for {:?} unavailable, serving current only: {}", query, e);
                Vec::new()
            }
        };

        let location = response.location;
        let city_info = SnapshotCity {
            name: location
                .as_ref()
                .map(|l| l.name.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| city.to_string()),
            country: location
                .as_ref()
                .map(|l| l.country.clone())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| country.to_string()),
            lat: location.as_ref().map(|l| l.lat).unwrap_or(0.0),
            lon: location.as_ref().map(|l| l.lon).unwrap_or(0.0),
        };

        Ok(WeatherSnapshot::new(
            current.into(),
            forecast,
            city_info,
            Utc::now(),
            self.ttl,
        ))
    }
}

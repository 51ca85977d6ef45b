use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    cities::{AddCity, CityError, CityService, Direction},
    config::Config,
    database::{City, PreferencesUpdate, StorageKind, Stores, UserPreferences, DEFAULT_USER_ID},
    weather::{
        cache::fast_cache_from_url,
        fetcher::WeatherFetcher,
        service::WeatherService,
        types::SearchLocation,
        weatherapi::{WeatherApiClient, WeatherApiError},
    },
};

pub const WEATHER_SOURCE_HEADER: &str = "x-weather-source";

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Stores,
    pub cities: Arc<CityService>,
    pub weather: Arc<WeatherService>,
}

impl AppState {
    pub fn build(config: Config, stores: Stores) -> Result<Self, WeatherApiError> {
        let client = Arc::new(WeatherApiClient::new(config.clone())?);
        let fast_cache = fast_cache_from_url(config.redis_url.as_deref(), config.cache_ttl());
        let fetcher = WeatherFetcher::new(
            client.clone(),
            fast_cache,
            stores.weather_cache.clone(),
            config.cache_ttl(),
        );

        let weather = WeatherService::new(
            client.clone(),
            fetcher,
            stores.weather_cache.clone(),
            config.demo_mode,
            config.weather_deadline(),
        );
        let cities = CityService::new(stores.cities.clone(), client);

        Ok(Self {
            config: Arc::new(config),
            stores,
            cities: Arc::new(cities),
            weather: Arc::new(weather),
        })
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl ApiError {
    fn from_city_error(err: CityError, action: &str) -> Self {
        match err {
            CityError::Validation(msg) => ApiError::Validation(msg),
            CityError::NotFound => ApiError::NotFound("City not found".to_string()),
            CityError::Database(e) => {
                tracing::error!("Failed to {}: {}", action, e);
                ApiError::Internal(format!("Failed to {}", action))
            }
        }
    }
}

/// JSON bodies are accepted whatever the declared content type.
fn parse_json_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e)))
}

// Request/Response types
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub storage: StorageKind,
}

/// Either a new city or a move of an existing one.
#[derive(Debug, Deserialize)]
pub struct CityRequest {
    pub id: Option<Uuid>,
    pub direction: Option<Direction>,
    pub name: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteCityQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

// Route handlers
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.stores.is_healthy().await {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: state.stores.kind,
    })
}

pub async fn list_cities(State(state): State<AppState>) -> Json<Vec<City>> {
    match state.cities.list(DEFAULT_USER_ID).await {
        Ok(cities) => Json(cities),
        Err(e) => {
            tracing::error!("Failed to list cities: {}", e);
            Json(Vec::new())
        }
    }
}

pub async fn post_city(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CityRequest = parse_json_body(&body)?;

    if let (Some(id), Some(direction)) = (request.id, request.direction) {
        let cities = state
            .cities
            .reorder(DEFAULT_USER_ID, id, direction)
            .await
            .map_err(|e| ApiError::from_city_error(e, "reorder city"))?;
        return Ok(Json(cities).into_response());
    }

    let city = state
        .cities
        .add(
            DEFAULT_USER_ID,
            AddCity {
                name: request.name,
                country: request.country,
                lat: request.lat,
                lon: request.lon,
            },
        )
        .await
        .map_err(|e| ApiError::from_city_error(e, "create city"))?;

    Ok((StatusCode::CREATED, Json(city)).into_response())
}

pub async fn delete_city(
    State(state): State<AppState>,
    Query(params): Query<DeleteCityQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let raw_id = params
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("City ID is required".to_string()))?;
    let id = Uuid::parse_str(raw_id.trim())
        .map_err(|_| ApiError::Validation(format!("Invalid city ID: {}", raw_id)))?;

    state
        .cities
        .remove(DEFAULT_USER_ID, id)
        .await
        .map_err(|e| ApiError::from_city_error(e, "delete city"))?;

    Ok(Json(MessageResponse {
        message: "City deleted successfully".to_string(),
    }))
}

pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherQuery>,
) -> Result<Response, ApiError> {
    let (Some(city), Some(country)) = (
        crate::utils::non_blank(params.city.as_deref()),
        crate::utils::non_blank(params.country.as_deref()),
    ) else {
        return Err(ApiError::Validation(
            "City and country parameters are required".to_string(),
        ));
    };

    let outcome = state.weather.get_weather(&city, &country).await;
    if outcome.source.is_degraded() {
        tracing::info!(
            "Weather for {}/{} served from placeholder ({})",
            city,
            country,
            outcome.fallback_reason.as_deref().unwrap_or("unknown")
        );
    }

    Ok((
        [(
            HeaderName::from_static(WEATHER_SOURCE_HEADER),
            HeaderValue::from_static(outcome.source.as_str()),
        )],
        Json(outcome.snapshot),
    )
        .into_response())
}

pub async fn search_locations(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Json<Vec<SearchLocation>> {
    let query = params.q.unwrap_or_default();
    Json(state.weather.search(&query).await)
}

pub async fn get_preferences(State(state): State<AppState>) -> Json<UserPreferences> {
    match state.stores.preferences.get_preferences(DEFAULT_USER_ID).await {
        Ok(prefs) => Json(prefs.unwrap_or_default()),
        Err(e) => {
            tracing::warn!("Failed to load preferences, serving defaults: {}", e);
            Json(UserPreferences::default())
        }
    }
}

pub async fn save_preferences(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UserPreferences>, ApiError> {
    let update: PreferencesUpdate = parse_json_body(&body)?;

    match state
        .stores
        .preferences
        .save_preferences(DEFAULT_USER_ID, update)
        .await
    {
        Ok(saved) => Ok(Json(saved)),
        Err(e) => {
            tracing::error!("Failed to save preferences: {}", e);
            Err(ApiError::Internal("Failed to save preferences".to_string()))
        }
    }
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/cities",
            get(list_cities).post(post_city).delete(delete_city),
        )
        .route("/weather", get(get_weather))
        .route("/weather/search", get(search_locations))
        .route("/prefs", get(get_preferences).post(save_preferences))
        .with_state(state)
}

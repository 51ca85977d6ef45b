use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::{City, CityStore, DatabaseError, NewCity};
use crate::utils::{non_blank, validate_coordinates};
use crate::weather::weatherapi::WeatherApiClient;

/// Country used by the ephemeral store when none is supplied.
pub const UNKNOWN_COUNTRY: &str = "NA";

#[derive(Error, Debug)]
pub enum CityError {
    #[error("{0}")]
    Validation(String),
    #[error("City not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for CityError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::CityNotFound => CityError::NotFound,
            other => CityError::Database(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddCity {
    pub name: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Ordered city list for an owner, on top of whichever store was configured.
pub struct CityService {
    store: Arc<dyn CityStore>,
    client: Arc<WeatherApiClient>,
}

impl CityService {
    pub fn new(store: Arc<dyn CityStore>, client: Arc<WeatherApiClient>) -> Self {
        Self { store, client }
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<City>, CityError> {
        Ok(self.store.list_cities(owner).await?)
    }

    pub async fn add(&self, owner: &str, request: AddCity) -> Result<City, CityError> {
        let name = non_blank(request.name.as_deref())
            .ok_or_else(|| CityError::Validation("City name is required".to_string()))?;

        let country = match non_blank(request.country.as_deref()) {
            Some(country) => country,
            None if self.store.is_persistent() => {
                return Err(CityError::Validation(
                    "City name and country are required".to_string(),
                ))
            }
            None => UNKNOWN_COUNTRY.to_string(),
        };

        if let (Some(lat), Some(lon)) = (request.lat, request.lon) {
            validate_coordinates(lat, lon).map_err(CityError::Validation)?;
        }

        if let Some(existing) = self.store.find_city(owner, &name, &country).await? {
            tracing::debug!("City {}/{} already tracked", name, country);
            return Ok(existing);
        }

        let (lat, lon) = match (request.lat, request.lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => self.locate(&name, &country).await.unwrap_or((0.0, 0.0)),
        };

        let city = self
            .store
            .upsert_city(
                owner,
                NewCity {
                    name,
                    country,
                    lat,
                    lon,
                },
            )
            .await?;

        tracing::info!("Tracking {} ({}) at position {}", city.name, city.country, city.order);
        Ok(city)
    }

    pub async fn remove(&self, owner: &str, id: Uuid) -> Result<(), CityError> {
        if self.store.delete_city(owner, id).await? {
            Ok(())
        } else {
            Err(CityError::NotFound)
        }
    }

    /// Swaps the city with its neighbour. Moving past either end is a no-op.
    pub async fn reorder(
        &self,
        owner: &str,
        id: Uuid,
        direction: Direction,
    ) -> Result<Vec<City>, CityError> {
        let cities = self.store.list_cities(owner).await?;
        let index = cities
            .iter()
            .position(|c| c.id == id)
            .ok_or(CityError::NotFound)?;

        let neighbour = match direction {
            Direction::Up => index.checked_sub(1),
            Direction::Down => Some(index + 1).filter(|&i| i < cities.len()),
        };
        let Some(neighbour) = neighbour else {
            return Ok(cities);
        };

        self.store
            .swap_city_order(owner, cities[index].id, cities[neighbour].id)
            .await?;

        Ok(self.store.list_cities(owner).await?)
    }

    /// Adds the starter cities; existing entries are left alone.
    pub async fn seed_defaults(&self, owner: &str) -> Result<Vec<City>, CityError> {
        const DEFAULT_CITIES: [(&str, &str, f64, f64); 5] = [
            ("London", "GB", 51.5074, -0.1278),
            ("New York", "US", 40.7128, -74.0060),
            ("Tokyo", "JP", 35.6762, 139.6503),
            ("Paris", "FR", 48.8566, 2.3522),
            ("Sydney", "AU", -33.8688, 151.2093),
        ];

        for (name, country, lat, lon) in DEFAULT_CITIES {
            self.store
                .upsert_city(
                    owner,
                    NewCity {
                        name: name.to_string(),
                        country: country.to_string(),
                        lat,
                        lon,
                    },
                )
                .await?;
        }

        self.list(owner).await
    }

    /// One best-effort coordinate lookup; any failure yields `None`.
    async fn locate(&self, name: &str, country: &str) -> Option<(f64, f64)> {
        if !self.client.has_api_key() {
            return None;
        }

        let query = format!("{},{}", name, country);
        match self.client.get_current(&query).await {
            Ok(response) => response.location.map(|loc| (loc.lat, loc.lon)),
            Err(e) => {
                tracing::debug!("Coordinate lookup for {:?} failed: {}", query, e);
                None
            }
        }
    }
}

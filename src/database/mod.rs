pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::weather::types::WeatherSnapshot;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const DEFAULT_USER_ID: &str = "default";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] sqlx::Error),
    #[error("City not found")]
    CityNotFound,
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    #[sqlx(rename = "position")]
    pub order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCity {
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserPreferences {
    pub units: String,
    pub theme: String,
    pub mode: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            units: "metric".to_string(),
            theme: "neon".to_string(),
            mode: "dark".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesUpdate {
    pub units: Option<String>,
    pub theme: Option<String>,
    pub mode: Option<String>,
}

impl PreferencesUpdate {
    /// Absent fields keep the existing value; with no existing record they take the default.
    pub fn apply_to(self, existing: Option<UserPreferences>) -> UserPreferences {
        let base = existing.unwrap_or_default();
        UserPreferences {
            units: self.units.unwrap_or(base.units),
            theme: self.theme.unwrap_or(base.theme),
            mode: self.mode.unwrap_or(base.mode),
        }
    }
}

/// Ordered per-owner city collection.
#[async_trait]
pub trait CityStore: Send + Sync {
    /// Ascending by `order`, oldest first on ties.
    async fn list_cities(&self, user_id: &str) -> Result<Vec<City>, DatabaseError>;

    async fn find_city(
        &self,
        user_id: &str,
        name: &str,
        country: &str,
    ) -> Result<Option<City>, DatabaseError>;

    /// Inserts at `max(order) + 1`, or returns the existing city with the same
    /// (name, country) untouched.
    async fn upsert_city(&self, user_id: &str, city: NewCity) -> Result<City, DatabaseError>;

    /// Returns false when no such city exists. Remaining orders are not renumbered.
    async fn delete_city(&self, user_id: &str, id: Uuid) -> Result<bool, DatabaseError>;

    /// Exchanges the `order` of two cities as one atomic unit.
    async fn swap_city_order(
        &self,
        user_id: &str,
        first: Uuid,
        second: Uuid,
    ) -> Result<(), DatabaseError>;

    fn is_persistent(&self) -> bool;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_preferences(&self, user_id: &str)
        -> Result<Option<UserPreferences>, DatabaseError>;

    async fn save_preferences(
        &self,
        user_id: &str,
        update: PreferencesUpdate,
    ) -> Result<UserPreferences, DatabaseError>;
}

/// Durable weather tier: append-only snapshots with explicit expiry.
#[async_trait]
pub trait DurableWeatherCache: Send + Sync {
    /// Most recently created entry for the pair whose expiry is after `now`.
    async fn latest_fresh(
        &self,
        city_name: &str,
        country: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WeatherSnapshot>, DatabaseError>;

    async fn store_snapshot(
        &self,
        city_name: &str,
        country: &str,
        snapshot: &WeatherSnapshot,
    ) -> Result<(), DatabaseError>;
}

/// Storage backends chosen once at startup.
#[derive(Clone)]
pub struct Stores {
    pub cities: Arc<dyn CityStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub weather_cache: Option<Arc<dyn DurableWeatherCache>>,
    pub kind: StorageKind,
    sqlite: Option<Arc<SqliteStore>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Sqlite,
    Memory,
}

impl Stores {
    pub fn sqlite(store: Arc<SqliteStore>) -> Self {
        Self {
            cities: store.clone(),
            preferences: store.clone(),
            weather_cache: Some(store.clone() as Arc<dyn DurableWeatherCache>),
            kind: StorageKind::Sqlite,
            sqlite: Some(store),
        }
    }

    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            cities: store.clone(),
            preferences: store,
            weather_cache: None,
            kind: StorageKind::Memory,
            sqlite: None,
        }
    }

    /// The in-memory store has nothing that can go down.
    pub async fn is_healthy(&self) -> bool {
        match &self.sqlite {
            Some(store) => match store.health_check().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Storage health check failed: {}", e);
                    false
                }
            },
            None => true,
        }
    }

    /// Drops expired durable snapshots. Returns the number removed.
    pub async fn purge_expired_weather(&self) -> Result<u64, DatabaseError> {
        match &self.sqlite {
            Some(store) => store.purge_expired_weather(Utc::now()).await,
            None => Ok(0),
        }
    }

    /// Uses SQLite when configured and reachable, otherwise the in-memory store.
    pub async fn from_config(config: &Config) -> Self {
        let Some(url) = config.persistent_database_url() else {
            tracing::info!("Persistence disabled, using in-memory store");
            return Self::memory();
        };

        match SqliteStore::connect(url).await {
            Ok(store) => {
                tracing::info!("Using SQLite store at {}", url);
                Self::sqlite(Arc::new(store))
            }
            Err(e) => {
                tracing::warn!("SQLite unavailable ({}), falling back to in-memory store", e);
                Self::memory()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_defaults() {
        let prefs = UserPreferences::default();
        assert_eq!(prefs.units, "metric");
        assert_eq!(prefs.theme, "neon");
        assert_eq!(prefs.mode, "dark");
    }

    #[test]
    fn test_preferences_update_merges() {
        let update = PreferencesUpdate {
            units: Some("imperial".to_string()),
            ..Default::default()
        };
        let existing = UserPreferences {
            units: "metric".to_string(),
            theme: "ocean".to_string(),
            mode: "light".to_string(),
        };

        let merged = update.clone().apply_to(Some(existing));
        assert_eq!(merged.units, "imperial");
        assert_eq!(merged.theme, "ocean");
        assert_eq!(merged.mode, "light");

        let fresh = update.apply_to(None);
        assert_eq!(fresh.theme, "neon");
        assert_eq!(fresh.mode, "dark");
    }

    #[test]
    fn test_city_serializes_order_field() {
        let city = City {
            id: Uuid::new_v4(),
            user_id: DEFAULT_USER_ID.to_string(),
            name: "London".to_string(),
            country: "GB".to_string(),
            lat: 51.5074,
            lon: -0.1278,
            order: 3,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&city).unwrap();
        assert_eq!(json["order"], 3);
        assert_eq!(json["userId"], "default");
    }

    #[tokio::test]
    async fn test_stores_fall_back_to_memory() {
        let config = Config {
            database_url: Some("sqlite::memory:".to_string()),
            disable_persistence: true,
            ..Config::default()
        };
        let stores = Stores::from_config(&config).await;
        assert_eq!(stores.kind, StorageKind::Memory);
        assert!(stores.weather_cache.is_none());
        assert!(!stores.cities.is_persistent());
    }
}

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    City, CityStore, DatabaseError, NewCity, PreferenceStore, PreferencesUpdate, UserPreferences,
};

/// Ephemeral store used when persistence is off or unreachable. Contents live
/// for the lifetime of the process only.
pub struct MemoryStore {
    cities: RwLock<Vec<City>>,
    preferences: RwLock<HashMap<String, UserPreferences>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            cities: RwLock::new(Vec::new()),
            preferences: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CityStore for MemoryStore {
    async fn list_cities(&self, user_id: &str) -> Result<Vec<City>, DatabaseError> {
        let mut cities: Vec<_> = self
            .cities
            .read()
            .await
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();

        cities.sort_by(|a, b| a.order.cmp(&b.order).then(a.created_at.cmp(&b.created_at)));
        Ok(cities)
    }

    async fn find_city(
        &self,
        user_id: &str,
        name: &str,
        country: &str,
    ) -> Result<Option<City>, DatabaseError> {
        Ok(self
            .cities
            .read()
            .await
            .iter()
            .find(|c| c.user_id == user_id && c.name == name && c.country == country)
            .cloned())
    }

    async fn upsert_city(&self, user_id: &str, city: NewCity) -> Result<City, DatabaseError> {
        let mut cities = self.cities.write().await;

        if let Some(existing) = cities
            .iter()
            .find(|c| c.user_id == user_id && c.name == city.name && c.country == city.country)
        {
            return Ok(existing.clone());
        }

        let next_order = cities
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.order)
            .max()
            .map_or(0, |max| max + 1);

        let created = City {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: city.name,
            country: city.country,
            lat: city.lat,
            lon: city.lon,
            order: next_order,
            created_at: Utc::now(),
        };
        cities.push(created.clone());
        Ok(created)
    }

    async fn delete_city(&self, user_id: &str, id: Uuid) -> Result<bool, DatabaseError> {
        let mut cities = self.cities.write().await;
        let before = cities.len();
        cities.retain(|c| !(c.user_id == user_id && c.id == id));
        Ok(cities.len() < before)
    }

    async fn swap_city_order(
        &self,
        user_id: &str,
        first: Uuid,
        second: Uuid,
    ) -> Result<(), DatabaseError> {
        // Both writes happen under one write guard.
        let mut cities = self.cities.write().await;

        let position_of = |id: Uuid| {
            cities
                .iter()
                .position(|c| c.user_id == user_id && c.id == id)
        };
        let (Some(a), Some(b)) = (position_of(first), position_of(second)) else {
            return Err(DatabaseError::CityNotFound);
        };

        let first_order = cities[a].order;
        cities[a].order = cities[b].order;
        cities[b].order = first_order;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<UserPreferences>, DatabaseError> {
        Ok(self.preferences.read().await.get(user_id).cloned())
    }

    async fn save_preferences(
        &self,
        user_id: &str,
        update: PreferencesUpdate,
    ) -> Result<UserPreferences, DatabaseError> {
        let mut preferences = self.preferences.write().await;
        let merged = update.apply_to(preferences.get(user_id).cloned());
        preferences.insert(user_id.to_string(), merged.clone());
        Ok(merged)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use super::{
    City, CityStore, DatabaseError, DurableWeatherCache, NewCity, PreferenceStore,
    PreferencesUpdate, UserPreferences,
};
use crate::weather::types::WeatherSnapshot;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the pool and creates the tables. In-memory URLs get a single
    /// long-lived connection so every query sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let in_memory = database_url.contains(":memory:");

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let store = Self::new(pool_options.connect_with(options).await?);
        store.init_tables().await?;
        Ok(store)
    }

    pub async fn init_tables(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cities (
                id BLOB PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                country TEXT NOT NULL,
                lat REAL NOT NULL DEFAULT 0,
                lon REAL NOT NULL DEFAULT 0,
                position INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, name, country)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weather_cache (
                id BLOB PRIMARY KEY,
                city_name TEXT NOT NULL,
                country TEXT NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                data TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                expires_at_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_preferences (
                user_id TEXT PRIMARY KEY,
                units TEXT NOT NULL,
                theme TEXT NOT NULL,
                mode TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_cities_user_position ON cities(user_id, position)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_weather_cache_lookup ON weather_cache(city_name, country, created_at_ms)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Drops durable weather entries that can no longer be served.
    pub async fn purge_expired_weather(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM weather_cache WHERE expires_at_ms <= $1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CityStore for SqliteStore {
    async fn list_cities(&self, user_id: &str) -> Result<Vec<City>, DatabaseError> {
        let cities = sqlx::query_as::<_, City>(
            "SELECT * FROM cities WHERE user_id = $1 ORDER BY position ASC, created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(cities)
    }

    async fn find_city(
        &self,
        user_id: &str,
        name: &str,
        country: &str,
    ) -> Result<Option<City>, DatabaseError> {
        let city = sqlx::query_as::<_, City>(
            "SELECT * FROM cities WHERE user_id = $1 AND name = $2 AND country = $3",
        )
        .bind(user_id)
        .bind(name)
        .bind(country)
        .fetch_optional(&self.pool)
        .await?;

        Ok(city)
    }

    async fn upsert_city(&self, user_id: &str, city: NewCity) -> Result<City, DatabaseError> {
        // Position is computed inside the INSERT so concurrent adds cannot share it.
        let inserted = sqlx::query_as::<_, City>(
            r#"
            INSERT INTO cities (id, user_id, name, country, lat, lon, position, created_at)
            VALUES (
                $1, $2, $3, $4, $5, $6,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM cities WHERE user_id = $2),
                $7
            )
            ON CONFLICT (user_id, name, country) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&city.name)
        .bind(&city.country)
        .bind(city.lat)
        .bind(city.lon)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(created) => Ok(created),
            None => self
                .find_city(user_id, &city.name, &city.country)
                .await?
                .ok_or_else(|| {
                    DatabaseError::InvalidData(format!(
                        "city {}/{} vanished during upsert",
                        city.name, city.country
                    ))
                }),
        }
    }

    async fn delete_city(&self, user_id: &str, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM cities WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn swap_city_order(
        &self,
        user_id: &str,
        first: Uuid,
        second: Uuid,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let first_position: Option<i64> =
            sqlx::query_scalar("SELECT position FROM cities WHERE id = $1 AND user_id = $2")
                .bind(first)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let second_position: Option<i64> =
            sqlx::query_scalar("SELECT position FROM cities WHERE id = $1 AND user_id = $2")
                .bind(second)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let (Some(first_position), Some(second_position)) = (first_position, second_position)
        else {
            tx.rollback().await?;
            return Err(DatabaseError::CityNotFound);
        };

        sqlx::query("UPDATE cities SET position = $1 WHERE id = $2")
            .bind(second_position)
            .bind(first)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE cities SET position = $1 WHERE id = $2")
            .bind(first_position)
            .bind(second)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

#[async_trait]
impl PreferenceStore for SqliteStore {
    async fn get_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<UserPreferences>, DatabaseError> {
        let prefs = sqlx::query_as::<_, UserPreferences>(
            "SELECT units, theme, mode FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(prefs)
    }

    async fn save_preferences(
        &self,
        user_id: &str,
        update: PreferencesUpdate,
    ) -> Result<UserPreferences, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, UserPreferences>(
            "SELECT units, theme, mode FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let merged = update.apply_to(existing);

        let saved = sqlx::query_as::<_, UserPreferences>(
            r#"
            INSERT INTO user_preferences (user_id, units, theme, mode, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                units = excluded.units,
                theme = excluded.theme,
                mode = excluded.mode,
                updated_at = excluded.updated_at
            RETURNING units, theme, mode
            "#,
        )
        .bind(user_id)
        .bind(&merged.units)
        .bind(&merged.theme)
        .bind(&merged.mode)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(saved)
    }
}

#[async_trait]
impl DurableWeatherCache for SqliteStore {
    async fn latest_fresh(
        &self,
        city_name: &str,
        country: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WeatherSnapshot>, DatabaseError> {
        let data: Option<String> = sqlx::query_scalar(
            r#"
            SELECT data FROM weather_cache
            WHERE city_name = $1 AND country = $2 AND expires_at_ms > $3
            ORDER BY created_at_ms DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(city_name)
        .bind(country)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        let Some(data) = data else {
            return Ok(None);
        };

        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| DatabaseError::InvalidData(format!("weather_cache entry: {}", e)))
    }

    async fn store_snapshot(
        &self,
        city_name: &str,
        country: &str,
        snapshot: &WeatherSnapshot,
    ) -> Result<(), DatabaseError> {
        let data = serde_json::to_string(snapshot)
            .map_err(|e| DatabaseError::InvalidData(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO weather_cache (id, city_name, country, lat, lon, data, created_at_ms, expires_at_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(city_name)
        .bind(country)
        .bind(snapshot.city.lat)
        .bind(snapshot.city.lon)
        .bind(data)
        .bind(snapshot.created_at.timestamp_millis())
        .bind(snapshot.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

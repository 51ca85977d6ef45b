use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// Domain types served to clients and stored in both cache tiers.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub current: CurrentConditions,
    pub forecast: Vec<ForecastDay>,
    pub city: SnapshotCity,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    pub fn new(
        current: CurrentConditions,
        forecast: Vec<ForecastDay>,
        city: SnapshotCity,
        created_at: DateTime<Utc>,
        ttl: std::time::Duration,
    ) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(30));
        Self {
            current,
            forecast,
            city,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCity {
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temp_c: f64,
    pub temp_f: f64,
    pub feelslike_c: f64,
    pub feelslike_f: f64,
    pub humidity: f64,
    pub wind_kph: f64,
    pub wind_mph: f64,
    pub wind_dir: String,
    pub uv: f64,
    pub is_day: bool,
    pub condition: Condition,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: String,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub avg_temp_c: f64,
    pub max_temp_f: f64,
    pub min_temp_f: f64,
    pub avg_humidity: f64,
    pub max_wind_kph: f64,
    pub chance_of_rain: f64,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub code: i32,
}

// WeatherAPI.com payloads. Fields the dashboard does not use are left out; everything
// else defaults so partial payloads still parse.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLocation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub tz_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentResponse {
    pub location: Option<ApiLocation>,
    pub current: Option<ApiCurrent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCurrent {
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub temp_c: f64,
    #[serde(default)]
    pub temp_f: f64,
    #[serde(default)]
    pub is_day: i32,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub wind_mph: f64,
    #[serde(default)]
    pub wind_kph: f64,
    #[serde(default)]
    pub wind_dir: String,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub feelslike_c: f64,
    #[serde(default)]
    pub feelslike_f: f64,
    #[serde(default)]
    pub uv: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub location: Option<ApiLocation>,
    pub forecast: Option<ApiForecast>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiForecast {
    #[serde(default)]
    pub forecastday: Vec<ApiForecastDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiForecastDay {
    pub date: String,
    pub day: ApiDay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDay {
    #[serde(default)]
    pub maxtemp_c: f64,
    #[serde(default)]
    pub maxtemp_f: f64,
    #[serde(default)]
    pub mintemp_c: f64,
    #[serde(default)]
    pub mintemp_f: f64,
    #[serde(default)]
    pub avgtemp_c: f64,
    #[serde(default)]
    pub maxwind_kph: f64,
    #[serde(default)]
    pub avghumidity: f64,
    #[serde(default)]
    pub daily_chance_of_rain: f64,
    #[serde(default)]
    pub condition: Condition,
}

impl From<ApiCurrent> for CurrentConditions {
    fn from(current: ApiCurrent) -> Self {
        Self {
            temp_c: current.temp_c,
            temp_f: current.temp_f,
            feelslike_c: current.feelslike_c,
            feelslike_f: current.feelslike_f,
            humidity: current.humidity,
            wind_kph: current.wind_kph,
            wind_mph: current.wind_mph,
            wind_dir: current.wind_dir,
            uv: current.uv,
            is_day: current.is_day != 0,
            condition: current.condition,
            last_updated: current.last_updated,
        }
    }
}

impl From<ApiForecastDay> for ForecastDay {
    fn from(day: ApiForecastDay) -> Self {
        Self {
            date: day.date,
            max_temp_c: day.day.maxtemp_c,
            min_temp_c: day.day.mintemp_c,
            avg_temp_c: day.day.avgtemp_c,
            max_temp_f: day.day.maxtemp_f,
            min_temp_f: day.day.mintemp_f,
            avg_humidity: day.day.avghumidity,
            max_wind_kph: day.day.maxwind_kph,
            chance_of_rain: day.day.daily_chance_of_rain,
            condition: day.day.condition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_payload_parses_integers_and_missing_fields() {
        let raw = serde_json::json!({
            "location": { "name": "London", "country": "United Kingdom", "lat": 51.52, "lon": -0.11 },
            "current": {
                "temp_c": 11.0,
                "temp_f": 51.8,
                "is_day": 1,
                "humidity": 82,
                "condition": { "text": "Light rain", "icon": "//cdn/113.png", "code": 1183 }
            }
        });

        let parsed: CurrentResponse = serde_json::from_value(raw).unwrap();
        let current: CurrentConditions = parsed.current.unwrap().into();

        assert_eq!(current.humidity, 82.0);
        assert!(current.is_day);
        assert_eq!(current.condition.code, 1183);
        assert_eq!(current.wind_dir, "");
        assert_eq!(parsed.location.unwrap().name, "London");
    }

    #[test]
    fn test_snapshot_expiry() {
        let created = Utc::now();
        let snapshot = WeatherSnapshot::new(
            CurrentConditions::from(ApiCurrent {
                last_updated: None,
                temp_c: 20.0,
                temp_f: 68.0,
                is_day: 0,
                condition: Condition::default(),
                wind_mph: 0.0,
                wind_kph: 0.0,
                wind_dir: String::new(),
                humidity: 50.0,
                feelslike_c: 20.0,
                feelslike_f: 68.0,
                uv: 0.0,
            }),
            Vec::new(),
            SnapshotCity {
                name: "Oslo".to_string(),
                country: "NO".to_string(),
                lat: 0.0,
                lon: 0.0,
            },
            created,
            std::time::Duration::from_secs(1800),
        );

        assert_eq!(snapshot.expires_at - snapshot.created_at, Duration::minutes(30));
        assert!(snapshot.is_fresh_at(created + Duration::minutes(29)));
        assert!(!snapshot.is_fresh_at(created + Duration::minutes(30)));
    }
}

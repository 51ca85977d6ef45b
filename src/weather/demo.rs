use super::types::*;
use chrono::{DateTime, Duration, Utc};

pub const PLACEHOLDER_TEMP_C: f64 = 28.0;
pub const PLACEHOLDER_HUMIDITY: f64 = 60.0;
pub const PLACEHOLDER_WIND_KPH: f64 = 12.0;
pub const PLACEHOLDER_CONDITION: &str = "Partly cloudy";
const PLACEHOLDER_CONDITION_CODE: i32 = 1003;
const PLACEHOLDER_ICON: &str = "//cdn.weatherapi.com/weather/64x64/day/116.png";

/// Fixed stand-in served when live data is unavailable or demo mode is on.
/// Only the dates depend on `now`; every reading is constant.
pub fn placeholder_snapshot(city: &str, country: &str, now: DateTime<Utc>) -> WeatherSnapshot {
    let condition = Condition {
        text: PLACEHOLDER_CONDITION.to_string(),
        icon: PLACEHOLDER_ICON.to_string(),
        code: PLACEHOLDER_CONDITION_CODE,
    };

    let current = CurrentConditions {
        temp_c: PLACEHOLDER_TEMP_C,
        temp_f: celsius_to_fahrenheit(PLACEHOLDER_TEMP_C),
        feelslike_c: 30.0,
        feelslike_f: celsius_to_fahrenheit(30.0),
        humidity: PLACEHOLDER_HUMIDITY,
        wind_kph: PLACEHOLDER_WIND_KPH,
        wind_mph: 7.5,
        wind_dir: "SW".to_string(),
        uv: 5.0,
        is_day: true,
        condition: condition.clone(),
        last_updated: Some(now.format("%Y-%m-%d %H:%M").to_string()),
    };

    // Gentle warm/cool swing so the forecast strip is not five identical cards.
    let forecast = (0..5)
        .map(|day| {
            let swing = [0.0, 1.0, -1.0, 2.0, -2.0][day as usize];
            let max_c = 31.0 + swing;
            let min_c = 23.0 + swing;
            ForecastDay {
                date: (now + Duration::days(day)).format("%Y-%m-%d").to_string(),
                max_temp_c: max_c,
                min_temp_c: min_c,
                avg_temp_c: (max_c + min_c) / 2.0,
                max_temp_f: celsius_to_fahrenheit(max_c),
                min_temp_f: celsius_to_fahrenheit(min_c),
                avg_humidity: PLACEHOLDER_HUMIDITY,
                max_wind_kph: PLACEHOLDER_WIND_KPH + 4.0,
                chance_of_rain: 20.0,
                condition: condition.clone(),
            }
        })
        .collect();

    WeatherSnapshot::new(
        current,
        forecast,
        SnapshotCity {
            name: city.to_string(),
            country: country.to_string(),
            lat: 0.0,
            lon: 0.0,
        },
        now,
        std::time::Duration::from_secs(30 * 60),
    )
}

fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

//! Domain-specific shared formatting utilities

use std::collections::BTreeMap;

use serde::Serialize;

use crate::weather_client::{AirQuality, CurrentWeather, ForecastEntry, Units};

pub const MIN_FORECAST_DAYS: i64 = 1;
pub const MAX_FORECAST_DAYS: i64 = 5;
pub const DEFAULT_FORECAST_DAYS: i64 = 3;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailySummary {
    pub date: String,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub conditions: String,
    pub max_precipitation_probability: f64,
}

pub fn aqi_label(aqi: u8) -> &'static str {
    match aqi {
        1 => "Good",
        2 => "Fair",
        3 => "Moderate",
        4 => "Poor",
        5 => "Very Poor",
        _ => "Unknown",
    }
}

pub fn format_temperature(value: f64, units: Units) -> String {
    format!("{value:.1}{}", units.temperature_symbol())
}

pub fn describe_current(current: &CurrentWeather, units: Units) -> String {
    let location = match current.country.as_deref() {
        Some(country) => format!("{}, {country}", current.city),
        None => current.city.clone(),
    };

    format!(
        "{location}: {}, {} (feels like {}), humidity {:.0}%, wind {:.1} {}",
        current.description,
        format_temperature(current.temperature, units),
        format_temperature(current.feels_like, units),
        current.humidity_pct,
        current.wind_speed,
        units.speed_unit(),
    )
}

pub fn describe_air_quality(air: &AirQuality) -> String {
    format!(
        "Air quality in {}: {} (AQI {}), PM2.5 {:.1} µg/m³, PM10 {:.1} µg/m³",
        air.city,
        aqi_label(air.aqi),
        air.aqi,
        air.pm2_5,
        air.pm10,
    )
}

/// Collapses three-hourly entries into one summary per UTC date, in date order.
pub fn daily_summaries(entries: &[ForecastEntry]) -> Vec<DailySummary> {
    let mut by_date: BTreeMap<&str, Vec<&ForecastEntry>> = BTreeMap::new();
    for entry in entries {
        let date = entry.time_utc.get(..10).unwrap_or(entry.time_utc.as_str());
        by_date.entry(date).or_default().push(entry);
    }

    by_date
        .into_iter()
        .map(|(date, day)| {
            let min_temperature = day
                .iter()
                .map(|entry| entry.temperature)
                .fold(f64::INFINITY, f64::min);
            let max_temperature = day
                .iter()
                .map(|entry| entry.temperature)
                .fold(f64::NEG_INFINITY, f64::max);
            let max_precipitation_probability = day
                .iter()
                .map(|entry| entry.precipitation_probability)
                .fold(0.0, f64::max);

            DailySummary {
                date: date.to_string(),
                min_temperature,
                max_temperature,
                conditions: dominant_condition(&day),
                max_precipitation_probability,
            }
        })
        .collect()
}

fn dominant_condition(day: &[&ForecastEntry]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in day {
        *counts.entry(entry.description.as_str()).or_default() += 1;
    }

    // Ties resolve to the alphabetically first description.
    counts
        .into_iter()
        .fold(None::<(&str, usize)>, |best, (description, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((description, count)),
        })
        .map(|(description, _)| description.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn describe_forecast(city: &str, days: &[DailySummary], units: Units) -> String {
    if days.is_empty() {
        return format!("No forecast data available for {city}");
    }

    let lines = days
        .iter()
        .map(|day| {
            format!(
                "{}: {} to {}, {}, precipitation chance {:.0}%",
                day.date,
                format_temperature(day.min_temperature, units),
                format_temperature(day.max_temperature, units),
                day.conditions,
                day.max_precipitation_probability * 100.0,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("Forecast for {city}:\n{lines}")
}

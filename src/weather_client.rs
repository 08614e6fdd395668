use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    pub const ALL: [&'static str; 3] = ["metric", "imperial", "standard"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
            Self::Standard => "standard",
        }
    }

    pub fn temperature_symbol(self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
            Self::Standard => "K",
        }
    }

    pub fn speed_unit(self) -> &'static str {
        match self {
            Self::Imperial => "mph",
            Self::Metric | Self::Standard => "m/s",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CurrentWeather {
    pub city: String,
    pub country: Option<String>,
    pub description: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub wind_speed: f64,
    pub observed_at_utc: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ForecastEntry {
    pub time_utc: String,
    pub temperature: f64,
    pub description: String,
    pub precipitation_probability: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AirQuality {
    pub city: String,
    pub aqi: u8,
    pub pm2_5: f64,
    pub pm10: f64,
    pub o3: f64,
    pub no2: f64,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn current(&self, city: &str, units: Units) -> Result<CurrentWeather, AppError>;

    async fn forecast(
        &self,
        city: &str,
        units: Units,
        days: u8,
    ) -> Result<Vec<ForecastEntry>, AppError>;

    async fn air_quality(&self, city: &str) -> Result<AirQuality, AppError>;
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawMain {
    temp: f64,
    #[serde(default)]
    feels_like: f64,
    #[serde(default)]
    humidity: f64,
    #[serde(default)]
    pressure: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawSys {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCurrent {
    name: String,
    #[serde(default)]
    sys: RawSys,
    #[serde(default)]
    weather: Vec<RawCondition>,
    main: RawMain,
    #[serde(default)]
    wind: RawWind,
    dt: i64,
}

#[derive(Debug, Deserialize)]
struct RawForecastItem {
    dt: i64,
    main: RawMain,
    #[serde(default)]
    weather: Vec<RawCondition>,
    #[serde(default)]
    pop: f64,
}

#[derive(Debug, Deserialize)]
struct RawForecast {
    list: Vec<RawForecastItem>,
}

#[derive(Debug, Deserialize)]
struct RawGeocode {
    name: String,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct RawAqiMain {
    aqi: u8,
}

#[derive(Debug, Default, Deserialize)]
struct RawComponents {
    #[serde(default)]
    pm2_5: f64,
    #[serde(default)]
    pm10: f64,
    #[serde(default)]
    o3: f64,
    #[serde(default)]
    no2: f64,
}

#[derive(Debug, Deserialize)]
struct RawAirItem {
    main: RawAqiMain,
    #[serde(default)]
    components: RawComponents,
}

#[derive(Debug, Deserialize)]
struct RawAirPollution {
    list: Vec<RawAirItem>,
}

/// Forecast entries come in three-hour steps.
const FORECAST_STEPS_PER_DAY: u32 = 8;

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeatherClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        subject: &str,
    ) -> Result<T, AppError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::not_configured(
                "weather_api_not_configured",
                "OPENWEATHER_API_KEY is not configured",
            )
        })?;

        let mut query = params.to_vec();
        query.push(("appid", api_key));
        let url = Url::parse_with_params(&format!("{}{}", self.base_url, path), &query)
            .map_err(|err| AppError::internal(format!("invalid weather url: {err}")))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| AppError::upstream(format!("weather request failed: {err}")))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(AppError::bad_request(
                    "city_not_found",
                    format!("no weather data found for {subject}"),
                ))
            }
            StatusCode::UNAUTHORIZED => {
                return Err(AppError::upstream("weather service rejected the API key"))
            }
            status => {
                return Err(AppError::upstream(format!(
                    "weather service returned status {status}"
                )))
            }
        }

        response
            .json::<T>()
            .await
            .map_err(|err| AppError::upstream(format!("unreadable weather response: {err}")))
    }

    async fn geocode(&self, city: &str) -> Result<RawGeocode, AppError> {
        let matches: Vec<RawGeocode> = self
            .get_json("/geo/1.0/direct", &[("q", city), ("limit", "1")], city)
            .await?;

        matches.into_iter().next().ok_or_else(|| {
            AppError::bad_request("city_not_found", format!("no location found for {city}"))
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn current(&self, city: &str, units: Units) -> Result<CurrentWeather, AppError> {
        let raw: RawCurrent = self
            .get_json(
                "/data/2.5/weather",
                &[("q", city), ("units", units.as_str())],
                city,
            )
            .await?;
        Ok(map_current(raw))
    }

    async fn forecast(
        &self,
        city: &str,
        units: Units,
        days: u8,
    ) -> Result<Vec<ForecastEntry>, AppError> {
        let count = (u32::from(days) * FORECAST_STEPS_PER_DAY).to_string();
        let raw: RawForecast = self
            .get_json(
                "/data/2.5/forecast",
                &[("q", city), ("units", units.as_str()), ("cnt", count.as_str())],
                city,
            )
            .await?;
        Ok(map_forecast(raw))
    }

    async fn air_quality(&self, city: &str) -> Result<AirQuality, AppError> {
        let location = self.geocode(city).await?;
        let lat = location.lat.to_string();
        let lon = location.lon.to_string();
        let raw: RawAirPollution = self
            .get_json(
                "/data/2.5/air_pollution",
                &[("lat", lat.as_str()), ("lon", lon.as_str())],
                city,
            )
            .await?;

        map_air_quality(location.name, raw)
    }
}

fn format_unix(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn first_description(conditions: Vec<RawCondition>) -> String {
    conditions
        .into_iter()
        .next()
        .map(|condition| condition.description)
        .unwrap_or_else(|| "unknown".to_string())
}

fn map_current(raw: RawCurrent) -> CurrentWeather {
    CurrentWeather {
        city: raw.name,
        country: raw.sys.country,
        description: first_description(raw.weather),
        temperature: raw.main.temp,
        feels_like: raw.main.feels_like,
        humidity_pct: raw.main.humidity,
        pressure_hpa: raw.main.pressure,
        wind_speed: raw.wind.speed,
        observed_at_utc: format_unix(raw.dt),
    }
}

fn map_forecast(raw: RawForecast) -> Vec<ForecastEntry> {
    let mut items = raw.list;
    items.sort_by_key(|item| item.dt);

    items
        .into_iter()
        .map(|item| ForecastEntry {
            time_utc: format_unix(item.dt),
            temperature: item.main.temp,
            description: first_description(item.weather),
            precipitation_probability: item.pop.clamp(0.0, 1.0),
        })
        .collect()
}

fn map_air_quality(city: String, raw: RawAirPollution) -> Result<AirQuality, AppError> {
    let item = raw
        .list
        .into_iter()
        .next()
        .ok_or_else(|| AppError::upstream("air quality response contained no readings"))?;

    Ok(AirQuality {
        city,
        aqi: item.main.aqi,
        pm2_5: item.components.pm2_5,
        pm10: item.components.pm10,
        o3: item.components.o3,
        no2: item.components.no2,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn maps_current_weather_payload() {
        let raw: RawCurrent = serde_json::from_value(json!({
            "name": "Bergen",
            "sys": { "country": "NO" },
            "weather": [{ "description": "light rain" }, { "description": "mist" }],
            "main": { "temp": 7.5, "feels_like": 4.1, "humidity": 91, "pressure": 1002 },
            "wind": { "speed": 6.2 },
            "dt": 1_772_150_400
        }))
        .expect("fixture parses");

        let current = map_current(raw);
        assert_eq!(current.city, "Bergen");
        assert_eq!(current.country.as_deref(), Some("NO"));
        assert_eq!(current.description, "light rain");
        assert_eq!(current.humidity_pct, 91.0);
        assert_eq!(current.observed_at_utc, "2026-02-27T00:00:00Z");
    }

    #[test]
    fn maps_forecast_sorted_with_clamped_probability() {
        let raw: RawForecast = serde_json::from_value(json!({
            "list": [
                { "dt": 1_772_161_200, "main": { "temp": 3.0 }, "weather": [], "pop": 1.4 },
                { "dt": 1_772_150_400, "main": { "temp": 2.0 }, "weather": [{ "description": "snow" }] }
            ]
        }))
        .expect("fixture parses");

        let entries = map_forecast(raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "snow");
        assert_eq!(entries[0].precipitation_probability, 0.0);
        assert_eq!(entries[1].description, "unknown");
        assert_eq!(entries[1].precipitation_probability, 1.0);
    }

    #[test]
    fn empty_air_quality_list_is_an_upstream_error() {
        let raw = RawAirPollution { list: vec![] };
        let err = map_air_quality("Oslo".to_string(), raw).expect_err("no readings");
        assert!(matches!(err, AppError::Upstream { .. }));
    }

    #[tokio::test]
    async fn missing_api_key_is_reported_before_any_request() {
        let client = OpenWeatherClient::new(
            "http://127.0.0.1:9",
            Some("   ".to_string()),
            Duration::from_secs(1),
        )
        .expect("client builds");

        assert!(!client.is_configured());
        let err = client
            .current("Oslo", Units::Metric)
            .await
            .expect_err("not configured");
        assert!(matches!(err, AppError::NotConfigured { .. }));
    }
}

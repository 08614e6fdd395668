//! Tools exposed via Model Context Protocol
//!
//! Provides `echo` and the weather tools, delegating data access to a
//! `WeatherProvider` implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::domain::report::{ReportFormat, WeatherReport};
use crate::domain::utils::{
    daily_summaries, describe_air_quality, describe_current, describe_forecast,
    DEFAULT_FORECAST_DAYS, MAX_FORECAST_DAYS, MIN_FORECAST_DAYS,
};
use crate::errors::{AppError, ToolError};
use crate::mcp::dispatcher::{ToolContext, ToolDescriptor, ToolDispatcher, ToolHandler, ToolOutput};
use crate::mcp::schema::{ArgumentSchema, ParamKind, ParamSpec, ToolArguments};
use crate::weather_client::{Units, WeatherProvider};

#[derive(Debug, Deserialize)]
pub struct EchoParams {
    pub message: String,
    pub uppercase: bool,
}

#[derive(Debug, Deserialize)]
pub struct CurrentWeatherParams {
    pub city: String,
    pub units: Units,
}

#[derive(Debug, Deserialize)]
pub struct ForecastParams {
    pub city: String,
    pub days: u8,
    pub units: Units,
}

#[derive(Debug, Deserialize)]
pub struct AirQualityParams {
    pub city: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub city: String,
    pub units: Units,
    pub format: ReportFormat,
}

fn city_param() -> ParamSpec {
    ParamSpec::required("city", ParamKind::String, "City name, optionally with country code")
}

fn units_param() -> ParamSpec {
    ParamSpec::optional("units", ParamKind::String, "Unit system for temperatures")
        .one_of(Units::ALL)
        .with_default(json!(Units::default().as_str()))
}

fn normalize_city(city: &str) -> Result<String, AppError> {
    let city = city.trim();
    if city.is_empty() {
        return Err(AppError::bad_request("invalid_city", "city must not be empty"));
    }
    Ok(city.to_string())
}

fn structured(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => Map::from_iter([("value".to_string(), other)]),
    }
}

fn to_structured(value: &impl serde::Serialize) -> Result<Map<String, Value>, AppError> {
    serde_json::to_value(value)
        .map(structured)
        .map_err(|err| AppError::internal(format!("tool result serialization failed: {err}")))
}

pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, args: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, AppError> {
        let params: EchoParams = args.parse()?;
        let message = if params.uppercase {
            params.message.to_uppercase()
        } else {
            params.message
        };
        Ok(ToolOutput::text(message))
    }
}

pub struct CurrentWeatherTool {
    provider: Arc<dyn WeatherProvider>,
}

#[async_trait]
impl ToolHandler for CurrentWeatherTool {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, AppError> {
        let params: CurrentWeatherParams = args.parse()?;
        let city = normalize_city(&params.city)?;
        ctx.notify("info", json!({ "message": format!("fetching current weather for {city}") }));

        let current = self.provider.current(&city, params.units).await?;
        Ok(ToolOutput::text(describe_current(&current, params.units))
            .with_structured(to_structured(&current)?))
    }
}

pub struct ForecastTool {
    provider: Arc<dyn WeatherProvider>,
}

#[async_trait]
impl ToolHandler for ForecastTool {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, AppError> {
        let params: ForecastParams = args.parse()?;
        let city = normalize_city(&params.city)?;
        ctx.notify(
            "info",
            json!({ "message": format!("fetching {}-day forecast for {city}", params.days) }),
        );

        let entries = self
            .provider
            .forecast(&city, params.units, params.days)
            .await?;
        let days = daily_summaries(&entries);

        Ok(ToolOutput::text(describe_forecast(&city, &days, params.units))
            .with_structured(Map::from_iter([
                ("city".to_string(), json!(city)),
                ("units".to_string(), json!(params.units)),
                ("days".to_string(), json!(days)),
                ("entries".to_string(), json!(entries)),
            ])))
    }
}

pub struct AirQualityTool {
    provider: Arc<dyn WeatherProvider>,
}

#[async_trait]
impl ToolHandler for AirQualityTool {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, AppError> {
        let params: AirQualityParams = args.parse()?;
        let city = normalize_city(&params.city)?;
        ctx.notify("info", json!({ "message": format!("fetching air quality for {city}") }));

        let air = self.provider.air_quality(&city).await?;
        Ok(ToolOutput::text(describe_air_quality(&air)).with_structured(to_structured(&air)?))
    }
}

pub struct ReportTool {
    provider: Arc<dyn WeatherProvider>,
}

#[async_trait]
impl ToolHandler for ReportTool {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, AppError> {
        let params: ReportParams = args.parse()?;
        let city = normalize_city(&params.city)?;
        ctx.notify("info", json!({ "message": format!("building weather report for {city}") }));

        let (current, entries, air_quality) = tokio::try_join!(
            self.provider.current(&city, params.units),
            self.provider
                .forecast(&city, params.units, DEFAULT_FORECAST_DAYS as u8),
            self.provider.air_quality(&city),
        )?;

        let report = WeatherReport {
            city,
            units: params.units,
            generated_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            current,
            daily: daily_summaries(&entries),
            air_quality,
        };
        let rendered = report.render(params.format)?;
        ctx.notify("info", json!({ "message": format!("weather report for {} ready", report.city) }));

        Ok(ToolOutput::text(rendered).with_structured(to_structured(&report)?))
    }
}

/// Registers every tool this server exposes.
pub fn build_dispatcher(provider: Arc<dyn WeatherProvider>) -> Result<ToolDispatcher, ToolError> {
    let mut dispatcher = ToolDispatcher::new();

    dispatcher.register(ToolDescriptor::new(
        "echo",
        "Echo a message back, optionally uppercased",
        ArgumentSchema::new()
            .param(ParamSpec::required("message", ParamKind::String, "Text to echo"))
            .param(
                ParamSpec::optional("uppercase", ParamKind::Boolean, "Uppercase the reply")
                    .with_default(json!(false)),
            ),
        EchoTool,
    ))?;

    dispatcher.register(ToolDescriptor::new(
        "get_current_weather",
        "Current weather conditions for a city",
        ArgumentSchema::new().param(city_param()).param(units_param()),
        CurrentWeatherTool {
            provider: Arc::clone(&provider),
        },
    ))?;

    dispatcher.register(ToolDescriptor::new(
        "get_weather_forecast",
        "Daily weather forecast for a city",
        ArgumentSchema::new()
            .param(city_param())
            .param(
                ParamSpec::optional("days", ParamKind::Integer, "Number of days to forecast")
                    .range(MIN_FORECAST_DAYS, MAX_FORECAST_DAYS)
                    .with_default(json!(DEFAULT_FORECAST_DAYS)),
            )
            .param(units_param()),
        ForecastTool {
            provider: Arc::clone(&provider),
        },
    ))?;

    dispatcher.register(ToolDescriptor::new(
        "get_air_quality",
        "Current air quality index and pollutant levels for a city",
        ArgumentSchema::new().param(city_param()),
        AirQualityTool {
            provider: Arc::clone(&provider),
        },
    ))?;

    dispatcher.register(ToolDescriptor::new(
        "generate_weather_report",
        "Combined report of current conditions, forecast and air quality",
        ArgumentSchema::new()
            .param(city_param())
            .param(units_param())
            .param(
                ParamSpec::optional("format", ParamKind::String, "Report output format")
                    .one_of(ReportFormat::ALL)
                    .with_default(json!("markdown")),
            ),
        ReportTool { provider },
    ))?;

    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{events::EventChannel, SessionId};
    use crate::weather_client::{AirQuality, CurrentWeather, ForecastEntry};

    struct StubProvider;

    #[async_trait]
    impl WeatherProvider for StubProvider {
        fn is_configured(&self) -> bool {
            true
        }

        async fn current(&self, city: &str, _units: Units) -> Result<CurrentWeather, AppError> {
            Ok(CurrentWeather {
                city: city.to_string(),
                country: None,
                description: "overcast".to_string(),
                temperature: 10.0,
                feels_like: 9.0,
                humidity_pct: 70.0,
                pressure_hpa: 1010.0,
                wind_speed: 3.0,
                observed_at_utc: "2026-02-27T00:00:00Z".to_string(),
            })
        }

        async fn forecast(
            &self,
            _city: &str,
            _units: Units,
            days: u8,
        ) -> Result<Vec<ForecastEntry>, AppError> {
            Ok((0..days)
                .map(|day| ForecastEntry {
                    time_utc: format!("2026-03-0{}T12:00:00Z", day + 1),
                    temperature: 5.0 + f64::from(day),
                    description: "rain".to_string(),
                    precipitation_probability: 0.5,
                })
                .collect())
        }

        async fn air_quality(&self, city: &str) -> Result<AirQuality, AppError> {
            if city == "Nowhere" {
                return Err(AppError::bad_request("city_not_found", "no location found for Nowhere"));
            }
            Ok(AirQuality {
                city: city.to_string(),
                aqi: 1,
                pm2_5: 3.0,
                pm10: 5.0,
                o3: 30.0,
                no2: 4.0,
            })
        }
    }

    fn dispatcher() -> ToolDispatcher {
        build_dispatcher(Arc::new(StubProvider)).expect("tools register")
    }

    fn context(events: &EventChannel) -> ToolContext {
        ToolContext::new(SessionId::generate(), "test", events.clone())
    }

    #[test]
    fn registers_all_tools_in_order() {
        let names: Vec<String> = dispatcher().tools().map(|tool| tool.name.clone()).collect();
        assert_eq!(
            names,
            vec![
                "echo",
                "get_current_weather",
                "get_weather_forecast",
                "get_air_quality",
                "generate_weather_report",
            ]
        );
    }

    #[tokio::test]
    async fn echo_applies_default_and_uppercase() {
        let events = EventChannel::new(4);
        let plain = dispatcher()
            .invoke("echo", Some(json!({"message": "hi"})), context(&events))
            .await
            .expect("echo");
        assert_eq!(plain, ToolOutput::text("hi"));

        let loud = dispatcher()
            .invoke(
                "echo",
                Some(json!({"message": "hi", "uppercase": true})),
                context(&events),
            )
            .await
            .expect("echo");
        assert_eq!(loud, ToolOutput::text("HI"));
    }

    #[tokio::test]
    async fn forecast_defaults_to_three_days_and_notifies() {
        let events = EventChannel::new(4);
        let output = dispatcher()
            .invoke("get_weather_forecast", Some(json!({"city": "Oslo"})), context(&events))
            .await
            .expect("forecast");

        let structured = output.structured.expect("structured");
        assert_eq!(structured["days"].as_array().map(Vec::len), Some(3));
        assert_eq!(structured["units"], "metric");
        assert_eq!(events.last_event_id(), Some(1));
    }

    #[tokio::test]
    async fn blank_city_is_an_execution_error() {
        let err = dispatcher()
            .invoke(
                "get_current_weather",
                Some(json!({"city": "   "})),
                context(&EventChannel::new(4)),
            )
            .await
            .expect_err("blank city");

        assert!(matches!(err, ToolError::Execution { message, .. } if message.contains("city must not be empty")));
    }

    #[tokio::test]
    async fn report_renders_markdown_by_default() {
        let output = dispatcher()
            .invoke(
                "generate_weather_report",
                Some(json!({"city": "Oslo"})),
                context(&EventChannel::new(8)),
            )
            .await
            .expect("report");

        assert!(output.text[0].starts_with("# Weather report: Oslo"));
        assert!(output.text[0].contains("## Air quality"));
    }

    #[tokio::test]
    async fn report_surfaces_provider_failure() {
        let err = dispatcher()
            .invoke(
                "generate_weather_report",
                Some(json!({"city": "Nowhere", "format": "json"})),
                context(&EventChannel::new(8)),
            )
            .await
            .expect_err("unknown city");

        assert!(matches!(err, ToolError::Execution { tool, .. } if tool == "generate_weather_report"));
    }
}

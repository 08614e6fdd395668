//! Combined weather reports rendered as markdown or JSON

use serde::{Deserialize, Serialize};

use crate::domain::utils::{aqi_label, format_temperature, DailySummary};
use crate::errors::AppError;
use crate::weather_client::{AirQuality, CurrentWeather, Units};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    pub const ALL: [&'static str; 2] = ["markdown", "json"];
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub city: String,
    pub units: Units,
    pub generated_at_utc: String,
    pub current: CurrentWeather,
    pub daily: Vec<DailySummary>,
    pub air_quality: AirQuality,
}

impl WeatherReport {
    pub fn render(&self, format: ReportFormat) -> Result<String, AppError> {
        match format {
            ReportFormat::Markdown => Ok(self.to_markdown()),
            ReportFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|err| AppError::internal(format!("report serialization failed: {err}"))),
        }
    }

    pub fn to_markdown(&self) -> String {
        let units = self.units;
        let mut out = format!("# Weather report: {}\n\n", self.city);
        out.push_str(&format!("_Generated {}_\n\n", self.generated_at_utc));

        out.push_str("## Current conditions\n\n");
        out.push_str(&format!(
            "- Conditions: {}\n- Temperature: {} (feels like {})\n- Humidity: {:.0}%\n- Pressure: {:.0} hPa\n- Wind: {:.1} {}\n\n",
            self.current.description,
            format_temperature(self.current.temperature, units),
            format_temperature(self.current.feels_like, units),
            self.current.humidity_pct,
            self.current.pressure_hpa,
            self.current.wind_speed,
            units.speed_unit(),
        ));

        out.push_str("## Forecast\n\n");
        if self.daily.is_empty() {
            out.push_str("No forecast data available.\n\n");
        } else {
            out.push_str("| Date | Low | High | Conditions | Precipitation |\n");
            out.push_str("|---|---|---|---|---|\n");
            for day in &self.daily {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {:.0}% |\n",
                    day.date,
                    format_temperature(day.min_temperature, units),
                    format_temperature(day.max_temperature, units),
                    day.conditions,
                    day.max_precipitation_probability * 100.0,
                ));
            }
            out.push('\n');
        }

        out.push_str("## Air quality\n\n");
        out.push_str(&format!(
            "- Index: {} ({})\n- PM2.5: {:.1} µg/m³\n- PM10: {:.1} µg/m³\n- O3: {:.1} µg/m³\n- NO2: {:.1} µg/m³\n",
            self.air_quality.aqi,
            aqi_label(self.air_quality.aqi),
            self.air_quality.pm2_5,
            self.air_quality.pm10,
            self.air_quality.o3,
            self.air_quality.no2,
        ));

        out
    }
}
